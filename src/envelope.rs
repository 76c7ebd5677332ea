use serde::Serialize;

use crate::validation::ValidationResult;

/// The public response envelope every HTTP handler returns, per the wire
/// contract the external HTTP layer consumes. `validation` is always
/// present (possibly empty); `error` is `None` on success.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub data: Option<T>,
    pub validation: ValidationView,
    pub error: Option<ErrorDetail>,
    pub meta: Meta,
}

#[derive(Debug, Serialize)]
pub struct ValidationView {
    pub errors: Vec<crate::validation::Message>,
    pub warnings: Vec<crate::validation::Message>,
    pub infos: Vec<crate::validation::Message>,
    pub context: std::collections::HashMap<String, serde_json::Value>,
}

impl From<&ValidationResult> for ValidationView {
    fn from(v: &ValidationResult) -> Self {
        Self {
            errors: v.errors.clone(),
            warnings: v.warnings.clone(),
            infos: v.infos.clone(),
            context: v.context.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetailBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetailBody {
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub errors: std::collections::HashMap<String, crate::validation::FieldMessages>,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub warnings: std::collections::HashMap<String, crate::validation::FieldMessages>,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub infos: std::collections::HashMap<String, crate::validation::FieldMessages>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_count: Option<usize>,
}

impl ErrorDetailBody {
    pub fn from_validation(v: &ValidationResult) -> Self {
        let error_count = (!v.errors.is_empty()).then_some(v.errors.len());
        let warning_count = (!v.warnings.is_empty()).then_some(v.warnings.len());
        let info_count = (!v.infos.is_empty()).then_some(v.infos.len());
        Self {
            errors: v.group_by_field(crate::validation::Severity::Error),
            warnings: v.group_by_field(crate::validation::Severity::Warning),
            infos: v.group_by_field(crate::validation::Severity::Info),
            error_count,
            warning_count,
            info_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub timestamp: String,
    pub request_id: String,
    pub version: String,
    pub server_time: String,
}

impl Meta {
    pub fn now(request_id: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            timestamp: now.clone(),
            request_id,
            version: env!("CARGO_PKG_VERSION").to_string(),
            server_time: now,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T, validation: ValidationResult, request_id: String) -> Self {
        Self {
            data: Some(data),
            validation: ValidationView::from(&validation),
            error: None,
            meta: Meta::now(request_id),
        }
    }

    /// A validation failure with no payload. Maps to HTTP 400.
    pub fn validation_failed(validation: ValidationResult, request_id: String) -> Self {
        let summary = validation.summary();
        let details = ErrorDetailBody::from_validation(&validation);
        Self {
            data: None,
            validation: ValidationView::from(&validation),
            error: Some(ErrorDetail {
                code: "VALIDATION_ERROR".to_string(),
                message: summary,
                details: Some(details),
            }),
            meta: Meta::now(request_id),
        }
    }

    pub fn fatal(code: &str, message: impl Into<String>, request_id: String) -> Self {
        Self {
            data: None,
            validation: ValidationView::from(&ValidationResult::new()),
            error: Some(ErrorDetail {
                code: code.to_string(),
                message: message.into(),
                details: None,
            }),
            meta: Meta::now(request_id),
        }
    }
}
