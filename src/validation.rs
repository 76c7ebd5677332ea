use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The reserved field key used when a message applies to no single field.
pub const GLOBAL_FIELD: &str = "_global_";

/// A stable error code, used by the ODS reader and HTML extractor so callers
/// can match on the failure kind instead of parsing message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Code {
    MissingCell,
    InvalidValue,
    MissingRow,
    InvalidHtml,
    EmptyTable,
    EncodingError,
    Truncated,
}

/// One accumulated message: a field reference, human text, and an optional code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<Code>,
}

impl Message {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(field: impl Into<String>, message: impl Into<String>, code: Code) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: Some(code),
        }
    }
}

/// Either one message or several for the same field — collapses to the
/// scalar form when there is exactly one, so the wire representation matches
/// the response envelope shape (`details.errors.<field>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldMessages {
    Single(String),
    Many(Vec<String>),
}

/// Three severity-tagged message streams plus a free-form debug context,
/// threaded through every phase of the import pipeline. All operations are
/// infallible; this type never fails to append.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    #[serde(default)]
    pub errors: Vec<Message>,
    #[serde(default)]
    pub warnings: Vec<Message>,
    #[serde(default)]
    pub infos: Vec<Message>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(Message::new(field, message));
    }

    pub fn add_error_coded(&mut self, field: impl Into<String>, message: impl Into<String>, code: Code) {
        self.errors.push(Message::with_code(field, message, code));
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(Message::new(field, message));
    }

    pub fn add_warning_coded(&mut self, field: impl Into<String>, message: impl Into<String>, code: Code) {
        self.warnings.push(Message::with_code(field, message, code));
    }

    pub fn add_info(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.infos.push(Message::new(field, message));
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.context.insert(key.into(), value.into());
    }

    /// Concatenate `other`'s sequences onto self, in order, and union
    /// contexts with `other` winning on key collision. `other` is left
    /// untouched — every sequence is copied, never shared.
    pub fn merge(&mut self, other: &ValidationResult) {
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
        self.infos.extend(other.infos.iter().cloned());
        for (k, v) in &other.context {
            self.context.insert(k.clone(), v.clone());
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn group_by_field(&self, severity: Severity) -> HashMap<String, FieldMessages> {
        let messages = match severity {
            Severity::Error => &self.errors,
            Severity::Warning => &self.warnings,
            Severity::Info => &self.infos,
        };
        let mut by_field: HashMap<String, Vec<String>> = HashMap::new();
        for m in messages {
            let key = if m.field.is_empty() {
                GLOBAL_FIELD.to_string()
            } else {
                m.field.clone()
            };
            by_field.entry(key).or_default().push(m.message.clone());
        }
        by_field
            .into_iter()
            .map(|(field, mut msgs)| {
                if msgs.len() == 1 {
                    (field, FieldMessages::Single(msgs.pop().unwrap()))
                } else {
                    (field, FieldMessages::Many(msgs))
                }
            })
            .collect()
    }

    /// The exact summary line the response envelope carries in `error.message`.
    pub fn summary(&self) -> String {
        let (e, w, i) = (self.errors.len(), self.warnings.len(), self.infos.len());
        if e == 0 && w == 0 && i == 0 {
            return "Validation failed".to_string();
        }
        let mut parts = vec![format!("{e} error(s)")];
        if w > 0 {
            parts.push(format!("{w} warning(s)"));
        }
        if i > 0 {
            parts.push(format!("{i} info(s)"));
        }
        format!("Validation failed: {}", parts.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_preserves_order_and_copies() {
        let mut a = ValidationResult::new();
        a.add_error("f1", "first");
        let mut b = ValidationResult::new();
        b.add_error("f2", "second");
        b.set_context("batch_id", "abc");

        a.merge(&b);

        assert_eq!(a.errors.len(), 2);
        assert_eq!(a.errors[0].message, "first");
        assert_eq!(a.errors[1].message, "second");
        assert_eq!(b.errors.len(), 1, "merge must not mutate other");
        assert_eq!(a.context.get("batch_id").unwrap(), "abc");
    }

    #[test]
    fn is_valid_iff_no_errors() {
        let mut r = ValidationResult::new();
        assert!(r.is_valid());
        r.add_warning("f", "just a warning");
        assert!(r.is_valid());
        r.add_error("f", "now it fails");
        assert!(!r.is_valid());
    }

    #[test]
    fn group_by_field_collapses_singletons() {
        let mut r = ValidationResult::new();
        r.add_error("date", "bad format");
        r.add_error("date", "also missing");
        r.add_error("", "structural problem");

        let grouped = r.group_by_field(Severity::Error);
        match grouped.get("date").unwrap() {
            FieldMessages::Many(msgs) => assert_eq!(msgs.len(), 2),
            _ => panic!("expected Many for repeated field"),
        }
        match grouped.get(GLOBAL_FIELD).unwrap() {
            FieldMessages::Single(msg) => assert_eq!(msg, "structural problem"),
            _ => panic!("expected Single for empty field"),
        }
    }

    #[test]
    fn summary_format_lists_each_severity_count() {
        let r = ValidationResult::new();
        assert_eq!(r.summary(), "Validation failed");

        let mut r = ValidationResult::new();
        r.add_error("a", "x");
        assert_eq!(r.summary(), "Validation failed: 1 error(s)");

        let mut r = ValidationResult::new();
        r.add_error("a", "x");
        r.add_warning("b", "y");
        r.add_info("c", "z");
        assert_eq!(
            r.summary(),
            "Validation failed: 1 error(s), 1 warning(s), 1 info(s)"
        );
    }

    #[test]
    fn round_trip_preserves_order_and_context() {
        let mut r = ValidationResult::new();
        r.add_error("a", "one");
        r.add_error("b", "two");
        r.set_context("k", serde_json::json!({"nested": 1}));

        let json = serde_json::to_string(&r).unwrap();
        let back: ValidationResult = serde_json::from_str(&json).unwrap();

        assert_eq!(back.errors.len(), 2);
        assert_eq!(back.errors[0].field, "a");
        assert_eq!(back.errors[1].field, "b");
        assert_eq!(back.context, r.context);
    }
}
