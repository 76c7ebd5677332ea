use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only audit trail row. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub resource: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub ip: Option<String>,
}

impl AuditLog {
    pub fn new(
        user_id: Uuid,
        action: impl Into<String>,
        resource: impl Into<String>,
        old_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            action: action.into(),
            resource: resource.into(),
            old_values,
            new_values,
            timestamp: Utc::now(),
            ip: None,
        }
    }
}
