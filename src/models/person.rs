use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Specialty {
    BodyOnly,
    NeuroOnly,
    Both,
}

/// Create-once: modifications require soft-delete plus a new record, never
/// an in-place field update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub specialty: Specialty,
    pub aliases: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Person {
    pub fn new(email: impl Into<String>, name: impl Into<String>, specialty: Specialty) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            name: name.into(),
            specialty,
            aliases: Vec::new(),
            active: true,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    /// True if `candidate` matches this person's email or any alias,
    /// case-insensitively — the matching rule the [`crate::assignment_mapper`]
    /// resolver relies on.
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = candidate.trim().to_lowercase();
        self.email.to_lowercase() == candidate
            || self.aliases.iter().any(|a| a.to_lowercase() == candidate)
    }

    /// Soft-delete: marks `deleted_at`, clears `active`. Modifying a person
    /// otherwise always means a new record, never an in-place field update.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
        self.active = false;
    }

    /// Restore: clears `deleted_at`, sets `active` back to true.
    pub fn restore(&mut self) {
        self.deleted_at = None;
        self.active = true;
    }
}
