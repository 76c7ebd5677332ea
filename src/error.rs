use thiserror::Error;

/// Fatal, unclassified-internal, and state-machine error categories.
/// Validation issues never appear here — they accumulate in a
/// [`crate::validation::ValidationResult`] instead; this enum is reserved
/// for failures that must short-circuit the pipeline or a handler.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ODS input is not a valid ZIP container")]
    NotAZip,

    #[error("ODS input exceeds the configured size limit ({size} > {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    #[error("spreadsheet content part is missing from the ODS archive")]
    MissingContentPart,

    #[error("state transition rejected: {0}")]
    InvalidStateTransition(String),

    #[error("version state transition rejected: {0}")]
    InvalidVersionStateTransition(String),

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("pipeline cancelled")]
    Cancelled,

    #[error("repository error: {0}")]
    Repository(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    /// Whether this error is Phase 1's "fatal input" category — the only
    /// category that aborts the whole pipeline rather than degrading one
    /// phase.
    pub fn is_fatal_input(&self) -> bool {
        matches!(
            self,
            PipelineError::NotAZip
                | PipelineError::TooLarge { .. }
                | PipelineError::MissingContentPart
        )
    }

    /// Maps to the `error.code` the response envelope carries.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::NotAZip
            | PipelineError::TooLarge { .. }
            | PipelineError::MissingContentPart => "VALIDATION_ERROR",
            PipelineError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            PipelineError::InvalidVersionStateTransition(_) => "INVALID_VERSION_STATE_TRANSITION",
            PipelineError::DataIntegrity(_) => "DATA_INTEGRITY_ERROR",
            PipelineError::Cancelled => "CANCELLED",
            PipelineError::Repository(_) | PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
