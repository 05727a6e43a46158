//! Error taxonomy for the triage pipeline.
//!
//! Every variant is contained at the smallest unit of work (one folder, one
//! batch, one record) and turned into an outcome value by the caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriageError {
    /// Network, timeout or non-success status talking to a collaborator.
    #[error("transport error ({stage}): {reason}")]
    Transport { stage: &'static str, reason: String },

    /// The inference response did not have the expected shape or count.
    #[error("validation error: {0}")]
    Validation(String),

    /// A single snapshot record could not be written.
    #[error("write error for '{id}': {reason}")]
    Write { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, TriageError>;

impl TriageError {
    pub fn transport(stage: &'static str, reason: impl ToString) -> Self {
        Self::Transport {
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn write(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Write {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}
