use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Task not found: {0}")]
    NotFound(String),
    #[error("Invalid {field}: '{value}' (expected one of: {expected})")]
    InvalidArgument {
        field: &'static str,
        value: String,
        expected: String,
    },
    #[error("Prerequisites not met for {task_id}: waiting on {}", missing.join(", "))]
    PrerequisiteUnmet {
        task_id: String,
        missing: Vec<String>,
    },
    #[error("{tool} is not available: {reason}")]
    ExternalToolUnavailable { tool: String, reason: String },
    #[error("{tool} failed: {message}")]
    ExternalToolFailed { tool: String, message: String },
    #[error("Task {0} has no recorded commit; complete it with SHA capture before reverting")]
    MissingCommit(String),
    #[error("Board document {path} is corrupt: {message}")]
    CorruptState { path: PathBuf, message: String },
    #[error("Board document {0} changed on disk since it was loaded")]
    Conflict(PathBuf),
    #[error("Timed out after {waited:?} waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },
    #[error("Board IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize board: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl BoardError {
    pub fn invalid(field: &'static str, value: impl Into<String>, expected: &[&str]) -> Self {
        BoardError::InvalidArgument {
            field,
            value: value.into(),
            expected: expected.join(", "),
        }
    }

    /// Refusals are expected outcomes of a single operation; everything else
    /// means the board or its environment is unusable.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            BoardError::NotFound(_)
                | BoardError::InvalidArgument { .. }
                | BoardError::PrerequisiteUnmet { .. }
                | BoardError::ExternalToolUnavailable { .. }
                | BoardError::ExternalToolFailed { .. }
                | BoardError::MissingCommit(_)
        )
    }
}

pub type BoardResult<T> = Result<T, BoardError>;
