//! Error types for org-directory

use rusqlite::ffi;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("{0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Activity nesting would reach {levels} levels (maximum {max})")]
    DepthExceeded { levels: usize, max: usize },

    #[error("Activity {0} cannot be its own parent")]
    SelfParent(i64),

    #[error("Setting parent of activity {id} to {parent_id} would create a cycle")]
    CycleDetected { id: i64, parent_id: i64 },

    #[error("Corrupt activity hierarchy: {0}")]
    CorruptHierarchy(String),

    #[error("Failed to validate the api key")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Request cancelled before commit")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DirectoryError {
    /// True for the three hierarchy invariant violations
    pub fn is_hierarchy_violation(&self) -> bool {
        matches!(
            self,
            DirectoryError::DepthExceeded { .. }
                | DirectoryError::SelfParent(_)
                | DirectoryError::CycleDetected { .. }
        )
    }
}

impl From<rusqlite::Error> for DirectoryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, msg)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let detail = msg.clone().unwrap_or_else(|| failure.to_string());
                let message = match failure.extended_code {
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                        format!("referenced row is missing or still in use ({})", detail)
                    }
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        format!("duplicate value ({})", detail)
                    }
                    _ => detail,
                };
                DirectoryError::Conflict(message)
            }
            _ => DirectoryError::Database(err),
        }
    }
}
