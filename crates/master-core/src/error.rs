//! Error types for the elastic training master

use thiserror::Error;

/// Result type alias using the master Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the elastic training master
#[derive(Error, Debug)]
pub enum Error {
    // Shard/task errors
    #[error("Dataset not found: {dataset}")]
    DatasetNotFound { dataset: String },

    #[error("Task not found: dataset={dataset}, task={task_id}")]
    TaskNotFound { dataset: String, task_id: i64 },

    #[error("Checkpoint restore failed: {reason}")]
    CheckpointRestore { reason: String },

    // Request errors
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    // Collaborator errors
    #[error("Component unavailable: {component}")]
    Unavailable { component: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable { .. } | Error::Io(_))
    }

    /// Returns true if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Internal { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
