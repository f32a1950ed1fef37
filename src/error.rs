use thiserror::Error;

use crate::storage::StorageType;

/// One backend's outcome inside an exhausted commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAttempt {
    pub backend: String,
    pub outcome: String,
}

fn summarize(attempts: &[BackendAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.backend, a.outcome))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum CommitError {
    #[error("no storage backend available ({})", summarize(.attempts))]
    NoBackendAvailable { attempts: Vec<BackendAttempt> },

    #[error("{backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("no backend configured for {0}")]
    BackendNotConfigured(StorageType),

    #[error("commit cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CommitError>;
