//! Error types for the mission agent

use thiserror::Error;

/// Main error type for the mission agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Package error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Plan error: {0}")]
    PlanError(String),

    #[error("Load error: {0}")]
    LoadError(String),

    #[error("Checksum mismatch for {unit}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        unit: String,
        expected: String,
        actual: String,
    },

    #[error("Install error: {0}")]
    InstallError(String),

    #[error("Process error: {0}")]
    ProcessError(String),

    #[error("Signal error: {0}")]
    SignalError(String),

    #[error("Mission error: {0}")]
    MissionError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AgentError {
    fn from(err: tokio::task::JoinError) -> Self {
        AgentError::Internal(format!("task failed: {}", err))
    }
}
