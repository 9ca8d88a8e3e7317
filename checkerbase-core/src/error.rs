use std::io;

/// Errors surfaced by the line pipeline and its orchestration layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("settings validation failed: {0:?}")]
    ValidationFailed(Vec<String>),

    #[error("invalid utf-8 in input line: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("run was cancelled")]
    Cancelled,

    #[error("worker task panicked or was aborted: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("writer disposal failed: {0}")]
    WriterDisposal(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
