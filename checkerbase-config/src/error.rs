#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("could not determine the user's home directory (HOME is unset)")]
    HomeDirNotFound,
}

pub type Result<T> = std::result::Result<T, ConfigError>;
