#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("autoconfig xml parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("dns resolution error: {0}")]
    Dns(String),

    #[error("malformed registry row: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
