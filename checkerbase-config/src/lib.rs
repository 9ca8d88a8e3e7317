//! Settings persistence, proxy-file parsing, and a checkpoint-store adapter
//! feeding `checkerbase-core`'s resume-by-byte-offset mechanism.

pub mod error;
pub mod proxy_file;
pub mod settings;

pub use error::{ConfigError, Result};
pub use proxy_file::{parse_proxy_file, ParsedProxy, ProxyFileParseResult};
pub use settings::{
    checkerbase_home_dir, default_settings_path, AppSettings, ProxyType, SettingsCheckpointStore,
};
