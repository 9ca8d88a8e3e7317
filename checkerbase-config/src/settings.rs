use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Scheme a proxy entry was given, or the configured default when the proxy
/// file line carried none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl Default for ProxyType {
    fn default() -> Self {
        ProxyType::Http
    }
}

/// Persisted configuration plus resume state. Round-trips byte-identical
/// after a save/reload/save/reload cycle as long as field order and
/// formatting stay fixed (`serde_json::to_vec_pretty` is deterministic for a
/// fixed struct shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub input_path: PathBuf,
    pub proxy_path: Option<PathBuf>,
    pub proxy_type: ProxyType,
    pub output_dir: PathBuf,
    pub parallelism: usize,
    pub max_retries: u32,
    pub resume_byte_offset: Option<u64>,
    pub resume_input_path: Option<PathBuf>,
    pub resume_timestamp: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            input_path: PathBuf::new(),
            proxy_path: None,
            proxy_type: ProxyType::default(),
            output_dir: PathBuf::from("output"),
            parallelism: 4,
            max_retries: 3,
            resume_byte_offset: None,
            resume_input_path: None,
            resume_timestamp: None,
        }
    }
}

impl AppSettings {
    /// A checkpoint recorded in these settings is only meaningful for the
    /// input file it was taken against.
    pub fn has_valid_checkpoint_for(&self, input_path: &Path) -> bool {
        matches!(self.resume_byte_offset, Some(offset) if offset > 0)
            && self.resume_input_path.as_deref() == Some(input_path)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        tracing::debug!("loading settings from {}", path.display());
        let bytes = tokio::fs::read(path).await?;
        let settings = serde_json::from_slice(&bytes)?;
        Ok(settings)
    }

    /// Writes to `{path}.tmp` then renames over `path`, so a reader never
    /// observes a partially written settings file.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(self)?;
        let mut tmp_path = path.as_os_str().to_owned();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        tracing::debug!("saved settings to {}", path.display());
        Ok(())
    }
}

/// `${HOME}/.checkerbase`.
pub fn checkerbase_home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| ConfigError::HomeDirNotFound)?;
    Ok(PathBuf::from(home).join(".checkerbase"))
}

pub fn default_settings_path() -> Result<PathBuf> {
    Ok(checkerbase_home_dir()?.join("settings.json"))
}

/// Adapts [`AppSettings`]'s persisted checkpoint fields to the engine's
/// [`checkerbase_core::CheckpointStore`] contract, so `checkerbase-core`
/// never has to depend on this crate's settings format.
pub struct SettingsCheckpointStore {
    settings_path: PathBuf,
}

impl SettingsCheckpointStore {
    pub fn new(settings_path: PathBuf) -> Self {
        Self { settings_path }
    }
}

#[async_trait]
impl checkerbase_core::CheckpointStore for SettingsCheckpointStore {
    async fn load(&self) -> checkerbase_core::Result<checkerbase_core::CheckpointData> {
        let settings = AppSettings::load(&self.settings_path).await.unwrap_or_default();
        Ok(checkerbase_core::CheckpointData {
            resume_byte_offset: settings.resume_byte_offset,
            resume_input_path: settings.resume_input_path,
            resume_timestamp: settings.resume_timestamp,
        })
    }

    async fn save(&self, data: checkerbase_core::CheckpointData) -> checkerbase_core::Result<()> {
        let mut settings = AppSettings::load(&self.settings_path).await.unwrap_or_default();
        settings.resume_byte_offset = data.resume_byte_offset;
        settings.resume_input_path = data.resume_input_path;
        settings.resume_timestamp = data.resume_timestamp;
        settings
            .save(&self.settings_path)
            .await
            .map_err(|e| checkerbase_core::EngineError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_then_reload_round_trips_byte_identical_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = AppSettings {
            input_path: PathBuf::from("/data/input.txt"),
            proxy_path: Some(PathBuf::from("/data/proxies.txt")),
            proxy_type: ProxyType::Socks5,
            output_dir: PathBuf::from("/data/out"),
            parallelism: 8,
            max_retries: 5,
            resume_byte_offset: Some(4096),
            resume_input_path: Some(PathBuf::from("/data/input.txt")),
            resume_timestamp: Some("2026-01-01T00:00:00+00:00".to_string()),
        };

        settings.save(&path).await.unwrap();
        let first_bytes = tokio::fs::read(&path).await.unwrap();
        let reloaded = AppSettings::load(&path).await.unwrap();
        assert_eq!(reloaded, settings);

        reloaded.save(&path).await.unwrap();
        let second_bytes = tokio::fs::read(&path).await.unwrap();
        assert_eq!(first_bytes, second_bytes);
    }

    #[tokio::test]
    async fn save_uses_tmp_file_and_leaves_no_tmp_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = AppSettings::default();
        settings.save(&path).await.unwrap();

        assert!(path.exists());
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        assert!(!PathBuf::from(tmp).exists());
    }

    #[test]
    fn camel_case_keys_in_serialized_json() {
        let settings = AppSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"inputPath\""));
        assert!(json.contains("\"proxyType\""));
        assert!(json.contains("\"maxRetries\""));
    }

    #[test]
    fn checkpoint_valid_only_for_matching_positive_offset() {
        let mut settings = AppSettings::default();
        let input = PathBuf::from("/data/input.txt");
        assert!(!settings.has_valid_checkpoint_for(&input));

        settings.resume_byte_offset = Some(0);
        settings.resume_input_path = Some(input.clone());
        assert!(!settings.has_valid_checkpoint_for(&input)); // zero offset is not valid

        settings.resume_byte_offset = Some(100);
        assert!(settings.has_valid_checkpoint_for(&input));

        settings.resume_input_path = Some(PathBuf::from("/data/other.txt"));
        assert!(!settings.has_valid_checkpoint_for(&input));
    }

    #[tokio::test]
    async fn checkpoint_store_round_trips_through_settings_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        AppSettings::default().save(&path).await.unwrap();

        let store = SettingsCheckpointStore::new(path.clone());
        use checkerbase_core::CheckpointStore;
        store
            .save(checkerbase_core::CheckpointData {
                resume_byte_offset: Some(42),
                resume_input_path: Some(PathBuf::from("/x.txt")),
                resume_timestamp: Some("t".to_string()),
            })
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.resume_byte_offset, Some(42));

        let settings_after = AppSettings::load(&path).await.unwrap();
        assert_eq!(settings_after.parallelism, 4); // unrelated fields preserved
    }
}
