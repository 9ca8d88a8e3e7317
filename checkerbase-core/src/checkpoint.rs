use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncSeekExt, SeekFrom};

use crate::error::{EngineError, Result};

/// The checkpoint fields a settings store needs to persist across restarts.
/// Resume granularity is a byte offset, not a line boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointData {
    pub resume_byte_offset: Option<u64>,
    pub resume_input_path: Option<PathBuf>,
    pub resume_timestamp: Option<String>,
}

/// Abstracts over wherever checkpoint fields are durably stored (in practice
/// the same settings file the engine's configuration lives in), so this
/// crate never has to depend on the settings crate directly.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self) -> Result<CheckpointData>;
    async fn save(&self, data: CheckpointData) -> Result<()>;
}

/// Saves/restores the resume byte offset, and extracts the unconsumed tail
/// of an input file into a standalone temp file for cross-process resume.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    /// Returns the saved offset iff a checkpoint exists for this exact input
    /// path, the file still exists, and its length is at least the saved
    /// offset — otherwise the file has been truncated or replaced and the
    /// checkpoint is no longer trustworthy.
    pub async fn resume_position(&self, input_path: &Path) -> Result<Option<u64>> {
        let data = self.store.load().await?;
        let (Some(offset), Some(saved_path)) =
            (data.resume_byte_offset, data.resume_input_path)
        else {
            return Ok(None);
        };
        if offset == 0 {
            return Ok(None);
        }
        if saved_path != input_path {
            return Ok(None);
        }
        let metadata = match tokio::fs::metadata(input_path).await {
            Ok(m) => m,
            Err(_) => return Ok(None),
        };
        if metadata.len() < offset {
            return Ok(None);
        }
        Ok(Some(offset))
    }

    pub async fn save_checkpoint(&self, input_path: &Path, offset: u64) -> Result<()> {
        self.store
            .save(CheckpointData {
                resume_byte_offset: Some(offset),
                resume_input_path: Some(input_path.to_path_buf()),
                resume_timestamp: Some(Utc::now().to_rfc3339()),
            })
            .await
    }

    /// Copies `[from_byte, end)` of `input_path` into `output_path`,
    /// byte-for-byte.
    pub async fn export_remaining(
        &self,
        input_path: &Path,
        from_byte: u64,
        output_path: &Path,
    ) -> Result<()> {
        let mut input = tokio::fs::File::open(input_path).await?;
        input.seek(SeekFrom::Start(from_byte)).await?;
        let mut output = tokio::fs::File::create(output_path).await?;
        tokio::io::copy(&mut input, &mut output).await?;
        Ok(())
    }

    /// `export_remaining` into a freshly created OS temp file; returns its path.
    pub async fn create_resume_temp(&self, input_path: &Path, from_byte: u64) -> Result<PathBuf> {
        let named = tempfile::Builder::new()
            .prefix("checkerbase-resume-")
            .tempfile()
            .map_err(EngineError::Io)?;
        let (_file, path) = named
            .keep()
            .map_err(|e| EngineError::Internal(format!("failed to persist temp file: {e}")))?;
        self.export_remaining(input_path, from_byte, &path).await?;
        Ok(path)
    }
}
