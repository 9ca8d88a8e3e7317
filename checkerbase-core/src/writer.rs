use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

use crate::error::{EngineError, Result};
use crate::line::{Capture, Line, OutputEntry, OutputKind};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

pub type Formatter = dyn Fn(&Line, &[Capture]) -> String + Send + Sync;

/// Where the writer should send each [`OutputKind`], and how it should flush.
pub struct WriterConfig {
    pub success_path: Option<PathBuf>,
    pub failed_path: Option<PathBuf>,
    pub ignored_path: Option<PathBuf>,
    pub append_to_existing: bool,
    pub max_batch_size: usize,
    pub flush_interval: Duration,
    pub formatter: Option<Arc<Formatter>>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            success_path: None,
            failed_path: None,
            ignored_path: None,
            append_to_existing: false,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            formatter: None,
        }
    }
}

/// Atomically-readable write counters.
#[derive(Debug, Default)]
pub struct WriterStats {
    total_entries_written: AtomicU64,
    total_flush_count: AtomicU64,
    dropped_entry_count: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriterStatsSnapshot {
    pub total_entries_written: u64,
    pub total_flush_count: u64,
    pub dropped_entry_count: u64,
}

impl WriterStats {
    pub fn snapshot(&self) -> WriterStatsSnapshot {
        WriterStatsSnapshot {
            total_entries_written: self.total_entries_written.load(Ordering::Relaxed),
            total_flush_count: self.total_flush_count.load(Ordering::Relaxed),
            dropped_entry_count: self.dropped_entry_count.load(Ordering::Relaxed),
        }
    }
}

struct Sink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl Sink {
    fn new(path: PathBuf) -> Self {
        Self { path, writer: None }
    }

    async fn ensure_open(&mut self, append_to_existing: bool) -> Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            let mut options = OpenOptions::new();
            options.create(true);
            if append_to_existing {
                options.append(true);
            } else {
                options.write(true).truncate(true);
            }
            let file = options.open(&self.path).await?;
            self.writer = Some(BufWriter::new(file));
        }
        Ok(self.writer.as_mut().expect("just initialized"))
    }

    async fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.shutdown().await?;
        }
        Ok(())
    }
}

/// Single-threaded consumer of [`OutputEntry`] values. Fans entries out to up
/// to three output files by kind; an entry whose sink is not configured is
/// dropped and counted.
pub struct ResultWriter {
    config: WriterConfig,
    stats: Arc<WriterStats>,
    success: Option<Sink>,
    failed: Option<Sink>,
    ignored: Option<Sink>,
}

impl ResultWriter {
    pub fn new(config: WriterConfig) -> Self {
        let success = config.success_path.clone().map(Sink::new);
        let failed = config.failed_path.clone().map(Sink::new);
        let ignored = config.ignored_path.clone().map(Sink::new);
        Self {
            config,
            stats: Arc::new(WriterStats::default()),
            success,
            failed,
            ignored,
        }
    }

    pub fn stats(&self) -> Arc<WriterStats> {
        Arc::clone(&self.stats)
    }

    fn sink_for(&mut self, kind: OutputKind) -> Option<&mut Sink> {
        match kind {
            OutputKind::Success => self.success.as_mut(),
            OutputKind::Failed => self.failed.as_mut(),
            OutputKind::Ignored => self.ignored.as_mut(),
        }
    }

    fn render(&self, entry: &OutputEntry) -> String {
        match &self.config.formatter {
            Some(f) => f(&entry.original_line, &entry.captures),
            None => entry.original_line.as_str().to_string(),
        }
    }

    async fn write_entry(&mut self, entry: OutputEntry) -> Result<bool> {
        let append = self.config.append_to_existing;
        let line = self.render(&entry);
        let kind = entry.kind;
        let Some(sink) = self.sink_for(kind) else {
            self.stats.dropped_entry_count.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        };
        let writer = sink.ensure_open(append).await?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        self.stats
            .total_entries_written
            .fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn flush_all(&mut self) -> Result<()> {
        for sink in [self.success.as_mut(), self.failed.as_mut(), self.ignored.as_mut()]
            .into_iter()
            .flatten()
        {
            sink.flush().await?;
        }
        self.stats.total_flush_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Drains `rx` until the channel is closed, flushing on batch threshold,
    /// on a periodic tick, and once more on shutdown.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<OutputEntry>) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.flush_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await; // first tick fires immediately; consume it

        let mut pending_unflushed: usize = 0;

        loop {
            tokio::select! {
                biased;

                maybe_entry = rx.recv() => {
                    match maybe_entry {
                        Some(entry) => {
                            if self.write_entry(entry).await? {
                                pending_unflushed += 1;
                            }
                            if pending_unflushed >= self.config.max_batch_size {
                                self.flush_all().await?;
                                pending_unflushed = 0;
                            }
                        }
                        None => break,
                    }
                }

                _ = interval.tick(), if pending_unflushed > 0 => {
                    self.flush_all().await?;
                    pending_unflushed = 0;
                }
            }
        }

        if pending_unflushed > 0 {
            self.flush_all().await?;
        }
        self.dispose().await
    }

    /// Closes every open sink, aggregating disposal errors into one failure.
    async fn dispose(&mut self) -> Result<()> {
        let mut errors = Vec::new();
        for sink in [self.success.as_mut(), self.failed.as_mut(), self.ignored.as_mut()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = sink.close().await {
                errors.push(e.to_string());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::WriterDisposal(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(kind: OutputKind, text: &str) -> OutputEntry {
        OutputEntry::new(kind, Line(text.to_string()), vec![])
    }

    #[tokio::test]
    async fn drops_entries_with_no_configured_sink() {
        let dir = tempdir().unwrap();
        let config = WriterConfig {
            success_path: Some(dir.path().join("success.txt")),
            ..Default::default()
        };
        let writer = ResultWriter::new(config);
        let stats = writer.stats();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(entry(OutputKind::Success, "ok")).unwrap();
        tx.send(entry(OutputKind::Ignored, "skip-me")).unwrap();
        drop(tx);

        writer.run(rx).await.unwrap();
        let snap = stats.snapshot();
        assert_eq!(snap.total_entries_written, 1);
        assert_eq!(snap.dropped_entry_count, 1);

        let contents = tokio::fs::read_to_string(dir.path().join("success.txt"))
            .await
            .unwrap();
        assert_eq!(contents, "ok\n");
    }

    #[tokio::test]
    async fn flushes_on_shutdown_even_under_batch_threshold() {
        let dir = tempdir().unwrap();
        let config = WriterConfig {
            failed_path: Some(dir.path().join("failed.txt")),
            max_batch_size: 1_000,
            flush_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let writer = ResultWriter::new(config);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(entry(OutputKind::Failed, "x:y")).unwrap();
        drop(tx);

        writer.run(rx).await.unwrap();
        let contents = tokio::fs::read_to_string(dir.path().join("failed.txt"))
            .await
            .unwrap();
        assert_eq!(contents, "x:y\n");
    }

    #[tokio::test]
    async fn formatter_overrides_original_line() {
        let dir = tempdir().unwrap();
        let config = WriterConfig {
            success_path: Some(dir.path().join("success.txt")),
            formatter: Some(Arc::new(|line, captures| {
                let joined = captures
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{line} [{joined}]")
            })),
            ..Default::default()
        };
        let writer = ResultWriter::new(config);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(OutputEntry::new(
            OutputKind::Success,
            Line("user:pass".to_string()),
            vec![("quota".to_string(), "5gb".to_string())],
        ))
        .unwrap();
        drop(tx);

        writer.run(rx).await.unwrap();
        let contents = tokio::fs::read_to_string(dir.path().join("success.txt"))
            .await
            .unwrap();
        assert_eq!(contents, "user:pass [quota=5gb]\n");
    }
}
