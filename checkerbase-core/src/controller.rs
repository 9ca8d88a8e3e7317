use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::checker::Checker;
use crate::checkpoint::CheckpointManager;
use crate::engine::{CheckerEngine, EngineConfig};
use crate::error::{EngineError, Result};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pause_gate::PauseGate;
use crate::rotator::ProxyRotator;
use crate::writer::WriterConfig;

/// States the controller's state machine can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
    Error,
}

/// A state transition, with the error message that caused it when relevant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChangeEvent {
    pub state: EngineState,
    pub error: Option<String>,
}

/// Settings the controller validates at `initialize()` and threads through
/// to the engine at `start()`.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub write_success: bool,
    pub write_failed: bool,
    pub write_ignored: bool,
    pub append_to_existing: bool,
    pub parallelism: usize,
    pub max_retries: u32,
    pub proxies: Vec<String>,
    pub input_channel_capacity: usize,
    pub segment_size: usize,
    pub max_batch_size: usize,
    pub flush_interval: std::time::Duration,
}

impl EngineSettings {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.input_path.as_os_str().is_empty() {
            errors.push("input_path must not be empty".to_string());
        }
        if self.parallelism == 0 {
            errors.push("parallelism must be at least 1".to_string());
        }
        if self.output_dir.as_os_str().is_empty() {
            errors.push("output_dir must not be empty".to_string());
        }
        errors
    }

    fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            success_path: self.write_success.then(|| self.output_dir.join("success.txt")),
            failed_path: self.write_failed.then(|| self.output_dir.join("failed.txt")),
            ignored_path: self.write_ignored.then(|| self.output_dir.join("ignored.txt")),
            append_to_existing: self.append_to_existing,
            max_batch_size: self.max_batch_size,
            flush_interval: self.flush_interval,
            formatter: None,
        }
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            parallelism: self.parallelism,
            max_retries: self.max_retries,
            input_channel_capacity: self.input_channel_capacity,
            segment_size: self.segment_size,
        }
    }
}

/// State-machine wrapper around [`CheckerEngine`]: validates settings,
/// confirms the output directory is writable, loads proxies, and manages
/// resume-temp-file lifecycle around a run.
pub struct EngineController<C: Checker> {
    checker: Arc<C>,
    settings: EngineSettings,
    checkpoint: Option<Arc<CheckpointManager>>,
    metrics: Arc<Metrics>,
    pause_gate: Arc<PauseGate>,
    cancel: CancellationToken,
    state_tx: watch::Sender<StateChangeEvent>,
}

impl<C: Checker> EngineController<C> {
    pub fn new(checker: C, settings: EngineSettings, checkpoint: Option<Arc<CheckpointManager>>) -> Self {
        let (state_tx, _) = watch::channel(StateChangeEvent {
            state: EngineState::Idle,
            error: None,
        });
        Self {
            checker: Arc::new(checker),
            settings,
            checkpoint,
            metrics: Arc::new(Metrics::default()),
            pause_gate: Arc::new(PauseGate::new()),
            cancel: CancellationToken::new(),
            state_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StateChangeEvent> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> EngineState {
        self.state_tx.borrow().state
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn transition(&self, state: EngineState, error: Option<String>) {
        let _ = self.state_tx.send(StateChangeEvent { state, error });
    }

    /// Validates settings, write-tests the output directory, and verifies
    /// the proxy list (if non-empty) is at least well-formed. Does not run
    /// the engine.
    pub async fn initialize(&self) -> Result<()> {
        let errors = self.settings.validate();
        if !errors.is_empty() {
            self.transition(EngineState::Error, Some(format!("{errors:?}")));
            return Err(EngineError::ValidationFailed(errors));
        }

        tokio::fs::create_dir_all(&self.settings.output_dir).await?;
        let probe = self.settings.output_dir.join(".checkerbase-write-test");
        if let Err(e) = tokio::fs::write(&probe, b"ok").await {
            self.transition(EngineState::Error, Some(e.to_string()));
            return Err(EngineError::from(e));
        }
        let _ = tokio::fs::remove_file(&probe).await;

        Ok(())
    }

    /// Runs the pipeline once. If `resume_from_byte > 0`, carves out the
    /// unconsumed tail of the input into a temp file first and feeds that to
    /// the engine instead of the original file, deleting the temp file on
    /// completion (success, cancellation, or error).
    pub async fn start(&self, resume_from_byte: u64) -> Result<MetricsSnapshot> {
        self.transition(EngineState::Running, None);

        let (run_input_path, resume_temp_path) = if resume_from_byte > 0 {
            let checkpoint = self.checkpoint.as_ref().ok_or_else(|| {
                EngineError::Internal("resume requested without a checkpoint manager".into())
            })?;
            let temp = checkpoint
                .create_resume_temp(&self.settings.input_path, resume_from_byte)
                .await?;
            (temp.clone(), Some(temp))
        } else {
            (self.settings.input_path.clone(), None)
        };

        let proxies = ProxyRotator::new(self.settings.proxies.clone()).map(Arc::new);

        let engine = CheckerEngine::new(
            Arc::clone(&self.checker),
            self.settings.engine_config(),
            Arc::clone(&self.metrics),
            Arc::clone(&self.pause_gate),
            proxies,
            self.settings.writer_config(),
        );

        let run_result = engine.run(&run_input_path, self.cancel.clone()).await;

        if let Some(temp_path) = resume_temp_path {
            let _ = tokio::fs::remove_file(&temp_path).await;
        }

        match run_result {
            Ok(()) => {
                let state = if self.cancel.is_cancelled() {
                    EngineState::Cancelled
                } else {
                    EngineState::Completed
                };
                self.transition(state, None);
                Ok(self.metrics.snapshot())
            }
            Err(EngineError::Cancelled) => {
                self.transition(EngineState::Cancelled, None);
                Ok(self.metrics.snapshot())
            }
            Err(e) => {
                self.transition(EngineState::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn pause(&self) {
        self.pause_gate.pause();
        self.metrics.pause();
        self.transition(EngineState::Paused, None);
    }

    pub fn resume(&self) {
        self.pause_gate.resume();
        self.metrics.resume();
        self.transition(EngineState::Running, None);
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn reset(&self) {
        self.transition(EngineState::Idle, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointData, CheckpointStore};
    use crate::checker::ProcessOutcome;
    use crate::line::Line;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct NoopStore;

    #[async_trait]
    impl CheckpointStore for NoopStore {
        async fn load(&self) -> Result<CheckpointData> {
            Ok(CheckpointData::default())
        }
        async fn save(&self, _data: CheckpointData) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct BoomError;

    struct AlwaysIgnoreChecker;

    #[async_trait]
    impl Checker for AlwaysIgnoreChecker {
        type Record = ();
        type Client = ();
        type Error = BoomError;

        fn quick_validate(&self, _line: &str) -> bool {
            false
        }
        fn parse(&self, _line: &Line) -> Option<Self::Record> {
            None
        }
        async fn create_client(&self, _proxy: Option<&str>) -> Result<Self::Client, Self::Error> {
            Ok(())
        }
        async fn process(
            &self,
            _record: &Self::Record,
            _client: &mut Self::Client,
            _cancel: &CancellationToken,
        ) -> Result<ProcessOutcome, Self::Error> {
            Ok(ProcessOutcome::Ignored)
        }
        fn is_transient(&self, _error: &Self::Error) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn initialize_rejects_empty_input_path() {
        let dir = tempdir().unwrap();
        let settings = EngineSettings {
            input_path: PathBuf::new(),
            output_dir: dir.path().to_path_buf(),
            write_success: true,
            write_failed: true,
            write_ignored: false,
            append_to_existing: false,
            parallelism: 4,
            max_retries: 0,
            proxies: vec![],
            input_channel_capacity: 100,
            segment_size: 4096,
            max_batch_size: 10,
            flush_interval: std::time::Duration::from_millis(50),
        };
        let controller = EngineController::new(AlwaysIgnoreChecker, settings, None);
        let err = controller.initialize().await.unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));
        assert_eq!(controller.state(), EngineState::Error);
    }

    #[tokio::test]
    async fn full_run_transitions_idle_to_completed() {
        let dir = tempdir().unwrap();
        let input_path = dir.path().join("in.txt");
        tokio::fs::write(&input_path, "a\nb\n").await.unwrap();

        let settings = EngineSettings {
            input_path,
            output_dir: dir.path().join("out"),
            write_success: true,
            write_failed: true,
            write_ignored: true,
            append_to_existing: false,
            parallelism: 2,
            max_retries: 0,
            proxies: vec![],
            input_channel_capacity: 100,
            segment_size: 4096,
            max_batch_size: 10,
            flush_interval: std::time::Duration::from_millis(50),
        };
        let controller = EngineController::new(AlwaysIgnoreChecker, settings, Some(Arc::new(CheckpointManager::new(Arc::new(NoopStore)))));
        assert_eq!(controller.state(), EngineState::Idle);
        controller.initialize().await.unwrap();
        let snapshot = controller.start(0).await.unwrap();
        assert_eq!(snapshot.ignored, 2);
        assert_eq!(controller.state(), EngineState::Completed);
    }

    #[test]
    fn pause_and_resume_update_state() {
        let dir = tempdir().unwrap();
        let settings = EngineSettings {
            input_path: dir.path().join("in.txt"),
            output_dir: dir.path().join("out"),
            write_success: false,
            write_failed: false,
            write_ignored: false,
            append_to_existing: false,
            parallelism: 1,
            max_retries: 0,
            proxies: vec![],
            input_channel_capacity: 10,
            segment_size: 4096,
            max_batch_size: 10,
            flush_interval: std::time::Duration::from_secs(1),
        };
        let controller = EngineController::new(AlwaysIgnoreChecker, settings, None);
        controller.pause();
        assert_eq!(controller.state(), EngineState::Paused);
        assert!(!controller.pause_gate.is_open());
        controller.resume();
        assert_eq!(controller.state(), EngineState::Running);
        assert!(controller.pause_gate.is_open());
    }
}
