use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use checkerbase_core::{
    CheckerEngine, EngineConfig, Line, Metrics, PauseGate, ProcessOutcome, WriterConfig,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("slow checker error")]
struct SlowError;

/// Each call sleeps briefly so a pause/cancel has a real window to land
/// mid-run rather than racing a pipeline that finishes instantly.
struct SlowChecker {
    processed: AtomicUsize,
}

#[async_trait]
impl checkerbase_core::Checker for SlowChecker {
    type Record = String;
    type Client = ();
    type Error = SlowError;

    fn quick_validate(&self, line: &str) -> bool {
        !line.is_empty()
    }

    fn parse(&self, line: &Line) -> Option<Self::Record> {
        Some(line.as_str().to_string())
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
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.processed.fetch_add(1, Ordering::SeqCst);
        Ok(ProcessOutcome::Success(vec![]))
    }

    fn is_transient(&self, _error: &Self::Error) -> bool {
        false
    }
}

async fn write_numbered_lines(path: &Path, count: usize) {
    let content = (0..count).map(|i| format!("line-{i}")).collect::<Vec<_>>().join("\n");
    tokio::fs::write(path, content).await.unwrap();
}

#[tokio::test]
async fn pause_blocks_new_records_and_resume_lets_them_through() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("in.txt");
    write_numbered_lines(&input_path, 20).await;

    let checker = Arc::new(SlowChecker {
        processed: AtomicUsize::new(0),
    });
    let metrics = Arc::new(Metrics::new(0));
    let pause_gate = Arc::new(PauseGate::new());

    let engine = Arc::new(CheckerEngine::new(
        Arc::clone(&checker),
        EngineConfig {
            parallelism: 2,
            max_retries: 0,
            ..Default::default()
        },
        Arc::clone(&metrics),
        Arc::clone(&pause_gate),
        None,
        WriterConfig::default(),
    ));

    pause_gate.pause();
    let run_engine = Arc::clone(&engine);
    let handle = tokio::spawn(async move {
        run_engine.run(&input_path, CancellationToken::new()).await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        checker.processed.load(Ordering::SeqCst),
        0,
        "no record should be processed while the gate is held closed"
    );

    pause_gate.resume();
    handle.await.unwrap().unwrap();
    assert_eq!(checker.processed.load(Ordering::SeqCst), 20);
}

#[tokio::test]
async fn cancel_mid_run_stops_new_output_without_hanging() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("in.txt");
    write_numbered_lines(&input_path, 200).await;

    let checker = Arc::new(SlowChecker {
        processed: AtomicUsize::new(0),
    });
    let metrics = Arc::new(Metrics::new(0));
    let cancel = CancellationToken::new();

    let engine = CheckerEngine::new(
        checker,
        EngineConfig {
            parallelism: 4,
            max_retries: 0,
            ..Default::default()
        },
        Arc::clone(&metrics),
        Arc::new(PauseGate::new()),
        None,
        WriterConfig::default(),
    );

    let run_cancel = cancel.clone();
    let run = tokio::spawn(async move { engine.run(&input_path, run_cancel).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("shutdown must complete promptly after cancellation")
        .unwrap();
    assert!(
        matches!(result, Ok(()) | Err(checkerbase_core::EngineError::Cancelled)),
        "a cancelled run should complete cleanly, not surface as a fatal error"
    );

    let processed_at_cancel = metrics.snapshot().processed_lines;
    assert!(processed_at_cancel < 200, "cancellation should cut the run short");
}
