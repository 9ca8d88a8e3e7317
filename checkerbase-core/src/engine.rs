use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::checker::{Checker, ProcessOutcome};
use crate::error::{EngineError, Result};
use crate::line::{Line, OutputEntry, OutputKind};
use crate::metrics::{BytesReadSink, Metrics};
use crate::pause_gate::PauseGate;
use crate::reader::LineReader;
use crate::rotator::ProxyRotator;
use crate::writer::{ResultWriter, WriterConfig};

/// Tunables that do not belong to any single component.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub parallelism: usize,
    pub max_retries: u32,
    pub input_channel_capacity: usize,
    pub segment_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            max_retries: 0,
            input_channel_capacity: crate::reader::DEFAULT_LINE_QUEUE_CAPACITY,
            segment_size: crate::reader::DEFAULT_SEGMENT_SIZE,
        }
    }
}

/// Orchestrates the reader, worker pool, and writer for a single run.
/// Generic over the checker implementation; never inspects `C::Record` or
/// `C::Client` beyond passing them through.
pub struct CheckerEngine<C: Checker> {
    checker: Arc<C>,
    config: EngineConfig,
    metrics: Arc<Metrics>,
    pause_gate: Arc<PauseGate>,
    proxies: Option<Arc<ProxyRotator<String>>>,
    writer_config: WriterConfig,
}

impl<C: Checker> CheckerEngine<C> {
    pub fn new(
        checker: Arc<C>,
        config: EngineConfig,
        metrics: Arc<Metrics>,
        pause_gate: Arc<PauseGate>,
        proxies: Option<Arc<ProxyRotator<String>>>,
        writer_config: WriterConfig,
    ) -> Self {
        Self {
            checker,
            config,
            metrics,
            pause_gate,
            proxies,
            writer_config,
        }
    }

    /// Runs the pipeline to completion: measures the file, starts the clock,
    /// spawns reader/workers/writer, then tears them down in the mandated
    /// order. Single-use — construct a new engine for each run.
    pub async fn run(&self, input_path: &Path, cancel: CancellationToken) -> Result<()> {
        let file_len = tokio::fs::metadata(input_path).await?.len();
        self.metrics.set_total_bytes(file_len);
        self.metrics.start();

        let success_configured = self.writer_config.success_path.is_some();
        let failed_configured = self.writer_config.failed_path.is_some();
        let ignored_configured = self.writer_config.ignored_path.is_some();

        let (line_tx, line_rx) = mpsc::channel::<Line>(self.config.input_channel_capacity);
        let (output_tx, output_rx) = mpsc::unbounded_channel::<OutputEntry>();
        let line_rx = Arc::new(AsyncMutex::new(line_rx));

        let reader = LineReader::new(self.config.segment_size);
        let reader_metrics: Arc<dyn BytesReadSink> = self.metrics.clone();
        let reader_cancel = cancel.clone();
        let reader_path = input_path.to_path_buf();
        let reader_handle = tokio::spawn(async move {
            reader.run(&reader_path, line_tx, reader_metrics, reader_cancel).await
        });

        let mut worker_handles = Vec::with_capacity(self.config.parallelism);
        for _ in 0..self.config.parallelism {
            let checker = Arc::clone(&self.checker);
            let line_rx = Arc::clone(&line_rx);
            let output_tx = output_tx.clone();
            let pause_gate = Arc::clone(&self.pause_gate);
            let metrics = Arc::clone(&self.metrics);
            let proxies = self.proxies.clone();
            let max_retries = self.config.max_retries;
            let cancel = cancel.clone();
            worker_handles.push(tokio::spawn(async move {
                worker_loop(
                    checker,
                    line_rx,
                    output_tx,
                    pause_gate,
                    metrics,
                    proxies,
                    max_retries,
                    cancel,
                    success_configured,
                    failed_configured,
                    ignored_configured,
                )
                .await;
            }));
        }
        drop(output_tx);

        let writer = ResultWriter::new(WriterConfig {
            success_path: self.writer_config.success_path.clone(),
            failed_path: self.writer_config.failed_path.clone(),
            ignored_path: self.writer_config.ignored_path.clone(),
            append_to_existing: self.writer_config.append_to_existing,
            max_batch_size: self.writer_config.max_batch_size,
            flush_interval: self.writer_config.flush_interval,
            formatter: self.writer_config.formatter.clone(),
        });
        let writer_handle = tokio::spawn(writer.run(output_rx));

        // 1. Await the reader; on failure cancel the linked scope, but keep going —
        //    steps 2-6 below must still run "in all cases" per the shutdown contract.
        let reader_result = match reader_handle.await {
            Ok(result) => result,
            Err(join_err) => Err(EngineError::from(join_err)),
        };
        if reader_result.is_err() {
            cancel.cancel();
        }
        // 2. The line queue closes automatically: the reader task owned the only
        //    sender and it was dropped when the task above completed.

        // 3. Await *all* workers regardless of whether the reader or an earlier
        //    worker failed — abandoning still-running workers would leave their
        //    output_tx clones open (keeping the output queue from closing) and
        //    the writer task unjoined.
        let mut worker_error: Option<EngineError> = None;
        for handle in worker_handles {
            if let Err(join_err) = handle.await {
                if worker_error.is_none() {
                    worker_error = Some(EngineError::from(join_err));
                }
            }
        }
        if worker_error.is_some() {
            cancel.cancel();
        }

        // 4. The output queue closes automatically once every worker's sender clone
        //    has been dropped (each worker task has now completed).

        // 5. Await the writer regardless of the outcome above; swallow a
        //    cancellation-only completion.
        let writer_error = match writer_handle.await {
            Ok(Ok(())) => None,
            Ok(Err(EngineError::Cancelled)) => None,
            Ok(Err(e)) => Some(e),
            Err(join_err) => Some(EngineError::from(join_err)),
        };

        // 6. Stop metrics.
        self.metrics.stop();

        if let Some(e) = worker_error {
            return Err(e);
        }
        if let Some(e) = writer_error {
            return Err(e);
        }
        reader_result
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn pause_gate(&self) -> Arc<PauseGate> {
        Arc::clone(&self.pause_gate)
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop<C: Checker>(
    checker: Arc<C>,
    line_rx: Arc<AsyncMutex<mpsc::Receiver<Line>>>,
    output_tx: mpsc::UnboundedSender<OutputEntry>,
    pause_gate: Arc<PauseGate>,
    metrics: Arc<Metrics>,
    proxies: Option<Arc<ProxyRotator<String>>>,
    max_retries: u32,
    cancel: CancellationToken,
    success_configured: bool,
    failed_configured: bool,
    ignored_configured: bool,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let line = {
            let mut rx = line_rx.lock().await;
            rx.recv().await
        };
        let Some(line) = line else {
            return;
        };

        pause_gate.wait_until_open().await;
        if cancel.is_cancelled() {
            return;
        }

        if !checker.quick_validate(line.as_str()) {
            metrics.inc_ignored();
            continue;
        }

        let Some(record) = checker.parse(&line) else {
            metrics.inc_ignored();
            if ignored_configured {
                let _ = output_tx.send(OutputEntry::new(OutputKind::Ignored, line.clone(), vec![]));
            }
            continue;
        };

        let mut retry_count = 0u32;
        loop {
            let proxy = proxies.as_ref().and_then(|p| p.next().cloned());
            let client_result = checker.create_client(proxy.as_deref()).await;

            let mut client = match client_result {
                Ok(client) => client,
                Err(e) => {
                    if cancel.is_cancelled() {
                        return;
                    }
                    if checker.is_transient(&e) && retry_count < max_retries {
                        metrics.inc_retries();
                        retry_count += 1;
                        continue;
                    }
                    metrics.inc_failed();
                    if failed_configured {
                        let _ = output_tx.send(OutputEntry::new(OutputKind::Failed, line.clone(), vec![]));
                    }
                    break;
                }
            };

            let outcome = checker.process(&record, &mut client, &cancel).await;
            drop(client); // scoped client: released on every exit path, never reused across retries

            match outcome {
                Err(e) => {
                    if cancel.is_cancelled() {
                        return;
                    }
                    if checker.is_transient(&e) && retry_count < max_retries {
                        metrics.inc_retries();
                        retry_count += 1;
                        continue;
                    }
                    metrics.inc_failed();
                    if failed_configured {
                        let _ = output_tx.send(OutputEntry::new(OutputKind::Failed, line.clone(), vec![]));
                    }
                    break;
                }
                Ok(ProcessOutcome::Success(captures)) => {
                    metrics.inc_success();
                    let _ = output_tx.send(OutputEntry::new(OutputKind::Success, line.clone(), captures));
                    break;
                }
                Ok(ProcessOutcome::Failed) => {
                    metrics.inc_failed();
                    if failed_configured {
                        let _ = output_tx.send(OutputEntry::new(OutputKind::Failed, line.clone(), vec![]));
                    }
                    break;
                }
                Ok(ProcessOutcome::Ignored) => {
                    metrics.inc_ignored();
                    if ignored_configured {
                        let _ = output_tx.send(OutputEntry::new(OutputKind::Ignored, line.clone(), vec![]));
                    }
                    break;
                }
                Ok(ProcessOutcome::Retry(_cause)) => {
                    if retry_count < max_retries {
                        metrics.inc_retries();
                        retry_count += 1;
                        continue;
                    }
                    metrics.inc_failed();
                    if failed_configured {
                        let _ = output_tx.send(OutputEntry::new(OutputKind::Failed, line.clone(), vec![]));
                    }
                    break;
                }
            }
        }
    }
}
