use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Receives byte-consumption notifications from the reader. Implemented by
/// [`Metrics`]; kept as a separate trait so the reader does not depend on the
/// concrete metrics type.
pub trait BytesReadSink: Send + Sync {
    fn on_bytes_read(&self, delta: u64);
}

#[derive(Debug)]
struct Stopwatch {
    running_since: Option<Instant>,
    accumulated: Duration,
}

impl Stopwatch {
    fn new() -> Self {
        Self {
            running_since: None,
            accumulated: Duration::ZERO,
        }
    }

    fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    fn resume(&mut self) {
        self.start();
    }

    fn stop(&mut self) {
        self.pause();
    }

    fn elapsed(&self) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + since.elapsed(),
            None => self.accumulated,
        }
    }
}

/// Immutable point-in-time view of [`Metrics`]. Derived fields are computed
/// from a single consistent read of each counter; the snapshot as a whole is
/// not required to be atomic (a skew of a few counts across fields is
/// acceptable for a live progress display).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub total_bytes: u64,
    pub processed_bytes: u64,
    pub processed_lines: u64,
    pub success: u64,
    pub failed: u64,
    pub ignored: u64,
    pub retries: u64,
    pub elapsed: Duration,
    pub progress_percent: f64,
    pub cpm: f64,
    pub bytes_per_sec: f64,
    pub eta: Option<Duration>,
}

/// Process-wide, thread-safe counters plus a pause-aware stopwatch. Counters
/// are `AtomicI64` (rather than `AtomicU64`) so that unexpected downward
/// adjustments in test fakes don't wrap silently; production code only ever
/// adds non-negative deltas.
#[derive(Debug)]
pub struct Metrics {
    total_bytes: AtomicI64,
    processed_bytes: AtomicI64,
    success: AtomicI64,
    failed: AtomicI64,
    ignored: AtomicI64,
    retries: AtomicI64,
    stopwatch: Mutex<Stopwatch>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Metrics {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes: AtomicI64::new(total_bytes as i64),
            processed_bytes: AtomicI64::new(0),
            success: AtomicI64::new(0),
            failed: AtomicI64::new(0),
            ignored: AtomicI64::new(0),
            retries: AtomicI64::new(0),
            stopwatch: Mutex::new(Stopwatch::new()),
        }
    }

    pub fn set_total_bytes(&self, total_bytes: u64) {
        self.total_bytes.store(total_bytes as i64, Ordering::Release);
    }

    pub fn start(&self) {
        self.stopwatch.lock().unwrap().start();
    }

    pub fn stop(&self) {
        self.stopwatch.lock().unwrap().stop();
    }

    pub fn pause(&self) {
        self.stopwatch.lock().unwrap().pause();
    }

    pub fn resume(&self) {
        self.stopwatch.lock().unwrap().resume();
    }

    pub fn inc_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_bytes = self.total_bytes.load(Ordering::Acquire).max(0) as u64;
        let processed_bytes = self.processed_bytes.load(Ordering::Acquire).max(0) as u64;
        let success = self.success.load(Ordering::Acquire).max(0) as u64;
        let failed = self.failed.load(Ordering::Acquire).max(0) as u64;
        let ignored = self.ignored.load(Ordering::Acquire).max(0) as u64;
        let retries = self.retries.load(Ordering::Acquire).max(0) as u64;
        let elapsed = self.stopwatch.lock().unwrap().elapsed();

        let processed_lines = success + failed + ignored;

        let progress_percent = if total_bytes > 0 {
            (processed_bytes as f64 / total_bytes as f64) * 100.0
        } else {
            0.0
        };

        let elapsed_secs = elapsed.as_secs_f64();
        let bytes_per_sec = if elapsed_secs > 0.0 {
            processed_bytes as f64 / elapsed_secs
        } else {
            0.0
        };

        let eta = if bytes_per_sec > 0.0 && total_bytes >= processed_bytes {
            let remaining = (total_bytes - processed_bytes) as f64;
            Some(Duration::from_secs_f64(remaining / bytes_per_sec))
        } else {
            None
        };

        let elapsed_minutes = elapsed_secs / 60.0;
        let cpm = if elapsed_minutes > 0.0 {
            processed_lines as f64 / elapsed_minutes
        } else {
            0.0
        };

        MetricsSnapshot {
            total_bytes,
            processed_bytes,
            processed_lines,
            success,
            failed,
            ignored,
            retries,
            elapsed,
            progress_percent,
            cpm,
            bytes_per_sec,
            eta,
        }
    }
}

impl BytesReadSink for Metrics {
    fn on_bytes_read(&self, delta: u64) {
        self.processed_bytes.fetch_add(delta as i64, Ordering::Relaxed);
    }
}
