//! Bounded streaming pipeline and retry/classification engine for
//! high-throughput, line-oriented batch processing.
//!
//! Data flow: file -> [`reader::LineReader`] -> bounded line channel ->
//! worker pool (parallel, driven by a user-supplied [`checker::Checker`]) ->
//! unbounded output channel -> [`writer::ResultWriter`] -> success/failed/
//! ignored files. [`metrics::Metrics`] is updated by the reader (bytes) and
//! workers (counts). [`controller::EngineController`] wraps the whole thing
//! in a state machine with pause/resume/cancel and byte-offset resume.

pub mod checker;
pub mod checkpoint;
pub mod controller;
pub mod engine;
pub mod error;
pub mod line;
pub mod metrics;
pub mod pause_gate;
pub mod reader;
pub mod rotator;
pub mod writer;

pub use checker::{Checker, ProcessOutcome};
pub use checkpoint::{CheckpointData, CheckpointManager, CheckpointStore};
pub use controller::{EngineController, EngineSettings, EngineState, StateChangeEvent};
pub use engine::{CheckerEngine, EngineConfig};
pub use error::{EngineError, Result};
pub use line::{Capture, Line, OutputEntry, OutputKind};
pub use metrics::{BytesReadSink, Metrics, MetricsSnapshot};
pub use pause_gate::PauseGate;
pub use reader::LineReader;
pub use rotator::{ProxyRotator, RoundRobinRotator};
pub use writer::{ResultWriter, WriterConfig, WriterStats, WriterStatsSnapshot};
