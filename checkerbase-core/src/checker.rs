use crate::line::{Capture, Line};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Outcome of processing a single parsed record.
///
/// `Success` and `Failed` and `Ignored` are terminal; `Retry` is transient
/// and re-enters the worker's retry loop until `max_retries` is exhausted.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Success(Vec<Capture>),
    Failed,
    Ignored,
    Retry(Option<String>),
}

/// The capability set the engine depends on. Implementations supply the
/// domain-specific record type, parse failure is absence rather than error,
/// and clients are scoped per attempt rather than shared across retries.
///
/// This is deliberately not object-safe (associated types prevent `dyn
/// Checker`): the engine is generic over `C: Checker` and monomorphized at
/// its construction site. The engine itself never inspects `Record` or
/// `Client` internals.
#[async_trait]
pub trait Checker: Send + Sync + 'static {
    type Record: Send + 'static;
    type Client: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Allocation-free prefilter run before `parse`. Lines failing this check
    /// are counted `ignored` and never emitted.
    fn quick_validate(&self, line: &str) -> bool;

    /// Returns `None` on parse failure (absence, not an error).
    fn parse(&self, line: &Line) -> Option<Self::Record>;

    /// Constructs a scoped client for one processing attempt. `proxy` is the
    /// address string yielded by the engine's proxy rotator, if configured.
    async fn create_client(&self, proxy: Option<&str>) -> Result<Self::Client, Self::Error>;

    /// Processes one record using a freshly created client. May suspend.
    async fn process(
        &self,
        record: &Self::Record,
        client: &mut Self::Client,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome, Self::Error>;

    /// Decides whether an error from `process` or `create_client` should be
    /// retried (transient) or counted as a terminal failure.
    fn is_transient(&self, error: &Self::Error) -> bool;
}
