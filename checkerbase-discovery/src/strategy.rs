use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::model::ServerConfig;

/// One independent probe for mail server configuration. Implementations must
/// be side-effect-free beyond network I/O and resilient: any internal
/// failure is swallowed and surfaces as an empty list, never an error.
#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    /// Stable numeric priority. Lower runs are considered more authoritative
    /// during the service's dedup pass (see [`ServerConfig::dedup_key`]).
    fn priority(&self) -> i32;

    fn name(&self) -> &'static str;

    async fn discover(&self, domain: &str, cancel: &CancellationToken) -> Vec<ServerConfig>;
}
