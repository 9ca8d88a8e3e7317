use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::ServerConfig;
use crate::registry::ServerRegistry;
use crate::strategy::DiscoveryStrategy;
use crate::tracker::PendingDiscoveryTracker;

pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CANDIDATE_TTL: Duration = Duration::from_secs(24 * 3600);
pub const DEFAULT_VERIFIED_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

#[derive(Debug, Clone, Copy)]
pub struct DiscoveryConfig {
    pub strategy_timeout: Duration,
    pub candidate_ttl: Duration,
    pub verified_ttl: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            strategy_timeout: DEFAULT_STRATEGY_TIMEOUT,
            candidate_ttl: DEFAULT_CANDIDATE_TTL,
            verified_ttl: DEFAULT_VERIFIED_TTL,
        }
    }
}

/// Orchestrates the four discovery strategies behind a registry cache and a
/// single-flight tracker so concurrent lookups for the same domain collapse
/// into one fan-out.
pub struct DiscoveryService {
    registry: Arc<ServerRegistry>,
    tracker: Arc<PendingDiscoveryTracker>,
    strategies: Vec<Arc<dyn DiscoveryStrategy>>,
    config: DiscoveryConfig,
}

impl DiscoveryService {
    pub fn new(
        registry: Arc<ServerRegistry>,
        strategies: Vec<Arc<dyn DiscoveryStrategy>>,
        config: DiscoveryConfig,
    ) -> Self {
        let mut strategies = strategies;
        strategies.sort_by_key(|s| s.priority());
        Self {
            registry,
            tracker: Arc::new(PendingDiscoveryTracker::new()),
            strategies,
            config,
        }
    }

    /// Returns candidates for `domain`, consulting the verified cache, the
    /// candidate cache, and finally live discovery (coalesced per domain).
    pub async fn get_candidates(&self, domain: &str, cancel: &CancellationToken) -> Vec<ServerConfig> {
        let domain = domain.to_ascii_lowercase();

        if let Ok(Some(verified)) = self.registry.get_verified(&domain).await {
            return vec![verified];
        }

        if let Ok(cached) = self.registry.get_candidates(&domain).await {
            if !cached.is_empty() {
                return cached;
            }
        }

        let (is_first, future) = self.tracker.get_or_create(&domain);
        if !is_first {
            debug!(%domain, "discovery: joining an in-flight lookup");
            return future.await.unwrap_or_default();
        }

        let result = self.run_discovery(&domain, cancel).await;

        if !result.is_empty() {
            if let Err(e) = self
                .registry
                .set_candidates(&domain, &result, self.config.candidate_ttl)
                .await
            {
                warn!(%domain, error = %e, "discovery: failed to persist candidates, continuing without cache");
            }
        }

        self.tracker.complete(&domain, Ok(result.clone()));
        result
    }

    /// Marks `config` as verified for `domain`; subsequent fast-path lookups
    /// return only this configuration until it expires.
    pub async fn mark_verified(&self, domain: &str, config: &ServerConfig) {
        let domain = domain.to_ascii_lowercase();
        if let Err(e) = self
            .registry
            .set_verified(&domain, config, self.config.verified_ttl)
            .await
        {
            warn!(%domain, error = %e, "discovery: failed to persist verified config");
        }
    }

    async fn run_discovery(&self, domain: &str, cancel: &CancellationToken) -> Vec<ServerConfig> {
        let mut aggregated = Vec::new();
        for strategy in &self.strategies {
            if cancel.is_cancelled() {
                break;
            }
            let fut = strategy.discover(domain, cancel);
            match tokio::time::timeout(self.config.strategy_timeout, fut).await {
                Ok(results) => aggregated.extend(results),
                Err(_) => debug!(%domain, strategy = strategy.name(), "discovery: strategy timed out"),
            }
        }
        info!(%domain, found = aggregated.len(), "discovery: strategy fan-out complete");
        dedupe_by_host_port(aggregated)
    }
}

/// Groups by case-insensitive `(hostname, port)`, keeping only the
/// lowest-priority (most authoritative) entry per group, then sorts the
/// result by priority ascending.
fn dedupe_by_host_port(configs: Vec<ServerConfig>) -> Vec<ServerConfig> {
    let mut best: HashMap<(String, u16), ServerConfig> = HashMap::new();
    for config in configs {
        let key = config.dedup_key();
        match best.get(&key) {
            Some(existing) if existing.priority <= config.priority => {}
            _ => {
                best.insert(key, config);
            }
        }
    }
    let mut result: Vec<ServerConfig> = best.into_values().collect();
    result.sort_by_key(|c| c.priority);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Security, Source, UsernameFormat};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(hostname: &str, port: u16, source: Source) -> ServerConfig {
        ServerConfig::new(hostname, port, Security::Ssl, UsernameFormat::Email, source)
    }

    #[test]
    fn dedup_keeps_lowest_priority_and_sorts_ascending() {
        let configs = vec![
            config("imap.x.com", 993, Source::Autoconfig), // priority 2
            config("IMAP.x.com", 993, Source::Ispdb),      // priority 1, case-insensitive match
            config("imap.x.com", 143, Source::Mx),         // priority 3, distinct port
        ];
        let deduped = dedupe_by_host_port(configs);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].hostname, "IMAP.x.com");
        assert_eq!(deduped[0].port, 993);
        assert_eq!(deduped[0].priority, 1);
        assert_eq!(deduped[1].port, 143);
    }

    struct CountingStrategy {
        priority: i32,
        calls: Arc<AtomicUsize>,
        result: ServerConfig,
    }

    #[async_trait]
    impl DiscoveryStrategy for CountingStrategy {
        fn priority(&self) -> i32 {
            self.priority
        }
        fn name(&self) -> &'static str {
            "counting"
        }
        async fn discover(&self, _domain: &str, _cancel: &CancellationToken) -> Vec<ServerConfig> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            vec![self.result.clone()]
        }
    }

    #[tokio::test]
    async fn concurrent_lookups_for_the_same_domain_run_strategies_once() {
        let registry = Arc::new(ServerRegistry::connect_in_memory().await.unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = Arc::new(CountingStrategy {
            priority: 1,
            calls: Arc::clone(&calls),
            result: config("imap.example.com", 993, Source::Ispdb),
        });
        let service = Arc::new(DiscoveryService::new(
            registry,
            vec![strategy],
            DiscoveryConfig::default(),
        ));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.get_candidates("example.com", &CancellationToken::new()).await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "strategy should run exactly once");
        for result in &results {
            assert_eq!(result, &results[0]);
        }
    }

    #[tokio::test]
    async fn verified_fast_path_short_circuits_discovery() {
        let registry = Arc::new(ServerRegistry::connect_in_memory().await.unwrap());
        let verified = config("verified.example.com", 993, Source::Ispdb);
        registry
            .set_verified("example.com", &verified, Duration::from_secs(3600))
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = Arc::new(CountingStrategy {
            priority: 1,
            calls: Arc::clone(&calls),
            result: config("other.example.com", 993, Source::Ispdb),
        });
        let service = DiscoveryService::new(registry, vec![strategy], DiscoveryConfig::default());

        let result = service.get_candidates("example.com", &CancellationToken::new()).await;
        assert_eq!(result, vec![verified]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
