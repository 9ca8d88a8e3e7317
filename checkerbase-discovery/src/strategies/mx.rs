use std::sync::Arc;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::ServerConfig;
use crate::strategy::DiscoveryStrategy;
use crate::strategies::{DirectoryLookupStrategy, WellKnownUrlsStrategy};

/// Priority 3: resolve the domain's MX records, take the lowest-`preference`
/// (i.e. most preferred) exchange, and derive a bare two-label provider
/// domain from it (`aspmx.l.google.com` -> `google.com`). If that provider
/// differs from the original domain, strategies 1 and 2 are repeated against
/// it — a large fraction of hosted-mail domains publish autoconfig only
/// under the provider's own domain, not the customer's.
///
/// The two-label derivation is wrong for multi-label public suffixes like
/// `.co.uk`; this is an acknowledged limitation, not a bug to silently fix.
pub struct MxProviderStrategy {
    resolver: Arc<TokioAsyncResolver>,
    directory: DirectoryLookupStrategy,
    well_known: WellKnownUrlsStrategy,
}

impl MxProviderStrategy {
    pub fn new(resolver: Arc<TokioAsyncResolver>, client: Client) -> Self {
        Self {
            resolver,
            directory: DirectoryLookupStrategy::new(client.clone()),
            well_known: WellKnownUrlsStrategy::new(client),
        }
    }

    /// Lowest-preference (most preferred) MX exchange hostname, trailing dot
    /// trimmed.
    async fn lowest_preference_exchange(&self, domain: &str) -> Option<String> {
        let lookup = self.resolver.mx_lookup(domain).await.ok()?;
        lookup
            .iter()
            .min_by_key(|mx| mx.preference())
            .map(|mx| mx.exchange().to_utf8().trim_end_matches('.').to_string())
    }
}

/// Bare two-label provider domain from a hostname, e.g.
/// `aspmx.l.google.com` -> `google.com`. Returns `None` if the hostname has
/// fewer than two labels.
fn two_label_provider(hostname: &str) -> Option<String> {
    let labels: Vec<&str> = hostname.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() < 2 {
        return None;
    }
    Some(labels[labels.len() - 2..].join("."))
}

#[async_trait]
impl DiscoveryStrategy for MxProviderStrategy {
    fn priority(&self) -> i32 {
        3
    }

    fn name(&self) -> &'static str {
        "mx_provider"
    }

    async fn discover(&self, domain: &str, cancel: &CancellationToken) -> Vec<ServerConfig> {
        let Some(exchange) = self.lowest_preference_exchange(domain).await else {
            debug!(%domain, "mx provider: no MX records resolved");
            return Vec::new();
        };

        let Some(provider) = two_label_provider(&exchange) else {
            return Vec::new();
        };

        if provider.eq_ignore_ascii_case(domain) {
            return Vec::new();
        }

        debug!(%domain, %exchange, %provider, "mx provider: re-running directory+well-known against derived provider");

        let mut results = self.directory.discover(&provider, cancel).await;
        if results.is_empty() {
            results = self.well_known.discover(&provider, cancel).await;
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_two_label_provider_from_hosted_exchange() {
        assert_eq!(two_label_provider("aspmx.l.google.com"), Some("google.com".to_string()));
        assert_eq!(two_label_provider("mail.example.com"), Some("example.com".to_string()));
        assert_eq!(two_label_provider("example.com"), Some("example.com".to_string()));
        assert_eq!(two_label_provider("com"), None);
        assert_eq!(two_label_provider(""), None);
    }

    #[test]
    fn two_label_heuristic_is_wrong_for_second_level_tlds_by_design() {
        // example.co.uk would derive "co.uk", not "example.co.uk" -- an
        // acknowledged limitation, not something this strategy corrects.
        assert_eq!(two_label_provider("mail.example.co.uk"), Some("co.uk".to_string()));
    }
}
