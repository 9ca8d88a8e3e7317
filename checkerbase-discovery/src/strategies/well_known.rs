use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::autoconfig::parse_autoconfig_xml;
use crate::model::{ServerConfig, Source};
use crate::strategy::DiscoveryStrategy;

/// Priority 2: the two well-known autoconfig URLs a domain may serve itself,
/// tried in order. The first URL to yield any candidates wins.
pub struct WellKnownUrlsStrategy {
    client: Client,
}

impl WellKnownUrlsStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn try_url(&self, url: &str) -> Vec<ServerConfig> {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => parse_autoconfig_xml(&body, Source::Autoconfig),
                Err(e) => {
                    debug!(%url, error = %e, "well-known lookup: failed to read response body");
                    Vec::new()
                }
            },
            Ok(resp) => {
                debug!(%url, status = %resp.status(), "well-known lookup: non-success response");
                Vec::new()
            }
            Err(e) => {
                debug!(%url, error = %e, "well-known lookup: request failed");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl DiscoveryStrategy for WellKnownUrlsStrategy {
    fn priority(&self) -> i32 {
        Source::Autoconfig.priority()
    }

    fn name(&self) -> &'static str {
        "well_known_urls"
    }

    async fn discover(&self, domain: &str, _cancel: &CancellationToken) -> Vec<ServerConfig> {
        let first = self
            .try_url(&format!("https://autoconfig.{domain}/mail/config-v1.1.xml"))
            .await;
        if !first.is_empty() {
            return first;
        }
        self.try_url(&format!("https://{domain}/.well-known/autoconfig/mail/config-v1.1.xml"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_matches_autoconfig_source() {
        let strategy = WellKnownUrlsStrategy::new(Client::new());
        assert_eq!(strategy.priority(), 2);
        assert_eq!(strategy.name(), "well_known_urls");
    }
}
