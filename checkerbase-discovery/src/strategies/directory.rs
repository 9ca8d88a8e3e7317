use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::autoconfig::parse_autoconfig_xml;
use crate::model::{ServerConfig, Source};
use crate::strategy::DiscoveryStrategy;

/// Priority 1: Mozilla's centrally hosted ISPDB, keyed by domain.
pub struct DirectoryLookupStrategy {
    client: Client,
}

impl DirectoryLookupStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiscoveryStrategy for DirectoryLookupStrategy {
    fn priority(&self) -> i32 {
        Source::Ispdb.priority()
    }

    fn name(&self) -> &'static str {
        "directory_lookup"
    }

    async fn discover(&self, domain: &str, _cancel: &CancellationToken) -> Vec<ServerConfig> {
        let url = format!("https://live.thunderbird.net/autoconfig/v1.1/{domain}");
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => parse_autoconfig_xml(&body, Source::Ispdb),
                Err(e) => {
                    debug!(%domain, error = %e, "directory lookup: failed to read response body");
                    Vec::new()
                }
            },
            Ok(resp) => {
                debug!(%domain, status = %resp.status(), "directory lookup: non-success response");
                Vec::new()
            }
            Err(e) => {
                debug!(%domain, error = %e, "directory lookup: request failed");
                Vec::new()
            }
        }
    }
}
