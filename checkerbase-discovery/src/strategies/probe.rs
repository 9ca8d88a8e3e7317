use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::{Security, ServerConfig, Source, UsernameFormat};
use crate::strategy::DiscoveryStrategy;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const HOST_PREFIXES: [&str; 3] = ["imap.", "mail.", ""];
/// (port, security) pairs attempted against every host prefix.
const PORTS: [(u16, Security); 2] = [(993, Security::Ssl), (143, Security::Starttls)];

/// Priority 4, last resort: attempt a live connection to a handful of
/// conventional IMAP hostnames. A successful connect-and-disconnect (a TLS
/// handshake for the SSL port, a bare TCP connect for STARTTLS, since the
/// upgrade itself only happens after login) yields a candidate.
///
/// Honors each candidate's own `security` when deciding how to probe it,
/// rather than a single fixed connection mode for every attempt.
pub struct ProbeStrategy {
    tls_connector: TlsConnector,
    timeout: Duration,
}

impl ProbeStrategy {
    pub fn new(tls_connector: TlsConnector, timeout: Duration) -> Self {
        Self { tls_connector, timeout }
    }

    async fn probe_one(&self, host: &str, port: u16, security: Security) -> bool {
        let addr = format!("{host}:{port}");
        let attempt = async {
            let stream = TcpStream::connect(&addr).await.ok()?;
            match security {
                Security::Ssl => {
                    let server_name = ServerName::try_from(host.to_string()).ok()?;
                    let mut tls = self.tls_connector.connect(server_name, stream).await.ok()?;
                    tokio::io::AsyncWriteExt::shutdown(&mut tls).await.ok();
                    Some(())
                }
                Security::Starttls | Security::NoSecurity => {
                    let mut stream = stream;
                    tokio::io::AsyncWriteExt::shutdown(&mut stream).await.ok();
                    Some(())
                }
            }
        };

        tokio::time::timeout(self.timeout, attempt).await.ok().flatten().is_some()
    }
}

#[async_trait]
impl DiscoveryStrategy for ProbeStrategy {
    fn priority(&self) -> i32 {
        Source::Guess.priority()
    }

    fn name(&self) -> &'static str {
        "probe"
    }

    async fn discover(&self, domain: &str, cancel: &CancellationToken) -> Vec<ServerConfig> {
        let mut found = Vec::new();
        for prefix in HOST_PREFIXES {
            if cancel.is_cancelled() {
                break;
            }
            let host = format!("{prefix}{domain}");
            for (port, security) in PORTS {
                if cancel.is_cancelled() {
                    break;
                }
                if self.probe_one(&host, port, security).await {
                    debug!(%host, port, "probe: connect succeeded");
                    found.push(ServerConfig::new(host.clone(), port, security, UsernameFormat::Email, Source::Guess));
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector() -> TlsConnector {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }

    #[tokio::test]
    async fn unreachable_host_yields_no_candidates() {
        let strategy = ProbeStrategy::new(connector(), Duration::from_millis(200));
        let cancel = CancellationToken::new();
        let results = strategy.discover("unreachable.invalid.example.test", &cancel).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_further_attempts() {
        let strategy = ProbeStrategy::new(connector(), Duration::from_millis(200));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let results = strategy.discover("example.com", &cancel).await;
        assert!(results.is_empty());
    }
}
