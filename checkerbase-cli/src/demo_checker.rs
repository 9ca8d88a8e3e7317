//! A runnable instantiation of the [`checkerbase_core::Checker`] contract,
//! demonstrating how a checker consults [`DiscoveryService`] for per-domain
//! server candidates. The wire protocol this checker "speaks" is a
//! deliberate stand-in: a TCP connect plus a read of the IMAP greeting
//! banner, not a full SASL login. The engine's contract only requires a
//! classified [`ProcessOutcome`]; faking a protocol the demo does not
//! actually implement would be dishonest about what is tested.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use checkerbase_core::{Checker, Line, ProcessOutcome};
use checkerbase_discovery::{DiscoveryService, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

const GREETING_TIMEOUT: Duration = Duration::from_secs(5);
const GREETING_BUF_SIZE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum DemoCheckerError {
    #[error("no server candidates found for domain")]
    NoServerFound,

    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("connection attempt timed out")]
    Timeout,

    #[error("server greeting did not look like an IMAP banner")]
    UnexpectedGreeting,
}

#[derive(Debug, Clone)]
pub struct DemoRecord {
    pub email: String,
    pub password: String,
    pub domain: String,
}

/// A per-attempt dialer. Proxy support is recorded but not wired to an
/// actual SOCKS/HTTP CONNECT handshake here — that belongs to whatever real
/// network library a production checker uses; this demo only exercises the
/// engine's scoped-client lifecycle.
pub struct DemoClient {
    pub proxy: Option<String>,
}

/// Parses `email:password` lines and checks IMAP reachability for the
/// email's domain via [`DiscoveryService`], without attempting a real login.
pub struct DemoChecker {
    discovery: Arc<DiscoveryService>,
}

impl DemoChecker {
    pub fn new(discovery: Arc<DiscoveryService>) -> Self {
        Self { discovery }
    }

    async fn try_candidate(&self, candidate: &ServerConfig) -> Result<(), DemoCheckerError> {
        let addr = format!("{}:{}", candidate.hostname, candidate.port);
        let connect = TcpStream::connect(&addr);
        let mut stream = tokio::time::timeout(GREETING_TIMEOUT, connect)
            .await
            .map_err(|_| DemoCheckerError::Timeout)??;

        let mut buf = [0u8; GREETING_BUF_SIZE];
        let read = tokio::time::timeout(GREETING_TIMEOUT, stream.read(&mut buf))
            .await
            .map_err(|_| DemoCheckerError::Timeout)??;

        let _ = stream.shutdown().await;

        let greeting = String::from_utf8_lossy(&buf[..read]);
        if greeting.trim_start().starts_with("* OK") || greeting.trim_start().starts_with('*') {
            Ok(())
        } else {
            Err(DemoCheckerError::UnexpectedGreeting)
        }
    }
}

#[async_trait]
impl Checker for DemoChecker {
    type Record = DemoRecord;
    type Client = DemoClient;
    type Error = DemoCheckerError;

    fn quick_validate(&self, line: &str) -> bool {
        line.contains(':') && line.contains('@')
    }

    fn parse(&self, line: &Line) -> Option<Self::Record> {
        let (email, password) = line.as_str().split_once(':')?;
        let (_, domain) = email.split_once('@')?;
        if email.is_empty() || password.is_empty() || domain.is_empty() {
            return None;
        }
        Some(DemoRecord {
            email: email.to_string(),
            password: password.to_string(),
            domain: domain.to_ascii_lowercase(),
        })
    }

    async fn create_client(&self, proxy: Option<&str>) -> Result<Self::Client, Self::Error> {
        Ok(DemoClient {
            proxy: proxy.map(str::to_string),
        })
    }

    async fn process(
        &self,
        record: &Self::Record,
        _client: &mut Self::Client,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome, Self::Error> {
        let candidates = self.discovery.get_candidates(&record.domain, cancel).await;
        if candidates.is_empty() {
            return Ok(ProcessOutcome::Ignored);
        }

        let mut last_err = None;
        for candidate in &candidates {
            if cancel.is_cancelled() {
                return Err(DemoCheckerError::Timeout);
            }
            match self.try_candidate(candidate).await {
                Ok(()) => {
                    self.discovery.mark_verified(&record.domain, candidate).await;
                    let captures = vec![
                        ("email".to_string(), record.email.clone()),
                        ("server".to_string(), format!("{}:{}", candidate.hostname, candidate.port)),
                    ];
                    return Ok(ProcessOutcome::Success(captures));
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or(DemoCheckerError::NoServerFound))
    }

    fn is_transient(&self, error: &Self::Error) -> bool {
        matches!(error, DemoCheckerError::Connection(_) | DemoCheckerError::Timeout)
    }
}
