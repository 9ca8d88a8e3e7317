//! Headless runner and interactive TUI for the checkerbase batch checking
//! engine, instantiated against [`demo_checker::DemoChecker`].

mod demo_checker;
mod headless;
mod tui;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use checkerbase_config::{checkerbase_home_dir, default_settings_path, AppSettings};
use checkerbase_discovery::{
    DirectoryLookupStrategy, DiscoveryConfig, DiscoveryService, MxProviderStrategy, ProbeStrategy,
    ServerRegistry, WellKnownUrlsStrategy,
};
use clap::{Parser, Subcommand};

/// checkerbase: a high-throughput batch line checker with mail-server
/// autodiscovery.
#[derive(Parser, Debug)]
#[command(name = "checkerbase")]
#[command(about = "Batch credential/line checker with mail server autodiscovery")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Input file to read lines from.
    #[arg(long, global = true, env = "CHECKERBASE_INPUT")]
    input: Option<PathBuf>,

    /// Proxy list file (one proxy per line).
    #[arg(long, global = true, env = "CHECKERBASE_PROXIES")]
    proxies: Option<PathBuf>,

    /// Directory success/failed/ignored output files are written to.
    #[arg(long, global = true, env = "CHECKERBASE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Number of concurrent workers.
    #[arg(long, global = true, env = "CHECKERBASE_PARALLELISM")]
    parallelism: Option<usize>,

    /// Maximum retry attempts per record before a transient error counts as failed.
    #[arg(long, global = true, env = "CHECKERBASE_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Resume from the last saved byte offset for this input file, if one exists.
    #[arg(long, global = true)]
    resume: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run headless, printing a live metrics banner until completion.
    Run,
    /// Run the interactive terminal UI.
    Tui,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkerbase_cli=info,checkerbase_core=info,checkerbase_discovery=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli).await?;

    let home = checkerbase_home_dir().context("resolving checkerbase home directory")?;
    tokio::fs::create_dir_all(&home).await?;
    let registry = ServerRegistry::connect(&home.join("server_registry.db"))
        .await
        .context("opening server registry database")?;
    let discovery = Arc::new(build_discovery_service(registry));

    let exit_code = match cli.command.unwrap_or(Command::Run) {
        Command::Run => headless::run(settings, discovery, cli.resume).await,
        Command::Tui => tui::run(settings, discovery, cli.resume).await,
    };

    std::process::exit(exit_code);
}

async fn load_settings(cli: &Cli) -> Result<AppSettings> {
    let path = default_settings_path().context("resolving settings path")?;
    let mut settings = AppSettings::load(&path).await.unwrap_or_default();

    if let Some(input) = &cli.input {
        settings.input_path = input.clone();
    }
    if let Some(proxies) = &cli.proxies {
        settings.proxy_path = Some(proxies.clone());
    }
    if let Some(output_dir) = &cli.output_dir {
        settings.output_dir = output_dir.clone();
    }
    if let Some(parallelism) = cli.parallelism {
        settings.parallelism = parallelism;
    }
    if let Some(max_retries) = cli.max_retries {
        settings.max_retries = max_retries;
    }

    Ok(settings)
}

fn build_discovery_service(registry: ServerRegistry) -> DiscoveryService {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .expect("static reqwest client configuration is valid");

    let resolver = Arc::new(
        hickory_resolver::TokioAsyncResolver::tokio_from_system_conf()
            .unwrap_or_else(|_| hickory_resolver::TokioAsyncResolver::tokio(Default::default(), Default::default())),
    );

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let tls_connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));

    let strategies: Vec<Arc<dyn checkerbase_discovery::DiscoveryStrategy>> = vec![
        Arc::new(DirectoryLookupStrategy::new(http_client.clone())),
        Arc::new(WellKnownUrlsStrategy::new(http_client.clone())),
        Arc::new(MxProviderStrategy::new(resolver, http_client)),
        Arc::new(ProbeStrategy::new(tls_connector, Duration::from_secs(5))),
    ];

    DiscoveryService::new(Arc::new(registry), strategies, DiscoveryConfig::default())
}
