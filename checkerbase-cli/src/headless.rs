//! Non-interactive runner: reads `input.txt` and an optional proxy file,
//! prints a single-line live metrics banner once a second, and honors
//! Ctrl-C as a cancellation request rather than an abrupt kill.

use std::sync::Arc;
use std::time::Duration;

use checkerbase_config::{default_settings_path, parse_proxy_file, AppSettings, SettingsCheckpointStore};
use checkerbase_core::{CheckpointManager, EngineController, EngineSettings, EngineState, MetricsSnapshot};
use checkerbase_discovery::DiscoveryService;
use tracing::{error, info, warn};

use crate::demo_checker::DemoChecker;

const EXIT_SUCCESS: i32 = 0;
const EXIT_FATAL: i32 = 1;

pub async fn run(settings: AppSettings, discovery: Arc<DiscoveryService>, resume: bool) -> i32 {
    if !tokio::fs::try_exists(&settings.input_path).await.unwrap_or(false) {
        error!(path = %settings.input_path.display(), "input file not found");
        return EXIT_FATAL;
    }

    let proxies = match load_proxies(&settings).await {
        Ok(proxies) => proxies,
        Err(e) => {
            error!(error = %e, "failed to read proxy file");
            return EXIT_FATAL;
        }
    };

    let settings_path = match default_settings_path() {
        Ok(path) => path,
        Err(e) => {
            error!(error = %e, "could not resolve settings path");
            return EXIT_FATAL;
        }
    };
    let checkpoint = Arc::new(CheckpointManager::new(Arc::new(SettingsCheckpointStore::new(
        settings_path.clone(),
    ))));

    let engine_settings = EngineSettings {
        input_path: settings.input_path.clone(),
        output_dir: settings.output_dir.clone(),
        write_success: true,
        write_failed: true,
        write_ignored: false,
        append_to_existing: resume,
        parallelism: settings.parallelism,
        max_retries: settings.max_retries,
        proxies,
        input_channel_capacity: 1024,
        segment_size: 64 * 1024,
        max_batch_size: 200,
        flush_interval: Duration::from_millis(500),
    };

    let checker = DemoChecker::new(discovery);
    let controller = Arc::new(EngineController::new(checker, engine_settings, Some(Arc::clone(&checkpoint))));

    if let Err(e) = controller.initialize().await {
        error!(error = %e, "initialization failed");
        return EXIT_FATAL;
    }

    let resume_from_byte = if resume {
        checkpoint
            .resume_position(&settings.input_path)
            .await
            .ok()
            .flatten()
            .unwrap_or(0)
    } else {
        0
    };
    if resume_from_byte > 0 {
        info!(resume_from_byte, "resuming from saved checkpoint");
    }

    let ctrl_c_controller = Arc::clone(&controller);
    let ctrl_c_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received interrupt, cancelling run");
            ctrl_c_controller.cancel();
        }
    });

    let banner_controller = Arc::clone(&controller);
    let banner_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            print_banner(&banner_controller.metrics_snapshot());
        }
    });

    let run_result = controller.start(resume_from_byte).await;
    banner_task.abort();
    ctrl_c_task.abort();

    print_banner(&controller.metrics_snapshot());
    println!();

    match run_result {
        Ok(_) if controller.state() == EngineState::Cancelled => {
            let processed = controller.metrics_snapshot().processed_bytes;
            if let Err(e) = checkpoint.save_checkpoint(&settings.input_path, processed).await {
                warn!(error = %e, "failed to persist resume checkpoint");
            }
            info!("run cancelled by user");
            EXIT_SUCCESS
        }
        Ok(_) => {
            clear_checkpoint(&settings_path).await;
            info!("run completed");
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, "run failed");
            EXIT_FATAL
        }
    }
}

async fn load_proxies(settings: &AppSettings) -> anyhow::Result<Vec<String>> {
    let Some(path) = &settings.proxy_path else {
        return Ok(Vec::new());
    };
    let contents = tokio::fs::read_to_string(path).await?;
    let parsed = parse_proxy_file(&contents, settings.proxy_type);
    if !parsed.failed_lines.is_empty() {
        warn!(count = parsed.failed_lines.len(), "some proxy lines could not be parsed");
    }
    Ok(parsed.proxies.iter().map(|p| p.to_connect_string()).collect())
}

async fn clear_checkpoint(settings_path: &std::path::Path) {
    if let Ok(mut settings) = AppSettings::load(settings_path).await {
        settings.resume_byte_offset = None;
        settings.resume_input_path = None;
        settings.resume_timestamp = None;
        let _ = settings.save(settings_path).await;
    }
}

fn print_banner(snapshot: &MetricsSnapshot) {
    let eta = snapshot
        .eta
        .map(|d| format!("{}s", d.as_secs()))
        .unwrap_or_else(|| "--".to_string());
    print!(
        "\r{:>6.1}% | ok {} fail {} ign {} retry {} | {:.0} cpm | {:.0} KB/s | eta {}   ",
        snapshot.progress_percent,
        snapshot.success,
        snapshot.failed,
        snapshot.ignored,
        snapshot.retries,
        snapshot.cpm,
        snapshot.bytes_per_sec / 1024.0,
        eta,
    );
    use std::io::Write;
    let _ = std::io::stdout().flush();
}
