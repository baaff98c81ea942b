use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::io::Write;
use std::sync::Arc;

use tubevault::cli::{Cli, Commands};
use tubevault::core::types::{FormatProfile, JobStatus};
use tubevault::core::{config, init_logger, log_startup_configuration, metrics, process::TokioProcessRunner, web_server};
use tubevault::download::progress::create_progress_bar;
use tubevault::download::ytdlp::log_ytdlp_version;
use tubevault::download::DownloadService;
use tubevault::events::{ChannelEvent, EventChannel};
use tubevault::storage::create_pool;
use tubevault::Settings;

/// Parses CLI arguments and dispatches to the subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, listener).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // .env must be loaded before the first config static is touched
    let _ = dotenv();
    init_logger(&config::LOG_FILE_PATH)?;

    // Panics inside spawned supervisors only abort that task; keep a trace of them
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    let settings = Settings::from_env();

    match cli.command {
        Some(Commands::Serve { port }) => run_server(settings, port).await,
        Some(Commands::Download { url, high_quality }) => run_cli_download(settings, url, high_quality).await,
        Some(Commands::Sweep) => run_sweep(settings).await,
        None => {
            log::info!("No command specified, starting the server");
            run_server(settings, None).await
        }
    }
}

/// Builds the shared service: downloads directory, database, event channel, runner
async fn build_service(settings: Settings) -> Result<DownloadService> {
    fs_err::tokio::create_dir_all(&settings.downloads_dir)
        .await
        .context("Failed to create downloads directory")?;

    let pool = create_pool(&settings.database_path).context("Failed to create database pool")?;
    let events = EventChannel::new(settings.event_channel_capacity);

    Ok(DownloadService::new(Arc::new(TokioProcessRunner), pool, events, settings))
}

async fn run_server(settings: Settings, port: Option<u16>) -> Result<()> {
    log_startup_configuration(&settings);
    metrics::init_metrics();

    let port = port.unwrap_or(settings.web_port);
    let reconcile = settings.reconcile_pending_on_startup;
    let service = build_service(settings).await?;

    log_ytdlp_version(service.runner(), &service.settings().ytdl_bin).await;

    if reconcile {
        let failed = service.reconcile_orphaned()?;
        if failed > 0 {
            log::warn!("Startup sweep marked {} orphaned job(s) as error", failed);
        } else {
            log::info!("Startup sweep found no orphaned jobs");
        }
    }

    web_server::start_web_server(port, service).await
}

async fn run_sweep(settings: Settings) -> Result<()> {
    let service = build_service(settings).await?;
    let failed = service.reconcile_orphaned()?;
    println!("Marked {} orphaned job(s) as error", failed);
    Ok(())
}

async fn run_cli_download(settings: Settings, url: String, high_quality: bool) -> Result<()> {
    let service = build_service(settings).await?;
    let profile = FormatProfile::from_high_quality(high_quality);

    // Subscribe first so no event of the new job is missed
    let mut subscription = service.events().subscribe();
    let (job, handle) = service
        .submit_tracked(&url, profile)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    println!("URL:     {}", job.source_url);
    println!("File:    {}", job.title);
    println!("Profile: {}", profile.as_str());

    while let Some(event) = subscription.recv().await {
        match event {
            ChannelEvent::Progress(progress) if progress.job_id == job.id => {
                let bar = progress.percent().map(create_progress_bar).unwrap_or_default();
                print!("\r{} {}", bar, progress.progress);
                let _ = std::io::stdout().flush();
            }
            ChannelEvent::Lifecycle(update) if update.id == job.id => break,
            _ => {}
        }
    }
    println!();

    let status = handle.await.context("Download task panicked")?;
    let finished = service.find_job(job.id)?;
    match (status, finished) {
        (JobStatus::Completed, Some(finished)) => {
            println!(
                "✅ Saved {} ({})",
                service.job_file_path(&finished).display(),
                finished.size.as_deref().unwrap_or("unknown size")
            );
            Ok(())
        }
        (status, _) => Err(anyhow::anyhow!("Download of job {} ended with status {}", job.id, status.as_str())),
    }
}
