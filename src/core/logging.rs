//! Logging initialization and configuration checking
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - Startup diagnostics for paths and the cookies file

use anyhow::Result;
use simplelog::*;
use std::fs::File;

use crate::core::config::Settings;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to initialize logger
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    let config = ConfigBuilder::new()
        .add_filter_allow_str("tubevault")
        .build();

    CombinedLogger::init(vec![
        TermLogger::new(LevelFilter::Info, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(LevelFilter::Debug, config, log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the resolved configuration at application startup
///
/// Validates and logs:
/// - yt-dlp binary, downloads directory and database path
/// - cookies file existence; downloads are refused without it
pub fn log_startup_configuration(settings: &Settings) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("Configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("YTDL_BIN:       {}", settings.ytdl_bin);
    log::info!("DOWNLOADS_DIR:  {}", settings.downloads_dir.display());
    log::info!("DATABASE_PATH:  {}", settings.database_path.display());
    log::info!("WEB_PORT:       {}", settings.web_port);

    match std::fs::metadata(&settings.cookies_file) {
        Ok(meta) if meta.len() > 0 => {
            log::info!("✅ COOKIES_FILE: {} ({} bytes)", settings.cookies_file.display(), meta.len());
        }
        Ok(_) => {
            log::warn!("⚠️  COOKIES_FILE: {} is empty", settings.cookies_file.display());
            log::warn!("   Downloads will be rejected until cookies are uploaded (PUT /api/cookies)");
        }
        Err(_) => {
            log::error!("❌ COOKIES_FILE: {} (FILE NOT FOUND!)", settings.cookies_file.display());
            log::error!("   Current directory: {:?}", std::env::current_dir());
            log::error!("   Downloads will be rejected until cookies are uploaded (PUT /api/cookies)");
        }
    }
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
