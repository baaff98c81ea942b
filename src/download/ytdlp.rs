//! yt-dlp invocation: argument construction and the metadata-only title lookup

use std::path::Path;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::core::process::ProcessRunner;
use crate::core::types::FormatProfile;
use crate::core::utils::truncate_tail_utf8;

/// Format selector and ffmpeg post-processing for a profile
fn profile_args(profile: FormatProfile) -> Vec<&'static str> {
    match profile {
        FormatProfile::HighFidelity => vec![
            "-f",
            "bestvideo[height<=1080]+bestaudio/best[height<=1080]",
            "--merge-output-format",
            "mp4",
            "--postprocessor-args",
            "ffmpeg:-c:v libx264 -preset slow -crf 18 -c:a aac -b:a 192k",
        ],
        FormatProfile::Standard => vec![
            "-f",
            "best[height<=1080][ext=mp4]",
            "--postprocessor-args",
            "ffmpeg:-c:a aac -b:a 128k",
        ],
    }
}

/// Arguments for a full download of `url` into `output_path`
pub fn build_download_args(url: &str, output_path: &Path, cookies: &Path, profile: FormatProfile) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--progress-template".to_string(),
        config::download::PROGRESS_TEMPLATE.to_string(),
        "--cookies".to_string(),
        cookies.display().to_string(),
        "--output".to_string(),
        output_path.display().to_string(),
    ];
    args.extend(profile_args(profile).into_iter().map(String::from));
    // The URL is user input; `--` keeps a leading dash from being read as an option
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

/// Arguments for the metadata-only title lookup
pub fn build_title_args(url: &str, cookies: &Path) -> Vec<String> {
    vec![
        "--cookies".to_string(),
        cookies.display().to_string(),
        "--get-title".to_string(),
        "--".to_string(),
        url.to_string(),
    ]
}

/// Shell-like rendering of a command line for debug logs
pub fn format_command_for_log(program: &str, args: &[String]) -> String {
    let mut rendered = String::from(program);
    for arg in args {
        rendered.push(' ');
        if arg.contains(char::is_whitespace) || arg.is_empty() {
            rendered.push('\'');
            rendered.push_str(arg);
            rendered.push('\'');
        } else {
            rendered.push_str(arg);
        }
    }
    rendered
}

/// Asks yt-dlp for the video title without downloading anything.
///
/// No timeout is applied; the caller's request waits for yt-dlp to answer.
pub async fn fetch_title(runner: &dyn ProcessRunner, ytdl_bin: &str, url: &str, cookies: &Path) -> AppResult<String> {
    let args = build_title_args(url, cookies);
    log::debug!("Fetching title: {}", format_command_for_log(ytdl_bin, &args));

    let output = runner
        .output(ytdl_bin, &args)
        .await
        .map_err(|e| AppError::MetadataLookup(e.to_string()))?;

    if !output.success() {
        let stderr = output.stderr_lossy();
        let tail = truncate_tail_utf8(stderr.trim(), 2000).to_string();
        log::warn!("Title lookup for {} failed (exit code: {:?}): {}", url, output.code, tail);
        return Err(AppError::MetadataLookup(tail));
    }

    let stdout = output.stdout_lossy();
    let title = stdout.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    if title.is_empty() {
        return Err(AppError::MetadataLookup("yt-dlp returned an empty title".to_string()));
    }

    log::info!("Resolved title for {}: {}", url, title);
    Ok(title.to_string())
}

/// Logs the yt-dlp version at startup; a missing binary is only warned about
pub async fn log_ytdlp_version(runner: &dyn ProcessRunner, ytdl_bin: &str) {
    match runner.output(ytdl_bin, &["--version".to_string()]).await {
        Ok(output) if output.success() => {
            log::info!("yt-dlp version: {}", output.stdout_lossy().trim());
        }
        Ok(output) => {
            log::warn!(
                "yt-dlp --version failed (exit code: {:?}): {}",
                output.code,
                output.stderr_lossy().trim()
            );
        }
        Err(e) => log::warn!("Failed to get yt-dlp version: {}", e),
    }
}
