//! Credential file handed to yt-dlp with `--cookies`
//!
//! Downloads only read it. Replacement (PUT /api/cookies) is serialized by an
//! async mutex and done atomically through a temp file, but is not coordinated
//! with jobs that are already reading it.

use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::core::error::{AppError, AppResult};

/// Quick structural look at a Netscape cookies file, used for diagnostics only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookiesSummary {
    pub has_header: bool,
    pub total_cookies: usize,
    pub youtube_cookies: usize,
}

impl CookiesSummary {
    pub fn looks_valid(&self) -> bool {
        self.youtube_cookies > 0
    }
}

/// Counts cookie entries in Netscape format (7 tab-separated fields)
pub fn summarize_cookies(content: &str) -> CookiesSummary {
    let mut summary = CookiesSummary {
        has_header: content.lines().any(|l| l.contains("Netscape HTTP Cookie File")),
        ..Default::default()
    };

    for line in content.lines().map(str::trim) {
        // `#HttpOnly_` prefixed lines are real entries
        let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 7 {
            continue;
        }
        summary.total_cookies += 1;
        if parts[0].contains("youtube.com") || parts[0].contains("google.com") {
            summary.youtube_cookies += 1;
        }
    }

    summary
}

#[derive(Debug)]
pub struct CookieStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CookieStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the file exists and is non-empty
    pub async fn exists(&self) -> bool {
        match fs_err::tokio::metadata(&self.path).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    pub async fn read(&self) -> AppResult<String> {
        match fs_err::tokio::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::CookiesMissing),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Replaces the file contents atomically (temp file + rename)
    pub async fn write(&self, content: &str) -> AppResult<CookiesSummary> {
        let summary = summarize_cookies(content);
        if !summary.looks_valid() {
            log::warn!(
                "Cookies being stored contain no youtube.com entries ({} cookies total, header: {})",
                summary.total_cookies,
                summary.has_header
            );
        }

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::tokio::create_dir_all(parent).await?;
        }

        let temp_path = PathBuf::from(format!("{}.tmp.{}", self.path.display(), std::process::id()));
        fs_err::tokio::write(&temp_path, content).await?;
        if let Err(e) = fs_err::tokio::rename(&temp_path, &self.path).await {
            let _ = fs_err::tokio::remove_file(&temp_path).await;
            return Err(AppError::Io(e));
        }

        log::info!(
            "Cookies file updated: {} ({} cookies, {} for youtube)",
            self.path.display(),
            summary.total_cookies,
            summary.youtube_cookies
        );
        Ok(summary)
    }
}
