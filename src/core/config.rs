use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;

/// Configuration constants for the service
/// Cached yt-dlp binary path
/// Read once at startup from YTDL_BIN environment variable or defaults to "yt-dlp"
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// Download folder path
/// Read from DOWNLOADS_DIR environment variable
/// Supports tilde (~) expansion for home directory
pub static DOWNLOADS_DIR: Lazy<String> =
    Lazy::new(|| env::var("DOWNLOADS_DIR").unwrap_or_else(|_| "./downloads".to_string()));

/// Path to the cookies file handed to yt-dlp with `--cookies`
/// Read from COOKIES_FILE environment variable
pub static COOKIES_FILE: Lazy<String> =
    Lazy::new(|| env::var("COOKIES_FILE").unwrap_or_else(|_| "./cookies.txt".to_string()));

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: database.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "database.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: app.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "app.log".to_string()));

/// HTTP port for the API and the event stream
pub static WEB_PORT: Lazy<u16> = Lazy::new(|| {
    env::var("WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000)
});

/// Buffer size of every event channel subscriber
pub static EVENT_CHANNEL_CAPACITY: Lazy<usize> = Lazy::new(|| {
    env::var("EVENT_CHANNEL_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(events::DEFAULT_CAPACITY)
});

/// Whether jobs left `pending` by a previous process are failed at startup
pub static RECONCILE_PENDING_ON_STARTUP: Lazy<bool> = Lazy::new(|| {
    env::var("RECONCILE_PENDING_ON_STARTUP")
        .map(|v| parse_bool(&v))
        .unwrap_or(true)
});

/// Download configuration
pub mod download {
    /// Literal prefix yt-dlp is told to print in front of every progress line
    pub const PROGRESS_MARKER: &str = "PROGRESS:";

    /// Template passed to `--progress-template`
    pub const PROGRESS_TEMPLATE: &str = "PROGRESS: %(progress._percent_str)s of %(progress._total_bytes_str)s";

    /// Extension appended to every generated output file name
    pub const OUTPUT_EXTENSION: &str = "mp4";

    /// Maximum length of the sanitized title part of a file name
    pub const TITLE_MAX_LEN: usize = 50;

    /// Number of stderr lines kept for failure reports
    pub const STDERR_TAIL_LINES: usize = 200;
}

/// Event channel configuration
pub mod events {
    use std::time::Duration;

    /// Default per-subscriber buffer
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Interval between SSE keep-alive comments (in seconds)
    pub const KEEP_ALIVE_SECS: u64 = 15;

    /// Keep-alive interval duration
    pub fn keep_alive() -> Duration {
        Duration::from_secs(KEEP_ALIVE_SECS)
    }
}

fn parse_bool(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off")
}

/// Expands `~` and returns an owned path
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).to_string())
}

/// Runtime settings handed to the download services.
///
/// Built once from the environment in `main`; tests construct it directly so
/// nothing inside the pipeline reads process-wide state.
#[derive(Debug, Clone)]
pub struct Settings {
    pub ytdl_bin: String,
    pub downloads_dir: PathBuf,
    pub cookies_file: PathBuf,
    pub database_path: PathBuf,
    pub web_port: u16,
    pub event_channel_capacity: usize,
    pub reconcile_pending_on_startup: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            ytdl_bin: YTDL_BIN.clone(),
            downloads_dir: expand_path(&DOWNLOADS_DIR),
            cookies_file: expand_path(&COOKIES_FILE),
            database_path: expand_path(&DATABASE_PATH),
            web_port: *WEB_PORT,
            event_channel_capacity: *EVENT_CHANNEL_CAPACITY,
            reconcile_pending_on_startup: *RECONCILE_PENDING_ON_STARTUP,
        }
    }

    /// Settings rooted in a single directory, used by tests and the CLI smoke path
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            ytdl_bin: "yt-dlp".to_string(),
            downloads_dir: root.join("downloads"),
            cookies_file: root.join("cookies.txt"),
            database_path: root.join("database.sqlite"),
            web_port: 0,
            event_channel_capacity: events::DEFAULT_CAPACITY,
            reconcile_pending_on_startup: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(" OFF "));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn test_rooted_settings_layout() {
        let settings = Settings::rooted_at("/srv/vault");
        assert_eq!(settings.downloads_dir, PathBuf::from("/srv/vault/downloads"));
        assert_eq!(settings.cookies_file, PathBuf::from("/srv/vault/cookies.txt"));
        assert_eq!(settings.database_path, PathBuf::from("/srv/vault/database.sqlite"));
    }

    #[test]
    #[serial_test::serial]
    fn test_expand_path_uses_home() {
        let previous = env::var("HOME").ok();
        env::set_var("HOME", "/home/vault");
        assert_eq!(expand_path("~/downloads"), PathBuf::from("/home/vault/downloads"));
        assert_eq!(expand_path("./cookies.txt"), PathBuf::from("./cookies.txt"));
        match previous {
            Some(home) => env::set_var("HOME", home),
            None => env::remove_var("HOME"),
        }
    }

    #[test]
    fn test_progress_template_carries_marker() {
        assert!(download::PROGRESS_TEMPLATE.starts_with(download::PROGRESS_MARKER));
    }
}
