use std::fmt;

/// Structured failure of a running download.
///
/// These never reach the submitter: the supervisor logs them, counts them and
/// records the job as `error`.
#[derive(Debug)]
pub enum DownloadError {
    /// The child process could not be started
    Spawn(String),
    /// Reading the child's stdout/stderr failed
    StreamRead(String),
    /// The child terminated unsuccessfully (`code` is `None` when killed by a signal)
    ExitCode { code: Option<i32>, stderr_tail: String },
    /// The child reported success but the output file is not there
    MissingOutput(String),
    /// The terminal status could not be stored
    Persist(String),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::Spawn(msg) => write!(f, "failed to start downloader: {}", msg),
            DownloadError::StreamRead(msg) => write!(f, "failed to read downloader output: {}", msg),
            DownloadError::ExitCode {
                code: Some(code),
                stderr_tail,
            } => write!(f, "downloader exited with code {}: {}", code, stderr_tail),
            DownloadError::ExitCode {
                code: None,
                stderr_tail,
            } => write!(f, "downloader was terminated by a signal: {}", stderr_tail),
            DownloadError::MissingOutput(path) => write!(f, "output file not found: {}", path),
            DownloadError::Persist(msg) => write!(f, "failed to store job status: {}", msg),
        }
    }
}

impl std::error::Error for DownloadError {}

impl DownloadError {
    /// Returns subcategory for metrics
    pub fn subcategory(&self) -> &'static str {
        match self {
            DownloadError::Spawn(_) => "spawn",
            DownloadError::StreamRead(_) => "stream_read",
            DownloadError::ExitCode { .. } => "exit_code",
            DownloadError::MissingOutput(_) => "missing_output",
            DownloadError::Persist(_) => "persist",
        }
    }

    /// Text handed to the yt-dlp error classifier
    pub fn diagnostic_text(&self) -> &str {
        match self {
            DownloadError::ExitCode { stderr_tail, .. } => stderr_tail,
            DownloadError::Spawn(msg)
            | DownloadError::StreamRead(msg)
            | DownloadError::MissingOutput(msg)
            | DownloadError::Persist(msg) => msg,
        }
    }
}
