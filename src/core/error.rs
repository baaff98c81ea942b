use thiserror::Error;

use crate::core::types::JobStatus;

/// Centralized error types for the application
///
/// Every synchronous failure of the service is converted to this enum. Failures
/// that happen inside a running download never reach a caller; they end up as
/// a job status instead (see `download::error::DownloadError`).
///
/// # Example
///
/// ```no_run
/// use tubevault::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Download/yt-dlp errors
    #[error("Download error: {0}")]
    Download(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The cookies file is missing or empty
    #[error("No cookies file found")]
    CookiesMissing,

    /// yt-dlp could not resolve the video title
    #[error("Failed to get video details: {0}")]
    MetadataLookup(String),

    /// Requested record does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// A status change that the job state machine does not allow
    #[error("Invalid status transition for job {id}: {from} -> {to}")]
    InvalidTransition { id: i64, from: JobStatus, to: JobStatus },

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Message suitable for an API response body
    pub fn user_message(&self) -> String {
        match self {
            AppError::CookiesMissing => "No cookies file found".to_string(),
            AppError::MetadataLookup(_) => "Failed to get video details".to_string(),
            AppError::Validation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

/// Helper function to convert String to AppError::Download
impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Download(err)
    }
}

/// Helper function to convert &str to AppError::Download
impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Download(err.to_string())
    }
}
