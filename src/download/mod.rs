//! Download management and processing

pub mod cookies;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod progress;
pub mod supervisor;
pub mod ytdlp;
pub mod ytdlp_errors;

// Re-exports for convenience
pub use cookies::CookieStore;
pub use error::DownloadError;
pub use orchestrator::DownloadService;
pub use output::{output_lines, OutputLine, OutputLineCodec};
pub use progress::{ProgressEvent, ProgressExtractor};
pub use supervisor::JobSupervisor;
