//! Tubevault - self-hosted video grabber built around yt-dlp
//!
//! A submitted URL becomes a job row in SQLite, a supervised yt-dlp child
//! process, and a stream of `progress` and `lifecycle` events that any number
//! of observers (SSE clients, the CLI) can follow live.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, logging, metrics, process runner, web server
//! - `download`: Output parsing, progress extraction, supervisor and orchestrator
//! - `events`: Publish/subscribe hub for job events
//! - `storage`: Connection pool, migrations and the job repository
//! - `testing`: Scripted process runner for tests and demos

pub mod cli;
pub mod core;
pub mod download;
pub mod events;
pub mod storage;
pub mod testing;

// Re-export commonly used types for convenience
pub use crate::core::{config, AppError, AppResult, Settings};
pub use download::DownloadService;
pub use events::{ChannelEvent, EventChannel};
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
