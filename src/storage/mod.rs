//! SQLite persistence: connection pool, migrations and the job repository

pub mod db;
pub mod jobs;
pub mod migrations;

// Re-exports for convenience
pub use db::{create_memory_pool, create_pool, get_connection, DbConnection, DbPool};
pub use jobs::DeleteOutcome;
