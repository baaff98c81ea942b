use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;

use crate::core::error::{AppError, AppResult};
use crate::storage::migrations::run_migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and brings the
/// schema up to date before returning.
///
/// # Example
///
/// ```no_run
/// use tubevault::storage::create_pool;
///
/// let pool = create_pool(std::path::Path::new("database.sqlite"))?;
/// # Ok::<(), tubevault::core::error::AppError>(())
/// ```
pub fn create_pool(database_path: &Path) -> AppResult<DbPool> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
    let pool = Pool::builder()
        .max_size(10) // Maximum 10 connections in the pool
        .build(manager)?;

    let mut conn = pool.get()?;
    run_migrations(&mut conn).map_err(AppError::Anyhow)?;

    log::info!("Database ready at {}", database_path.display());
    Ok(pool)
}

/// Single-connection pool over a private in-memory database
///
/// Every SQLite `:memory:` connection is its own database, so the pool is
/// capped at one connection.
pub fn create_memory_pool() -> AppResult<DbPool> {
    let pool = Pool::builder()
        .max_size(1)
        .build(SqliteConnectionManager::memory())?;
    let mut conn = pool.get()?;
    run_migrations(&mut conn).map_err(AppError::Anyhow)?;
    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> AppResult<DbConnection> {
    Ok(pool.get()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_pool_creates_file_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("db.sqlite");
        let pool = create_pool(&path).unwrap();
        assert!(path.exists());

        let conn = get_connection(&pool).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_memory_pool_shares_one_database() {
        let pool = create_memory_pool().unwrap();
        {
            let conn = get_connection(&pool).unwrap();
            conn.execute(
                "INSERT INTO videos (title, url, created_at, updated_at) VALUES ('a.mp4', 'u', 0, 0)",
                [],
            )
            .unwrap();
        }
        let conn = get_connection(&pool).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
