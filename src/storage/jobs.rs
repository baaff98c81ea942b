//! Job records (`videos` table)
//!
//! The store enforces the one-way status machine itself: a status can only be
//! written while the row is still `pending`.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

use crate::core::error::{AppError, AppResult};
use crate::core::types::{Job, JobId, JobStatus, NewJob};

const JOB_COLUMNS: &str = "id, title, url, status, size, created_at, updated_at";

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    let status: String = row.get(3)?;
    let status = status.parse::<JobStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(Job {
        id: row.get(0)?,
        title: row.get(1)?,
        source_url: row.get(2)?,
        status,
        size: row.get(4)?,
        created_at: millis_to_datetime(row.get(5)?),
        updated_at: millis_to_datetime(row.get(6)?),
    })
}

fn not_found(id: JobId) -> AppError {
    AppError::NotFound(format!("Job {}", id))
}

/// Creates a `pending` job and returns the stored row
pub fn insert_job(conn: &Connection, new_job: &NewJob) -> AppResult<Job> {
    let now = Utc::now().timestamp_millis();
    conn.execute(
        "INSERT INTO videos (title, url, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
        params![new_job.title, new_job.source_url, JobStatus::Pending.as_str(), now],
    )?;
    let id = conn.last_insert_rowid();
    find_job(conn, id)?.ok_or_else(|| not_found(id))
}

pub fn find_job(conn: &Connection, id: JobId) -> AppResult<Option<Job>> {
    let job = conn
        .query_row(
            &format!("SELECT {} FROM videos WHERE id = ?1", JOB_COLUMNS),
            params![id],
            row_to_job,
        )
        .optional()?;
    Ok(job)
}

/// All jobs, newest first
pub fn list_jobs(conn: &Connection) -> AppResult<Vec<Job>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM videos ORDER BY created_at DESC, id DESC",
        JOB_COLUMNS
    ))?;
    let jobs = stmt
        .query_map([], row_to_job)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(jobs)
}

pub fn count_jobs_by_status(conn: &Connection, status: JobStatus) -> AppResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM videos WHERE status = ?1",
        params![status.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Moves a `pending` job to a terminal status.
///
/// Returns [`AppError::InvalidTransition`] when the job already left `pending`
/// (or when `status` is not terminal) and [`AppError::NotFound`] when the row
/// is gone.
pub fn update_job_status(conn: &Connection, id: JobId, status: JobStatus, size: Option<&str>) -> AppResult<Job> {
    if !status.is_terminal() {
        let current = find_job(conn, id)?.ok_or_else(|| not_found(id))?;
        return Err(AppError::InvalidTransition {
            id,
            from: current.status,
            to: status,
        });
    }

    let changed = conn.execute(
        "UPDATE videos SET status = ?1, size = ?2, updated_at = ?3 WHERE id = ?4 AND status = 'pending'",
        params![status.as_str(), size, Utc::now().timestamp_millis(), id],
    )?;

    if changed == 0 {
        let current = find_job(conn, id)?.ok_or_else(|| not_found(id))?;
        return Err(AppError::InvalidTransition {
            id,
            from: current.status,
            to: status,
        });
    }

    find_job(conn, id)?.ok_or_else(|| not_found(id))
}

/// Marks every `pending` job except those in `skip` as `error` and returns the
/// affected rows.
///
/// Meant for startup, when no supervisor from a previous process can still be
/// running. `skip` holds jobs that do have a live supervisor in this process.
pub fn fail_orphaned_jobs(conn: &mut Connection, skip: &[JobId]) -> AppResult<Vec<Job>> {
    let tx = conn.transaction()?;
    let ids: Vec<JobId> = {
        let mut stmt = tx.prepare("SELECT id FROM videos WHERE status = 'pending' ORDER BY id")?;
        let ids = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let now = Utc::now().timestamp_millis();
    let mut failed = Vec::with_capacity(ids.len());
    for id in ids.into_iter().filter(|id| !skip.contains(id)) {
        tx.execute(
            "UPDATE videos SET status = 'error', updated_at = ?1 WHERE id = ?2 AND status = 'pending'",
            params![now, id],
        )?;
        if let Some(job) = find_job(&tx, id)? {
            failed.push(job);
        }
    }
    tx.commit()?;
    Ok(failed)
}

/// Result of deleting a job together with its output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    NotFound,
    Deleted { file_removed: bool },
    /// The file could not be removed; the row delete was rolled back
    Failed(String),
}

impl DeleteOutcome {
    pub fn success(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted { .. })
    }

    pub fn message(&self) -> String {
        match self {
            DeleteOutcome::NotFound => "Video not found".to_string(),
            DeleteOutcome::Deleted { file_removed: true } => "Video and file deleted successfully".to_string(),
            DeleteOutcome::Deleted { file_removed: false } => "Video deleted (file was already missing)".to_string(),
            DeleteOutcome::Failed(message) => message.clone(),
        }
    }
}

/// Location of a job's output file; only the final path component of the
/// stored title is used.
pub fn job_file_path(downloads_dir: &Path, job: &Job) -> PathBuf {
    let name = Path::new(&job.title)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    downloads_dir.join(name)
}

/// Deletes the row, then the file, inside one transaction.
///
/// A file that cannot be removed rolls the row delete back. A file that is
/// already missing does not.
pub fn delete_job_with_file(conn: &mut Connection, id: JobId, downloads_dir: &Path) -> AppResult<DeleteOutcome> {
    let tx = conn.transaction()?;

    let Some(job) = find_job(&tx, id)? else {
        return Ok(DeleteOutcome::NotFound);
    };

    tx.execute("DELETE FROM videos WHERE id = ?1", params![id])?;

    let path = job_file_path(downloads_dir, &job);
    let file_removed = match fs_err::remove_file(&path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            log::error!("Failed to delete file for job {}: {}", id, e);
            // Dropping the transaction rolls the row delete back
            drop(tx);
            return Ok(DeleteOutcome::Failed(e.to_string()));
        }
    };

    tx.commit()?;
    log::info!("Deleted job {} (file removed: {})", id, file_removed);
    Ok(DeleteOutcome::Deleted { file_removed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::{create_memory_pool, get_connection};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn new_job(title: &str) -> NewJob {
        NewJob {
            title: title.to_string(),
            source_url: "https://youtu.be/abc".to_string(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let pool = create_memory_pool().unwrap();
        let conn = get_connection(&pool).unwrap();

        let job = insert_job(&conn, &new_job("My_Video_1.mp4")).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.size, None);
        assert_eq!(job.created_at, job.updated_at);

        assert_eq!(find_job(&conn, job.id).unwrap(), Some(job.clone()));
        assert_eq!(find_job(&conn, job.id + 100).unwrap(), None);
    }

    #[test]
    fn test_status_leaves_pending_exactly_once() {
        let pool = create_memory_pool().unwrap();
        let conn = get_connection(&pool).unwrap();
        let job = insert_job(&conn, &new_job("a.mp4")).unwrap();

        let done = update_job_status(&conn, job.id, JobStatus::Completed, Some("1.00 MB")).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.size.as_deref(), Some("1.00 MB"));
        assert!(done.updated_at >= job.updated_at);

        let err = update_job_status(&conn, job.id, JobStatus::Error, None).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: JobStatus::Completed,
                to: JobStatus::Error,
                ..
            }
        ));
        assert_eq!(find_job(&conn, job.id).unwrap().unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn test_update_rejects_pending_target_and_missing_rows() {
        let pool = create_memory_pool().unwrap();
        let conn = get_connection(&pool).unwrap();
        let job = insert_job(&conn, &new_job("a.mp4")).unwrap();

        assert!(matches!(
            update_job_status(&conn, job.id, JobStatus::Pending, None),
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(matches!(
            update_job_status(&conn, 999, JobStatus::Error, None),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_jobs_newest_first() {
        let pool = create_memory_pool().unwrap();
        let conn = get_connection(&pool).unwrap();
        let first = insert_job(&conn, &new_job("first.mp4")).unwrap();
        let second = insert_job(&conn, &new_job("second.mp4")).unwrap();

        let ids: Vec<JobId> = list_jobs(&conn).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(count_jobs_by_status(&conn, JobStatus::Pending).unwrap(), 2);
    }

    #[test]
    fn test_fail_orphaned_jobs() {
        let pool = create_memory_pool().unwrap();
        let mut conn = get_connection(&pool).unwrap();
        let stuck = insert_job(&conn, &new_job("stuck.mp4")).unwrap();
        let done = insert_job(&conn, &new_job("done.mp4")).unwrap();
        update_job_status(&conn, done.id, JobStatus::Completed, Some("2.00 MB")).unwrap();

        let skipped = insert_job(&conn, &new_job("running.mp4")).unwrap();

        let failed = fail_orphaned_jobs(&mut conn, &[skipped.id]).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, stuck.id);
        assert_eq!(failed[0].status, JobStatus::Error);
        assert_eq!(find_job(&conn, done.id).unwrap().unwrap().status, JobStatus::Completed);

        assert_eq!(find_job(&conn, skipped.id).unwrap().unwrap().status, JobStatus::Pending);
        assert_eq!(fail_orphaned_jobs(&mut conn, &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_with_and_without_file() {
        let dir = tempdir().unwrap();
        let pool = create_memory_pool().unwrap();
        let mut conn = get_connection(&pool).unwrap();

        let with_file = insert_job(&conn, &new_job("present.mp4")).unwrap();
        std::fs::write(dir.path().join("present.mp4"), b"data").unwrap();
        let without_file = insert_job(&conn, &new_job("missing.mp4")).unwrap();

        let outcome = delete_job_with_file(&mut conn, with_file.id, dir.path()).unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted { file_removed: true });
        assert_eq!(outcome.message(), "Video and file deleted successfully");
        assert!(!dir.path().join("present.mp4").exists());

        let outcome = delete_job_with_file(&mut conn, without_file.id, dir.path()).unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted { file_removed: false });
        assert_eq!(outcome.message(), "Video deleted (file was already missing)");
        assert_ne!(
            DeleteOutcome::Deleted { file_removed: true }.message(),
            DeleteOutcome::Deleted { file_removed: false }.message()
        );

        let outcome = delete_job_with_file(&mut conn, with_file.id, dir.path()).unwrap();
        assert_eq!(outcome, DeleteOutcome::NotFound);
        assert!(!outcome.success());
    }

    #[test]
    fn test_delete_rolls_back_when_file_cannot_be_removed() {
        let dir = tempdir().unwrap();
        let pool = create_memory_pool().unwrap();
        let mut conn = get_connection(&pool).unwrap();

        // A directory in place of the file makes remove_file fail
        let job = insert_job(&conn, &new_job("blocked.mp4")).unwrap();
        std::fs::create_dir(dir.path().join("blocked.mp4")).unwrap();

        let outcome = delete_job_with_file(&mut conn, job.id, dir.path()).unwrap();
        assert!(matches!(outcome, DeleteOutcome::Failed(_)));
        assert!(find_job(&conn, job.id).unwrap().is_some());
    }

    #[test]
    fn test_job_file_path_ignores_directories_in_title() {
        let pool = create_memory_pool().unwrap();
        let conn = get_connection(&pool).unwrap();
        let job = insert_job(&conn, &new_job("../../etc/passwd")).unwrap();
        assert_eq!(job_file_path(Path::new("/srv/dl"), &job), PathBuf::from("/srv/dl/passwd"));
    }
}
