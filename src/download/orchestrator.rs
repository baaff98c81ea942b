//! Entry point of the download pipeline
//!
//! [`DownloadService::submit`] runs the synchronous part of a request (URL,
//! cookies, title lookup, job row) on the caller's task and hands the rest to
//! the [`JobSupervisor`]. The caller gets the `pending` job back immediately.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::core::config::Settings;
use crate::core::error::{AppError, AppResult};
use crate::core::metrics;
use crate::core::process::ProcessRunner;
use crate::core::types::{FormatProfile, Job, JobId, JobStatus, NewJob};
use crate::core::utils::build_output_name;
use crate::download::cookies::CookieStore;
use crate::download::supervisor::JobSupervisor;
use crate::download::ytdlp::fetch_title;
use crate::events::EventChannel;
use crate::storage::jobs::{self, DeleteOutcome};
use crate::storage::{get_connection, DbPool};

fn rejection_reason(err: &AppError) -> &'static str {
    match err {
        AppError::CookiesMissing => "cookies_missing",
        AppError::MetadataLookup(_) => "metadata",
        AppError::Validation(_) => "validation",
        _ => "other",
    }
}

/// Shared handle to the whole pipeline; cheap to clone
#[derive(Clone)]
pub struct DownloadService {
    runner: Arc<dyn ProcessRunner>,
    pool: DbPool,
    events: EventChannel,
    cookies: Arc<CookieStore>,
    settings: Arc<Settings>,
    supervisor: JobSupervisor,
}

impl DownloadService {
    pub fn new(runner: Arc<dyn ProcessRunner>, pool: DbPool, events: EventChannel, settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let cookies = Arc::new(CookieStore::new(settings.cookies_file.clone()));
        let supervisor = JobSupervisor::new(
            Arc::clone(&runner),
            pool.clone(),
            events.clone(),
            Arc::clone(&cookies),
            Arc::clone(&settings),
        );
        Self {
            runner,
            pool,
            events,
            cookies,
            settings,
            supervisor,
        }
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn supervisor(&self) -> &JobSupervisor {
        &self.supervisor
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn runner(&self) -> &dyn ProcessRunner {
        self.runner.as_ref()
    }

    /// Creates a job for `url` and starts downloading it in the background.
    ///
    /// Fails synchronously, without creating a job, when the URL is empty, the
    /// cookies file is missing or the title lookup fails.
    pub async fn submit(&self, url: &str, high_quality: bool) -> AppResult<Job> {
        let (job, _detached) = self
            .submit_tracked(url, FormatProfile::from_high_quality(high_quality))
            .await?;
        Ok(job)
    }

    /// Same as [`submit`](Self::submit) but also returns the supervisor handle,
    /// which resolves to the terminal status.
    pub async fn submit_tracked(&self, url: &str, profile: FormatProfile) -> AppResult<(Job, JoinHandle<JobStatus>)> {
        match self.create_and_start(url.trim(), profile).await {
            Ok(started) => {
                metrics::JOBS_SUBMITTED_TOTAL.inc();
                Ok(started)
            }
            Err(e) => {
                metrics::JOBS_REJECTED_TOTAL
                    .with_label_values(&[rejection_reason(&e)])
                    .inc();
                log::warn!("Rejected submission of '{}': {}", url, e);
                Err(e)
            }
        }
    }

    async fn create_and_start(&self, url: &str, profile: FormatProfile) -> AppResult<(Job, JoinHandle<JobStatus>)> {
        if url.is_empty() {
            return Err(AppError::Validation("Provide a valid youtube url".to_string()));
        }
        if !self.cookies.exists().await {
            return Err(AppError::CookiesMissing);
        }

        let raw_title = fetch_title(self.runner.as_ref(), &self.settings.ytdl_bin, url, self.cookies.path()).await?;
        let new_job = NewJob {
            title: build_output_name(&raw_title, Utc::now()),
            source_url: url.to_string(),
        };

        let job = {
            let conn = get_connection(&self.pool)?;
            jobs::insert_job(&conn, &new_job)?
        };
        log::info!("Created job {} for {} ({})", job.id, job.source_url, job.title);

        match self.supervisor.start(&job, profile).await {
            Ok(handle) => Ok((job, handle)),
            Err(e) => {
                // The row exists already; close it out so it does not stay pending forever.
                log::error!("Job {} could not be started: {}", job.id, e);
                let failed = get_connection(&self.pool)
                    .and_then(|conn| jobs::update_job_status(&conn, job.id, JobStatus::Error, None));
                match failed {
                    Ok(failed) => {
                        self.events.publish_lifecycle(&failed);
                    }
                    Err(persist) => log::error!("Job {} could not be marked as failed: {}", job.id, persist),
                }
                Err(e)
            }
        }
    }

    /// Removes a job and its output file
    pub fn delete_job(&self, id: JobId) -> DeleteOutcome {
        if self.supervisor.active_jobs().contains(id) {
            log::warn!("Deleting job {} while its download is still running", id);
        }
        let result = get_connection(&self.pool)
            .and_then(|mut conn| jobs::delete_job_with_file(&mut conn, id, &self.settings.downloads_dir));
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Failed to delete job {}: {}", id, e);
                DeleteOutcome::Failed(e.to_string())
            }
        }
    }

    pub fn list_jobs(&self) -> AppResult<Vec<Job>> {
        let conn = get_connection(&self.pool)?;
        jobs::list_jobs(&conn)
    }

    pub fn find_job(&self, id: JobId) -> AppResult<Option<Job>> {
        let conn = get_connection(&self.pool)?;
        jobs::find_job(&conn, id)
    }

    pub fn count_jobs(&self, status: JobStatus) -> AppResult<i64> {
        let conn = get_connection(&self.pool)?;
        jobs::count_jobs_by_status(&conn, status)
    }

    pub fn job_file_path(&self, job: &Job) -> PathBuf {
        jobs::job_file_path(&self.settings.downloads_dir, job)
    }

    /// Fails every `pending` job that has no supervisor in this process and
    /// broadcasts the new snapshots. Returns how many jobs were failed.
    pub fn reconcile_orphaned(&self) -> AppResult<usize> {
        let running = self.supervisor.active_jobs().snapshot();
        let failed = {
            let mut conn = get_connection(&self.pool)?;
            jobs::fail_orphaned_jobs(&mut conn, &running)?
        };

        for job in &failed {
            log::warn!("Job {} was left pending by a previous run; marked as error", job.id);
            metrics::JOBS_FAILED_TOTAL.with_label_values(&["orphaned"]).inc();
            self.events.publish_lifecycle(job);
        }
        Ok(failed.len())
    }
}
