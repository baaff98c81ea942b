//! Job supervisor: drives one yt-dlp process per job to a terminal status
//!
//! `start` checks preconditions and returns at once. The background task owns
//! the job's status until it writes `completed` or `error`, then publishes the
//! final snapshot on the event channel. Nothing is retried.

use futures_util::StreamExt;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;

use crate::core::config::{self, Settings};
use crate::core::error::{AppError, AppResult};
use crate::core::metrics;
use crate::core::process::{ProcessRunner, SpawnedProcess};
use crate::core::types::{FormatProfile, Job, JobId, JobStatus};
use crate::core::utils::{format_megabytes, truncate_tail_utf8};
use crate::download::cookies::CookieStore;
use crate::download::error::DownloadError;
use crate::download::output::output_lines;
use crate::download::progress::ProgressExtractor;
use crate::download::ytdlp::{build_download_args, format_command_for_log};
use crate::download::ytdlp_errors::{analyze_ytdlp_error, get_fix_recommendations, needs_operator_attention};
use crate::events::EventChannel;
use crate::storage::{get_connection, jobs, DbPool};

/// Job ids that currently have a supervisor task
#[derive(Debug, Default)]
pub struct ActiveJobs {
    ids: Mutex<HashSet<JobId>>,
}

impl ActiveJobs {
    fn lock(&self) -> MutexGuard<'_, HashSet<JobId>> {
        match self.ids.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers `id`; `None` if a supervisor already holds it
    fn claim(self: &Arc<Self>, id: JobId) -> Option<ActiveGuard> {
        if !self.lock().insert(id) {
            return None;
        }
        metrics::RUNNING_JOBS.inc();
        Some(ActiveGuard {
            jobs: Arc::clone(self),
            id,
        })
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.lock().contains(&id)
    }

    pub fn snapshot(&self) -> Vec<JobId> {
        self.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Releases the job id when the supervisor task ends, however it ends
struct ActiveGuard {
    jobs: Arc<ActiveJobs>,
    id: JobId,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.jobs.lock().remove(&self.id);
        metrics::RUNNING_JOBS.dec();
    }
}

#[derive(Clone)]
pub struct JobSupervisor {
    runner: Arc<dyn ProcessRunner>,
    pool: DbPool,
    events: EventChannel,
    cookies: Arc<CookieStore>,
    settings: Arc<Settings>,
    active: Arc<ActiveJobs>,
}

impl JobSupervisor {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        pool: DbPool,
        events: EventChannel,
        cookies: Arc<CookieStore>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            runner,
            pool,
            events,
            cookies,
            settings,
            active: Arc::new(ActiveJobs::default()),
        }
    }

    pub fn active_jobs(&self) -> &ActiveJobs {
        &self.active
    }

    /// Launches the background download of a `pending` job.
    ///
    /// Fails without side effects if the cookies file is missing or empty, the
    /// job has no title, is not `pending`, or already has a supervisor. The
    /// returned handle resolves to the terminal status; dropping it detaches
    /// the task.
    pub async fn start(&self, job: &Job, profile: FormatProfile) -> AppResult<JoinHandle<JobStatus>> {
        if job.status != JobStatus::Pending {
            return Err(AppError::Validation(format!(
                "Job {} is {}, only pending jobs can be started",
                job.id, job.status
            )));
        }
        if job.title.trim().is_empty() {
            return Err(AppError::Validation(format!("Job {} has no title", job.id)));
        }
        if !self.cookies.exists().await {
            return Err(AppError::CookiesMissing);
        }

        let guard = self
            .active
            .claim(job.id)
            .ok_or_else(|| AppError::Validation(format!("Job {} is already running", job.id)))?;

        let output_path = jobs::job_file_path(&self.settings.downloads_dir, job);
        let args = build_download_args(&job.source_url, &output_path, self.cookies.path(), profile);

        log::info!(
            "Starting job {} ({}, profile: {}) -> {}",
            job.id,
            job.source_url,
            profile.as_str(),
            output_path.display()
        );

        let supervisor = self.clone();
        let job_id = job.id;
        Ok(tokio::spawn(async move {
            let _guard = guard;
            supervisor.run(job_id, args, output_path).await
        }))
    }

    async fn run(&self, job_id: JobId, args: Vec<String>, output_path: PathBuf) -> JobStatus {
        match self.download(job_id, &args, &output_path).await {
            Ok(bytes) => {
                let size = format_megabytes(bytes);
                log::info!("Job {} finished: {} ({})", job_id, output_path.display(), size);
                self.finish(job_id, JobStatus::Completed, Some(&size))
            }
            Err(e) => {
                self.report_failure(job_id, &e);
                self.finish(job_id, JobStatus::Error, None)
            }
        }
    }

    /// Runs the child to completion; returns the output file size in bytes
    async fn download(&self, job_id: JobId, args: &[String], output_path: &Path) -> Result<u64, DownloadError> {
        let program = self.settings.ytdl_bin.as_str();
        log::debug!("Job {} command: {}", job_id, format_command_for_log(program, args));

        let SpawnedProcess { stdout, stderr, exit } = self
            .runner
            .spawn(program, args)
            .await
            .map_err(|e| DownloadError::Spawn(e.to_string()))?;

        // Both pipes are drained together so a full stderr pipe can never stall stdout.
        let drained = tokio::try_join!(self.drain_stdout(job_id, stdout), drain_stderr(job_id, stderr));
        let stderr_tail = match drained {
            Ok(((), tail)) => tail,
            Err(e) => {
                // Dropping the exit handle kills the child
                drop(exit);
                return Err(DownloadError::StreamRead(e.to_string()));
            }
        };

        let code = exit
            .wait()
            .await
            .map_err(|e| DownloadError::StreamRead(format!("waiting for exit: {}", e)))?;
        log::debug!("Job {} process exited with code {:?}", job_id, code);

        if code != Some(0) {
            return Err(DownloadError::ExitCode { code, stderr_tail });
        }

        match fs_err::tokio::metadata(output_path).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            _ => Err(DownloadError::MissingOutput(output_path.display().to_string())),
        }
    }

    /// Feeds stdout through the line parser and publishes every progress line
    async fn drain_stdout<R: AsyncRead + Unpin>(&self, job_id: JobId, stdout: R) -> std::io::Result<()> {
        let extractor = ProgressExtractor::new(job_id);
        let mut lines = output_lines(stdout);

        while let Some(line) = lines.next().await {
            let line = line?;
            let text = line.text();
            match extractor.extract(&text) {
                Some(event) => {
                    log::trace!("Job {} progress: {}", job_id, event.progress);
                    self.events.publish_progress(event);
                }
                None if !line.is_blank() => log::debug!("[job {}] {}", job_id, text.trim_end()),
                None => {}
            }
        }
        Ok(())
    }

    /// Writes the terminal status and broadcasts the resulting snapshot
    fn finish(&self, job_id: JobId, status: JobStatus, size: Option<&str>) -> JobStatus {
        let stored = get_connection(&self.pool).and_then(|conn| jobs::update_job_status(&conn, job_id, status, size));

        match stored {
            Ok(job) => {
                if status == JobStatus::Completed {
                    metrics::JOBS_COMPLETED_TOTAL.inc();
                }
                self.events.publish_lifecycle(&job);
                job.status
            }
            Err(e) => {
                let err = DownloadError::Persist(e.to_string());
                log::error!("Job {}: {}", job_id, err);
                metrics::JOBS_FAILED_TOTAL
                    .with_label_values(&[err.subcategory()])
                    .inc();
                JobStatus::Error
            }
        }
    }

    fn report_failure(&self, job_id: JobId, err: &DownloadError) {
        metrics::JOBS_FAILED_TOTAL
            .with_label_values(&[err.subcategory()])
            .inc();

        let kind = analyze_ytdlp_error(err.diagnostic_text());
        log::error!("Job {} failed ({}): {}", job_id, err.subcategory(), err);
        if needs_operator_attention(kind) {
            log::error!("Job {} failure class {}: {}", job_id, kind.as_str(), get_fix_recommendations(kind));
        } else {
            log::info!("Job {} failure class {}: {}", job_id, kind.as_str(), get_fix_recommendations(kind));
        }
    }
}

/// Logs every stderr line and keeps the last few for the failure report
async fn drain_stderr<R: AsyncRead + Unpin>(job_id: JobId, stderr: R) -> std::io::Result<String> {
    let capacity = config::download::STDERR_TAIL_LINES;
    let mut tail: VecDeque<String> = VecDeque::with_capacity(capacity);
    let mut lines = output_lines(stderr);

    while let Some(line) = lines.next().await {
        let line = line?;
        if line.is_blank() {
            continue;
        }
        let text = line.text().trim_end().to_string();
        log::warn!("[job {}] yt-dlp stderr: {}", job_id, text);
        if tail.len() == capacity {
            tail.pop_front();
        }
        tail.push_back(text);
    }

    let joined = Vec::from(tail).join("\n");
    Ok(truncate_tail_utf8(&joined, 8 * 1024).to_string())
}
