use lazy_regex::regex;
use serde::{Deserialize, Serialize};

use crate::core::config;
use crate::core::types::JobId;

/// Transient progress signal for one job
///
/// Serialized as the `progress` event payload: `{"jobId": 1, "progress": "..."}`.
/// Never persisted; the last event received for a job is the latest known state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: JobId,
    /// Human-readable fragment, e.g. `PROGRESS:  50.0% of 10.00MiB`
    pub progress: String,
}

impl ProgressEvent {
    /// Percentage parsed from the fragment, clamped to 0..=100
    /// Example: "PROGRESS:  45.2% of 10.00MiB" -> 45.2
    pub fn percent(&self) -> Option<f32> {
        self.progress
            .split_whitespace()
            .filter_map(|part| part.strip_suffix('%'))
            .find_map(|number| number.parse::<f32>().ok())
            .map(|p| p.clamp(0.0, 100.0))
    }
}

/// Recognizes the progress lines produced by yt-dlp's `--progress-template`.
///
/// A line qualifies when it contains the marker token and has something after
/// it. Everything else is ignored: this is a best-effort display signal and
/// never decides whether a download succeeded.
#[derive(Debug, Clone)]
pub struct ProgressExtractor {
    job_id: JobId,
    marker: &'static str,
}

impl ProgressExtractor {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            marker: config::download::PROGRESS_MARKER,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn extract(&self, line: &str) -> Option<ProgressEvent> {
        let start = line.find(self.marker)?;
        let fragment = regex!(r"\x1b\[[0-9;]*[A-Za-z]").replace_all(&line[start..], "");
        let fragment = fragment.trim();

        if fragment.len() == self.marker.len() {
            log::trace!("Progress marker without payload: {:?}", line);
            return None;
        }

        Some(ProgressEvent {
            job_id: self.job_id,
            progress: fragment.to_string(),
        })
    }
}

/// Text progress bar for terminal output
/// Example: 50 -> "[█████░░░░░]"
pub fn create_progress_bar(percent: f32) -> String {
    let filled = (percent.clamp(0.0, 100.0) / 10.0) as usize;
    let empty = 10 - filled;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}
