use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a download job (SQLite rowid)
pub type JobId = i64;

/// Lifecycle state of a download job
///
/// `Pending` is the only non-terminal state. A job leaves it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(self, JobStatus::Pending) && next.is_terminal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "completed" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Output quality profile handed to yt-dlp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatProfile {
    /// Best streams up to 1080p, re-encoded with a slow high-quality preset
    HighFidelity,
    /// Single progressive mp4 up to 1080p, audio re-encoded only
    #[default]
    Standard,
}

impl FormatProfile {
    pub fn from_high_quality(high_quality: bool) -> Self {
        if high_quality {
            FormatProfile::HighFidelity
        } else {
            FormatProfile::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatProfile::HighFidelity => "high_fidelity",
            FormatProfile::Standard => "standard",
        }
    }
}

/// One download request and its persisted lifecycle record.
///
/// Serialized as the `lifecycle` event payload and in API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    /// Output file name inside the downloads directory
    pub title: String,
    #[serde(rename = "url")]
    pub source_url: String,
    pub status: JobStatus,
    /// Final size, e.g. "12.34 MB"; set only on completion
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values needed to create a job row
#[derive(Debug, Clone)]
pub struct NewJob {
    pub title: String,
    pub source_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_round_trip_str() {
        for status in [JobStatus::Pending, JobStatus::Completed, JobStatus::Error] {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_transitions_only_leave_pending() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Error));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Error));
        assert!(!JobStatus::Error.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_profile_from_flag() {
        assert_eq!(FormatProfile::from_high_quality(true), FormatProfile::HighFidelity);
        assert_eq!(FormatProfile::from_high_quality(false), FormatProfile::Standard);
    }

    #[test]
    fn test_job_serializes_wire_shape() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let job = Job {
            id: 3,
            title: "My_Video_1748779200000.mp4".to_string(),
            source_url: "https://youtu.be/abc".to_string(),
            status: JobStatus::Pending,
            size: None,
            created_at: ts,
            updated_at: ts,
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["url"], "https://youtu.be/abc");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["createdAt"], "2025-06-01T12:00:00Z");
        assert!(json.get("size").is_none());
        assert!(json.get("sourceUrl").is_none());
    }
}
