//! Metrics collection using Prometheus
//!
//! Tracks the download pipeline:
//! - Job throughput (submitted, completed, failed by cause)
//! - Live state (running supervisors, connected event subscribers)
//! - Progress event volume

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter, IntCounterVec,
    IntGauge, TextEncoder,
};

// Registration only fails on a duplicate name, which is a programming error
// caught by the first test run.
#[allow(clippy::expect_used)]
/// Jobs accepted by the orchestrator
pub static JOBS_SUBMITTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("tubevault_jobs_submitted_total", "Total number of accepted download jobs")
        .expect("register tubevault_jobs_submitted_total")
});

#[allow(clippy::expect_used)]
/// Jobs rejected before a record was created
/// Labels: reason (cookies_missing/metadata/validation/other)
pub static JOBS_REJECTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tubevault_jobs_rejected_total",
        "Total number of submissions rejected synchronously",
        &["reason"]
    )
    .expect("register tubevault_jobs_rejected_total")
});

#[allow(clippy::expect_used)]
/// Jobs that reached `completed`
pub static JOBS_COMPLETED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("tubevault_jobs_completed_total", "Total number of completed download jobs")
        .expect("register tubevault_jobs_completed_total")
});

#[allow(clippy::expect_used)]
/// Jobs that reached `error`
/// Labels: cause (spawn/stream_read/exit_code/missing_output/persist/orphaned)
pub static JOBS_FAILED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tubevault_jobs_failed_total",
        "Total number of failed download jobs",
        &["cause"]
    )
    .expect("register tubevault_jobs_failed_total")
});

#[allow(clippy::expect_used)]
/// Supervisors currently driving a child process
pub static RUNNING_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("tubevault_running_jobs", "Number of downloads currently in flight")
        .expect("register tubevault_running_jobs")
});

#[allow(clippy::expect_used)]
/// Progress events published on the event channel
pub static PROGRESS_EVENTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("tubevault_progress_events_total", "Total number of progress events published")
        .expect("register tubevault_progress_events_total")
});

#[allow(clippy::expect_used)]
/// Observers registered on the event channel
pub static EVENT_SUBSCRIBERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("tubevault_event_subscribers", "Number of connected event subscribers")
        .expect("register tubevault_event_subscribers")
});

/// Renders every registered metric in the Prometheus text format
pub fn render() -> Result<(String, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((
        encoder.format_type().to_string(),
        String::from_utf8_lossy(&buffer).into_owned(),
    ))
}

/// Forces registration so `/metrics` lists every series from the first scrape
pub fn init_metrics() {
    Lazy::force(&JOBS_SUBMITTED_TOTAL);
    Lazy::force(&JOBS_REJECTED_TOTAL);
    Lazy::force(&JOBS_COMPLETED_TOTAL);
    Lazy::force(&JOBS_FAILED_TOTAL);
    Lazy::force(&RUNNING_JOBS);
    Lazy::force(&PROGRESS_EVENTS_TOTAL);
    Lazy::force(&EVENT_SUBSCRIBERS);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_series() {
        init_metrics();
        JOBS_SUBMITTED_TOTAL.inc();
        let (content_type, body) = render().unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("tubevault_jobs_submitted_total"));
        assert!(body.contains("tubevault_running_jobs"));
    }
}
