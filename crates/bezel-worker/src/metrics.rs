//! Job metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding application installs a recorder.

use bezel_models::JobStatus;
use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Jobs that reached RUNNING.
    pub const JOBS_STARTED_TOTAL: &str = "bezel_jobs_started_total";

    /// Jobs that reached a terminal state, by status.
    pub const JOBS_FINISHED_TOTAL: &str = "bezel_jobs_finished_total";

    /// Wall time from RUNNING to terminal, in seconds.
    pub const JOB_DURATION_SECONDS: &str = "bezel_job_duration_seconds";
}

/// Record a job start.
pub fn record_job_started() {
    counter!(names::JOBS_STARTED_TOTAL).increment(1);
}

/// Record a job reaching a terminal state.
pub fn record_job_finished(status: JobStatus, elapsed_secs: f64) {
    counter!(
        names::JOBS_FINISHED_TOTAL,
        "status" => status.as_str()
    )
    .increment(1);

    histogram!(
        names::JOB_DURATION_SECONDS,
        "status" => status.as_str()
    )
    .record(elapsed_secs);
}
