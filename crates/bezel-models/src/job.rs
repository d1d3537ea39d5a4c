//! Processing job record.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{EncodingConfig, JobSnapshot, JobStatus, LayoutPlan, ProgressBasis};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for file names and log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One bezel-removal run over one input file.
///
/// The plan, paths and encoding settings are fixed at creation. Only the
/// orchestrator moves the status and progress fields.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingJob {
    /// Unique job ID
    pub id: JobId,

    /// Source video
    pub input_path: PathBuf,

    /// Final destination, only written on success
    pub output_path: PathBuf,

    /// Replace an existing file at `output_path`
    #[serde(default)]
    pub overwrite: bool,

    /// Panel geometry
    pub plan: LayoutPlan,

    /// Encoder settings
    #[serde(default)]
    pub encoding: EncodingConfig,

    /// Probed input duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,

    /// Probed frame count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u64>,

    /// Job state
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0.0-1.0)
    #[serde(default)]
    pub progress_fraction: f64,

    /// What progress is measured against
    #[serde(default)]
    pub progress_basis: ProgressBasis,

    /// Human-readable description of the current step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    /// Error message (if failed or cancelled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Finished at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProcessingJob {
    /// Create a pending job.
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        plan: LayoutPlan,
        encoding: EncodingConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            input_path: input_path.into(),
            output_path: output_path.into(),
            overwrite: false,
            plan,
            encoding,
            duration_secs: None,
            frame_count: None,
            status: JobStatus::Pending,
            progress_fraction: 0.0,
            progress_basis: ProgressBasis::Unknown,
            current_step: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Attach probed stream facts.
    pub fn with_source_info(
        mut self,
        duration_secs: Option<f64>,
        frame_count: Option<u64>,
    ) -> Self {
        self.duration_secs = duration_secs.filter(|d| *d > 0.0);
        self.frame_count = frame_count.filter(|f| *f > 0);
        self.progress_basis = if self.duration_secs.is_some() {
            ProgressBasis::Duration
        } else if self.frame_count.is_some() {
            ProgressBasis::Frames
        } else {
            ProgressBasis::Unknown
        };
        self
    }

    /// Allow replacing an existing destination file.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Update progress; never moves backwards and never leaves 0.0..=1.0.
    ///
    /// Returns true when the stored value changed.
    pub fn set_progress(&mut self, fraction: f64) -> bool {
        if self.is_terminal() || !fraction.is_finite() {
            return false;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction <= self.progress_fraction {
            return false;
        }
        self.progress_fraction = fraction;
        self.updated_at = Utc::now();
        true
    }

    /// Update the current step description.
    pub fn set_step(&mut self, step: impl Into<String>) {
        self.current_step = Some(step.into());
        self.updated_at = Utc::now();
    }

    /// Move from pending to running.
    pub fn mark_running(&mut self) -> bool {
        if !self.transition(JobStatus::Running) {
            return false;
        }
        self.started_at = Some(self.updated_at);
        true
    }

    /// Mark job as succeeded.
    pub fn complete(&mut self) -> bool {
        if !self.transition(JobStatus::Succeeded) {
            return false;
        }
        self.progress_fraction = 1.0;
        self.current_step = Some("Complete".into());
        self.finished_at = Some(self.updated_at);
        true
    }

    /// Mark job as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.transition(JobStatus::Failed) {
            return false;
        }
        self.error_message = Some(error.into());
        self.current_step = Some("Failed".into());
        self.finished_at = Some(self.updated_at);
        true
    }

    /// Mark job as cancelled.
    pub fn cancel(&mut self, reason: impl Into<String>) -> bool {
        if !self.transition(JobStatus::Cancelled) {
            return false;
        }
        self.error_message = Some(reason.into());
        self.current_step = Some("Cancelled".into());
        self.finished_at = Some(self.updated_at);
        true
    }

    fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    /// Read-only view for front ends.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.status,
            progress_fraction: self.progress_fraction,
            progress_exact: self.progress_basis.is_exact(),
            current_step: self.current_step.clone(),
            output_path: (self.status == JobStatus::Succeeded).then(|| self.output_path.clone()),
            error_message: self.error_message.clone(),
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BezelConfig, BezelCrop, Dimensions, Orientation, OutputSpec, PanelPlan, Rect};

    fn sample_plan() -> LayoutPlan {
        let panel = |index: usize| PanelPlan {
            index,
            source_rect: Rect::new(index as u32 * 100, 0, 100, 200),
            rotate_90_ccw: false,
            crop_after_rotate: BezelCrop {
                left_px: 1,
                right_px: 2,
            },
        };
        LayoutPlan {
            orientation: Orientation::Wide,
            source: Dimensions::new(400, 200),
            bezels: BezelConfig::new(1, 2),
            panel_width: 100,
            panel_height: 200,
            panels: [panel(0), panel(1), panel(2), panel(3)],
            output: OutputSpec {
                width: 388,
                height: 200,
            },
        }
    }

    fn sample_job() -> ProcessingJob {
        ProcessingJob::new("in.mp4", "in_bezel_removed.mp4", sample_plan(), EncodingConfig::default())
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress_fraction, 0.0);
        assert_eq!(job.progress_basis, ProgressBasis::Unknown);
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_progress_basis_from_source_info() {
        let job = sample_job().with_source_info(Some(12.5), Some(300));
        assert_eq!(job.progress_basis, ProgressBasis::Duration);

        let job = sample_job().with_source_info(Some(0.0), Some(300));
        assert_eq!(job.progress_basis, ProgressBasis::Frames);
        assert_eq!(job.duration_secs, None);

        let job = sample_job().with_source_info(None, None);
        assert!(!job.snapshot().progress_exact);
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut job = sample_job();
        job.mark_running();

        assert!(job.set_progress(0.4));
        assert!(!job.set_progress(0.3));
        assert_eq!(job.progress_fraction, 0.4);

        assert!(job.set_progress(7.0));
        assert_eq!(job.progress_fraction, 1.0);
        assert!(!job.set_progress(f64::NAN));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = sample_job();
        assert!(job.mark_running());
        assert!(!job.mark_running());
        assert!(job.fail("engine exited with code 1"));
        assert!(!job.complete());
        assert!(!job.cancel("too late"));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("engine exited with code 1"));
        assert!(!job.set_progress(0.9));
    }

    #[test]
    fn test_complete_sets_output_in_snapshot() {
        let mut job = sample_job();
        assert!(job.snapshot().output_path.is_none());

        job.mark_running();
        job.set_progress(0.5);
        assert!(job.complete());

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Succeeded);
        assert_eq!(snapshot.progress_fraction, 1.0);
        assert_eq!(snapshot.output_path, Some(PathBuf::from("in_bezel_removed.mp4")));
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_pending_job_can_be_cancelled() {
        let mut job = sample_job();
        assert!(job.cancel("cancelled before start"));
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_job_id_short() {
        let id = JobId::from_string("0123456789abcdef");
        assert_eq!(id.short(), "01234567");
        assert_eq!(JobId::from_string("abc").short(), "abc");
    }
}
