//! Shared data models for the videowall bezel remover.
//!
//! This crate provides Serde-serializable types for:
//! - Source dimensions, bezel widths and per-panel geometry plans
//! - Processing jobs, their status and front-end snapshots
//! - Encoding configuration

pub mod encoding;
pub mod geometry;
pub mod job;
pub mod job_status;

// Re-export common types
pub use encoding::{video_bitrate_for_target_size, EncodingConfig};
pub use geometry::{
    Axis, BezelConfig, BezelCrop, Dimensions, GeometryError, LayoutPlan, Orientation, OutputSpec,
    PanelPlan, Rect, PANEL_COUNT,
};
pub use job::{JobId, ProcessingJob};
pub use job_status::{JobSnapshot, JobStatus, ProgressBasis};
