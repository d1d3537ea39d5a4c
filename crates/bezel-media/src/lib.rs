#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper and panel geometry for videowall bezel removal.
//!
//! This crate provides:
//! - Panel layout planning for four-panel wall captures
//! - An engine-agnostic pipeline description and its FFmpeg filter graph
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:1`
//! - Cancellation support via tokio
//! - Output naming and atomic finalization helpers

pub mod command;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod layout;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod render;
pub mod tools;

pub use command::{FfmpegCommand, FfmpegRunner, OutputTarget};
pub use error::{MediaError, MediaResult};
pub use filters::{to_filter_graph, FilterGraph};
pub use fs_utils::{move_file, output_path_for, partial_output_path, remove_if_exists};
pub use layout::{plan, tiles_frame};
pub use pipeline::{PanelChain, PanelOp, PipelineDescription};
pub use probe::{probe_video, VideoInfo};
pub use progress::{FfmpegProgress, PassWindow, ProgressTotal};
pub use render::{RenderEvent, RenderListener, RenderPlan, SourceFacts};
pub use tools::MediaTools;
