//! Bezel removal job orchestrator.
//!
//! This crate provides:
//! - Job submission, status, progress streaming and cancellation
//! - Atomic finalization of the output file
//! - Environment configuration, structured logging and metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, JobHandle, JobRequest};
pub use logging::JobLogger;
