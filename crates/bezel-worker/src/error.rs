//! Worker error types.

use std::path::PathBuf;

use bezel_media::MediaError;
use bezel_models::{GeometryError, JobId};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The input's dimensions or duration could not be read.
    #[error("Cannot read input: {0}")]
    Probe(String),

    #[error("Invalid panel geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    #[error("Output already exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("Already running: {0}")]
    AlreadyRunning(String),

    #[error("Encoding engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Encoding failed: {message}")]
    EngineExecution {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn engine_execution(msg: impl Into<String>) -> Self {
        Self::EngineExecution {
            message: msg.into(),
            stderr: None,
            exit_code: None,
        }
    }

    /// Message stored on a failed job: the summary, then the engine's
    /// diagnostics when there are any.
    pub fn job_message(&self) -> String {
        match self {
            WorkerError::EngineExecution {
                stderr: Some(stderr),
                ..
            } if !stderr.trim().is_empty() => format!("{}\n{}", self, stderr.trim()),
            _ => self.to_string(),
        }
    }

    /// Check if the error ends a job as cancelled rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }
}

impl From<MediaError> for WorkerError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Cancelled => WorkerError::Cancelled,
            MediaError::FfmpegNotFound => {
                WorkerError::EngineUnavailable("ffmpeg binary not found".to_string())
            }
            MediaError::FfmpegFailed {
                message,
                stderr,
                exit_code,
            } => WorkerError::EngineExecution {
                message,
                stderr,
                exit_code,
            },
            MediaError::FfprobeFailed { message, stderr } => match stderr {
                Some(stderr) if !stderr.is_empty() => {
                    WorkerError::Probe(format!("{}: {}", message, stderr))
                }
                _ => WorkerError::Probe(message),
            },
            e if e.is_probe_error() => WorkerError::Probe(e.to_string()),
            MediaError::Io(e) => WorkerError::Io(e),
            other => WorkerError::EngineExecution {
                message: other.to_string(),
                stderr: None,
                exit_code: None,
            },
        }
    }
}
