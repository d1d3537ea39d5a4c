//! Worker configuration.

use std::path::PathBuf;

use bezel_models::geometry::{DEFAULT_BOTTOM_BEZEL_PX, DEFAULT_TOP_BEZEL_PX};
use bezel_models::{BezelConfig, EncodingConfig};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Explicit ffmpeg binary; otherwise bundled `bin/` then PATH
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit ffprobe binary; otherwise next to ffmpeg, bundled `bin/`, PATH
    pub ffprobe_path: Option<PathBuf>,
    /// Maximum concurrent engine processes
    pub max_concurrent_jobs: usize,
    /// Bezel widths used when a request does not give any
    pub default_bezels: BezelConfig,
    /// Replace existing outputs by default
    pub overwrite: bool,
    /// Encoder settings used when a request does not give any
    pub encoding: EncodingConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            max_concurrent_jobs: 1,
            default_bezels: BezelConfig::default(),
            overwrite: false,
            encoding: EncodingConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = EncodingConfig::default();

        let mut encoding = EncodingConfig {
            codec: std::env::var("BEZEL_VIDEO_CODEC").unwrap_or(defaults.codec),
            preset: std::env::var("BEZEL_PRESET").unwrap_or(defaults.preset),
            crf: std::env::var("BEZEL_CRF")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.crf),
            two_pass: std::env::var("BEZEL_TWO_PASS")
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(false),
            ..defaults
        };
        if let Some(mb) = std::env::var("BEZEL_TARGET_SIZE_MB")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|mb| *mb > 0.0)
        {
            encoding = encoding.with_target_size_mb(mb);
        }

        Self {
            ffmpeg_path: std::env::var("BEZEL_FFMPEG_PATH").ok().map(PathBuf::from),
            ffprobe_path: std::env::var("BEZEL_FFPROBE_PATH").ok().map(PathBuf::from),
            max_concurrent_jobs: std::env::var("BEZEL_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            default_bezels: BezelConfig::new(
                std::env::var("BEZEL_DEFAULT_TOP_PX")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TOP_BEZEL_PX),
                std::env::var("BEZEL_DEFAULT_BOTTOM_PX")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_BOTTOM_BEZEL_PX),
            ),
            overwrite: std::env::var("BEZEL_OVERWRITE")
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(false),
            encoding,
        }
    }

    /// Use the given engine binaries.
    pub fn with_tools(mut self, ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = Some(ffmpeg.into());
        self.ffprobe_path = Some(ffprobe.into());
        self
    }

    /// Check values that would make every job fail.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(WorkerError::config("max_concurrent_jobs must be at least 1"));
        }
        if self.encoding.crf > 51 {
            return Err(WorkerError::config(format!(
                "CRF {} is out of range (0-51)",
                self.encoding.crf
            )));
        }
        if self.encoding.codec.trim().is_empty() {
            return Err(WorkerError::config("video codec must not be empty"));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 1);
        assert_eq!(config.default_bezels, BezelConfig::new(16, 21));
        assert!(!config.overwrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_validate_rejects_zero_slots() {
        let config = WorkerConfig {
            max_concurrent_jobs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(WorkerError::Config(_))));
    }

    #[test]
    fn test_with_tools() {
        let config = WorkerConfig::default().with_tools("/opt/ff/ffmpeg", "/opt/ff/ffprobe");
        assert_eq!(config.ffmpeg_path, Some(PathBuf::from("/opt/ff/ffmpeg")));
        assert_eq!(config.ffprobe_path, Some(PathBuf::from("/opt/ff/ffprobe")));
    }
}
