//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Output time as string (HH:MM:SS.microseconds)
    pub out_time: String,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fraction (0.0-1.0) of the work done, measured against `total`.
    pub fn fraction(&self, total: ProgressTotal) -> Option<f64> {
        let raw = match total {
            ProgressTotal::DurationMs(ms) if ms > 0 => self.out_time_ms as f64 / ms as f64,
            ProgressTotal::Frames(frames) if frames > 0 => self.frame as f64 / frames as f64,
            _ => return None,
        };
        Some(raw.clamp(0.0, 1.0))
    }
}

/// What a pass's progress is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressTotal {
    DurationMs(i64),
    Frames(u64),
    Unknown,
}

impl ProgressTotal {
    /// Prefer the probed duration, then the frame count.
    pub fn from_probe(duration_secs: Option<f64>, frame_count: Option<u64>) -> Self {
        match (duration_secs, frame_count) {
            (Some(secs), _) if secs > 0.0 => Self::DurationMs((secs * 1000.0).round() as i64),
            (_, Some(frames)) if frames > 0 => Self::Frames(frames),
            _ => Self::Unknown,
        }
    }
}

/// Maps one pass's 0.0-1.0 progress into its share of the whole job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassWindow {
    pub offset: f64,
    pub weight: f64,
}

impl PassWindow {
    /// Window for pass `pass` (1-based) out of `passes` equal passes.
    pub fn for_pass(pass: u32, passes: u32) -> Self {
        let passes = passes.max(1);
        let pass = pass.clamp(1, passes);
        let weight = 1.0 / f64::from(passes);
        Self {
            offset: f64::from(pass - 1) * weight,
            weight,
        }
    }

    pub fn overall(&self, pass_fraction: f64) -> f64 {
        (self.offset + pass_fraction.clamp(0.0, 1.0) * self.weight).min(1.0)
    }
}
