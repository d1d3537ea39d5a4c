//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "medium";
/// Default CRF (Constant Rate Factor) when no bitrate is requested
pub const DEFAULT_CRF: u8 = 18;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "160k";
/// Default audio channel count
pub const DEFAULT_AUDIO_CHANNELS: u8 = 2;

/// Video bitrate used when a target size is requested but the duration is unknown.
pub const DEFAULT_VIDEO_BITRATE_KBPS: u32 = 10_000;
/// Lower clamp for size-derived bitrates.
pub const MIN_VIDEO_BITRATE_KBPS: u32 = 1_000;
/// Upper clamp for size-derived bitrates.
pub const MAX_VIDEO_BITRATE_KBPS: u32 = 50_000;
/// Audio budget reserved when deriving a video bitrate from a target size.
pub const RESERVED_AUDIO_KBPS: f64 = 160.0;

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264", "libx265")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor, used only when no bitrate is resolved
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Explicit video bitrate in kbps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_bitrate_kbps: Option<u32>,

    /// Keep the output at or under this size (MiB); derives the bitrate from the duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_size_mb: Option<f64>,

    /// Run an analysis pass before the final encode (needs a bitrate)
    #[serde(default)]
    pub two_pass: bool,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Audio channel count
    #[serde(default = "default_audio_channels")]
    pub audio_channels: u8,

    /// Move the moov atom to the front for progressive playback
    #[serde(default = "default_faststart")]
    pub faststart: bool,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_audio_channels() -> u8 {
    DEFAULT_AUDIO_CHANNELS
}
fn default_faststart() -> bool {
    true
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            video_bitrate_kbps: None,
            target_size_mb: None,
            two_pass: false,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            audio_channels: DEFAULT_AUDIO_CHANNELS,
            faststart: true,
        }
    }
}

impl EncodingConfig {
    /// Create a new encoding configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new config with an explicit video bitrate.
    pub fn with_bitrate_kbps(mut self, kbps: u32) -> Self {
        self.video_bitrate_kbps = Some(kbps);
        self
    }

    /// Returns a new config that aims for a maximum output size.
    pub fn with_target_size_mb(mut self, megabytes: f64) -> Self {
        self.target_size_mb = Some(megabytes);
        self
    }

    /// Returns a new config with two-pass encoding enabled.
    pub fn with_two_pass(mut self) -> Self {
        self.two_pass = true;
        self
    }

    /// Effective video bitrate for a source of `duration_secs`.
    ///
    /// An explicit bitrate wins over a target size; `None` means CRF mode.
    pub fn resolve_bitrate_kbps(&self, duration_secs: Option<f64>) -> Option<u32> {
        if let Some(kbps) = self.video_bitrate_kbps {
            return Some(kbps);
        }
        match self.target_size_mb {
            Some(mb) if mb > 0.0 => Some(video_bitrate_for_target_size(
                mb,
                duration_secs.unwrap_or(0.0),
            )),
            _ => None,
        }
    }

    /// Two-pass only makes sense with a bitrate target.
    pub fn is_two_pass(&self, duration_secs: Option<f64>) -> bool {
        self.two_pass && self.resolve_bitrate_kbps(duration_secs).is_some()
    }
}

/// Video bitrate (kbps) that keeps the output at or under `target_size_mb`.
///
/// Reserves room for the audio track and clamps to the supported range.
pub fn video_bitrate_for_target_size(target_size_mb: f64, duration_secs: f64) -> u32 {
    if duration_secs <= 0.0 {
        return DEFAULT_VIDEO_BITRATE_KBPS;
    }
    let target_bits = target_size_mb * 8.0 * 1024.0 * 1024.0;
    let audio_bits = RESERVED_AUDIO_KBPS * 1000.0 * duration_secs;
    let video_kbps = ((target_bits - audio_bits) / duration_secs / 1000.0).round();

    video_kbps.clamp(
        f64::from(MIN_VIDEO_BITRATE_KBPS),
        f64::from(MAX_VIDEO_BITRATE_KBPS),
    ) as u32
}
