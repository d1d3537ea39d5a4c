//! Locating the FFmpeg and FFprobe binaries.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

const FFMPEG_NAME: &str = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
const FFPROBE_NAME: &str = if cfg!(windows) { "ffprobe.exe" } else { "ffprobe" };

/// Resolved paths of the external media engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl MediaTools {
    /// Use the given binaries as-is.
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Find the engine binaries.
    ///
    /// Lookup order: explicit override, a `bin/` directory next to the
    /// running executable, then `PATH`. With only an ffmpeg override, ffprobe
    /// is looked for next to it first.
    pub fn locate(
        ffmpeg_override: Option<&Path>,
        ffprobe_override: Option<&Path>,
    ) -> MediaResult<Self> {
        let ffmpeg = match ffmpeg_override {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(_) => return Err(MediaError::FfmpegNotFound),
            None => find_binary(FFMPEG_NAME).ok_or(MediaError::FfmpegNotFound)?,
        };

        let ffprobe = match ffprobe_override {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(_) => return Err(MediaError::FfprobeNotFound),
            None => sibling_of(&ffmpeg, FFPROBE_NAME)
                .or_else(|| find_binary(FFPROBE_NAME))
                .ok_or(MediaError::FfprobeNotFound)?,
        };

        debug!(
            ffmpeg = %ffmpeg.display(),
            ffprobe = %ffprobe.display(),
            "Resolved media tools"
        );
        Ok(Self { ffmpeg, ffprobe })
    }
}

fn find_binary(name: &str) -> Option<PathBuf> {
    bundled_binary(name).or_else(|| which::which(name).ok())
}

/// Binary shipped in `bin/` beside the running executable.
fn bundled_binary(name: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join("bin").join(name);
    candidate.is_file().then_some(candidate)
}

fn sibling_of(binary: &Path, name: &str) -> Option<PathBuf> {
    let candidate = binary.parent()?.join(name);
    candidate.is_file().then_some(candidate)
}
