//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 64;

/// Where FFmpeg writes its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A container file
    File(PathBuf),
    /// Discard everything (`-f null -`), used by analysis passes
    Null,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// FFmpeg binary
    program: PathBuf,
    /// Input file path
    input: PathBuf,
    /// Output destination
    output: OutputTarget,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to a file.
    pub fn new(
        program: impl AsRef<Path>,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Self {
        Self::with_target(program, input, OutputTarget::File(output.as_ref().to_path_buf()))
    }

    /// Create a new FFmpeg command whose output is discarded.
    pub fn to_null(program: impl AsRef<Path>, input: impl AsRef<Path>) -> Self {
        Self::with_target(program, input, OutputTarget::Null)
    }

    fn with_target(program: impl AsRef<Path>, input: impl AsRef<Path>, output: OutputTarget) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            input: input.as_ref().to_path_buf(),
            output,
            output_args: Vec::new(),
        }
    }

    /// FFmpeg binary this command runs.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Output destination.
    pub fn output(&self) -> &OutputTarget {
        &self.output
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter pad into the output.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set video bitrate.
    pub fn video_bitrate_kbps(self, kbps: u32) -> Self {
        self.output_arg("-b:v").output_arg(format!("{}k", kbps))
    }

    /// Select the pass of a two-pass encode and where its stats live.
    pub fn pass(self, pass: u32, passlog_prefix: impl AsRef<Path>) -> Self {
        self.output_arg("-pass")
            .output_arg(pass.to_string())
            .output_arg("-passlogfile")
            .output_arg(passlog_prefix.as_ref().to_string_lossy().to_string())
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Set audio channel count.
    pub fn audio_channels(self, channels: u8) -> Self {
        self.output_arg("-ac").output_arg(channels.to_string())
    }

    /// Drop audio.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Put the index at the front of MP4/MOV files.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        // The destination is a private partial file, so overwriting is safe
        let mut args: Vec<String> = ["-y", "-hide_banner", "-nostats", "-loglevel", "error"]
            .map(String::from)
            .to_vec();

        // Machine-readable progress on stdout, diagnostics stay on stderr
        args.push("-progress".to_string());
        args.push("pipe:1".to_string());

        // Input file
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        // Output args
        args.extend(self.output_args.clone());

        match &self.output {
            OutputTarget::File(path) => args.push(path.to_string_lossy().to_string()),
            OutputTarget::Null => {
                args.extend(["-f", "null", "-"].map(String::from));
            }
        }

        args
    }
}

/// Runner for FFmpeg commands with progress tracking and cancellation.
///
/// No time limit is imposed; a run ends when FFmpeg exits or is cancelled.
pub struct FfmpegRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { cancel_rx: None }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        if self.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", cmd.program().display(), args.join(" "));

        let mut child = Command::new(cmd.program())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    MediaError::FfmpegNotFound
                }
                _ => MediaError::Io(e),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::Io(std::io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::Io(std::io::Error::other("stderr not captured")))?;

        // Spawn progress parsing task
        let progress_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            let mut current_progress = FfmpegProgress::default();

            while let Ok(Some(line)) = reader.next_line().await {
                if let Some(progress) = parse_progress_line(&line, &mut current_progress) {
                    progress_callback(progress);
                }
            }
        });

        // Keep the tail of stderr for the error report
        let stderr_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let status = match self.wait_for_completion(&mut child).await {
            Ok(status) => status,
            Err(e) => {
                progress_handle.abort();
                stderr_handle.abort();
                return Err(e);
            }
        };

        // Drain the readers so the last progress block is delivered
        let _ = progress_handle.await;
        let stderr_tail = stderr_handle.await.unwrap_or_default();

        if status.success() {
            return Ok(());
        }

        let message = match status.code() {
            Some(code) => format!("FFmpeg exited with status {}", code),
            None => "FFmpeg was terminated by a signal".to_string(),
        };
        Err(MediaError::ffmpeg_failed(
            message,
            (!stderr_tail.is_empty()).then_some(stderr_tail),
            status.code(),
        ))
    }

    /// Wait for child process with cancellation.
    ///
    /// Cancellation is observed while the process runs, not after it exits.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let cancel_rx = self.cancel_rx.clone();
        let cancelled = async move {
            match cancel_rx {
                Some(mut rx) => loop {
                    if *rx.borrow_and_update() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        // Sender gone: nobody can cancel any more
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            status = child.wait() => Ok(status?),
            _ = cancelled => {
                info!("FFmpeg cancelled, killing process");
                child.kill().await?;
                Err(MediaError::Cancelled)
            }
        }
    }
}

/// Parse a progress line from FFmpeg's -progress output.
///
/// Returns the accumulated block when a `progress=` line closes it.
fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        match key {
            // Despite its name, FFmpeg reports out_time_ms in microseconds too
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    current.out_time_ms = us / 1000;
                }
            }
            "out_time" => {
                // Format: HH:MM:SS.microseconds
                current.out_time = value.to_string();
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    current.fps = fps;
                }
            }
            "speed" => {
                // Format: "1.5x" or "N/A"
                if let Some(speed) = value
                    .trim()
                    .strip_suffix('x')
                    .and_then(|s| s.parse().ok())
                {
                    current.speed = speed;
                }
            }
            "progress" => {
                // "continue" or "end"
                if value == "end" {
                    current.is_complete = true;
                }
                return Some(current.clone());
            }
            _ => {}
        }
    }

    None
}
