//! `bezel-remover`: remove videowall bezels from one capture.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use bezel_models::{BezelConfig, JobStatus};
use bezel_worker::logging::init_tracing;
use bezel_worker::{JobExecutor, JobRequest, WorkerConfig};

/// Exit code for a job stopped by the user, as for SIGINT.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "bezel-remover",
    version,
    about = "Remove bezels from a four-panel videowall capture",
    long_about = "Splits a videowall capture into its four portrait panels, crops the bezel strips from each and joins them back into one seamless video."
)]
struct Cli {
    /// Input video (wide: panels side by side, tall: panels stacked)
    input: PathBuf,

    /// Top bezel width in pixels (cut from the left of each panel)
    #[arg(long)]
    top: Option<u32>,

    /// Bottom bezel width in pixels (cut from the right of each panel)
    #[arg(long)]
    bottom: Option<u32>,

    /// Output path (default: <input>_bezel_removed.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Replace the output if it already exists
    #[arg(long)]
    overwrite: bool,

    /// Aim for an output of at most this many megabytes
    #[arg(long, conflicts_with = "bitrate_kbps")]
    target_size_mb: Option<f64>,

    /// Explicit video bitrate in kbps
    #[arg(long)]
    bitrate_kbps: Option<u32>,

    /// Two-pass encoding (needs a bitrate or target size)
    #[arg(long)]
    two_pass: bool,

    /// ffmpeg binary to use
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// ffprobe binary to use
    #[arg(long)]
    ffprobe: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut config = WorkerConfig::from_env();
    if cli.ffmpeg.is_some() {
        config.ffmpeg_path = cli.ffmpeg.clone();
    }
    if cli.ffprobe.is_some() {
        config.ffprobe_path = cli.ffprobe.clone();
    }

    let bezels = BezelConfig::new(
        cli.top.unwrap_or(config.default_bezels.top_bezel_px),
        cli.bottom.unwrap_or(config.default_bezels.bottom_bezel_px),
    );

    let mut encoding = config.encoding.clone();
    if let Some(kbps) = cli.bitrate_kbps {
        encoding = encoding.with_bitrate_kbps(kbps);
    }
    if let Some(mb) = cli.target_size_mb {
        encoding = encoding.with_target_size_mb(mb);
    }
    if cli.two_pass {
        encoding = encoding.with_two_pass();
    }

    let executor = JobExecutor::new(config).context("Invalid configuration")?;

    let mut request = JobRequest::new(&cli.input, bezels)
        .with_overwrite(cli.overwrite)
        .with_encoding(encoding);
    if let Some(output) = cli.output {
        request = request.with_output(output);
    }

    let handle = match executor.submit(request).await {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut updates = executor.subscribe(&handle).await?;
    {
        let job = updates.borrow_and_update();
        println!(
            "{} ({}, {} px) -> {} px, bezels {}/{} px",
            job.input_path.display(),
            job.plan.orientation,
            job.plan.source,
            job.plan.output,
            job.plan.bezels.top_bezel_px,
            job.plan.bezels.bottom_bezel_px
        );
    }

    let mut last_step: Option<String> = None;
    let mut last_percent: Option<u32> = None;
    let mut cancel_requested = false;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let job = updates.borrow_and_update().clone();

                if job.current_step != last_step {
                    if let Some(step) = &job.current_step {
                        println!("{}", step);
                    }
                    last_step = job.current_step.clone();
                }

                if job.progress_basis.is_exact() {
                    let percent = (job.progress_fraction * 100.0).floor() as u32;
                    if last_percent != Some(percent) {
                        println!("  {:>3}%", percent);
                        last_percent = Some(percent);
                    }
                }

                if job.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                warn!("Interrupted, cancelling job {}", handle);
                cancel_requested = true;
                executor.cancel(&handle).await?;
            }
        }
    }

    let snapshot = executor.wait(&handle).await?;
    info!(job_id = %handle, status = %snapshot.status, "Job finished");

    let code = match snapshot.status {
        JobStatus::Succeeded => {
            if let Some(path) = &snapshot.output_path {
                println!("Saved {}", path.display());
            }
            ExitCode::SUCCESS
        }
        JobStatus::Cancelled => {
            eprintln!("Cancelled");
            ExitCode::from(EXIT_CANCELLED)
        }
        _ => {
            eprintln!(
                "error: {}",
                snapshot.error_message.as_deref().unwrap_or("processing failed")
            );
            ExitCode::FAILURE
        }
    };

    executor.release(&handle).await?;
    Ok(code)
}
