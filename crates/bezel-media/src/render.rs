//! Encoding passes for a bezel-removal pipeline.
//!
//! Single-pass mode writes the output directly, in CRF or bitrate mode.
//! Two-pass mode first analyses into the null muxer, then encodes. Each pass
//! owns an equal share of the job's progress.

use bezel_models::EncodingConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner, OutputTarget};
use crate::error::MediaResult;
use crate::filters::{to_filter_graph, FilterGraph};
use crate::pipeline::PipelineDescription;
use crate::progress::{PassWindow, ProgressTotal};

/// Facts about the source that shape the encode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceFacts {
    pub duration_secs: Option<f64>,
    pub frame_count: Option<u64>,
}

impl SourceFacts {
    pub fn progress_total(&self) -> ProgressTotal {
        ProgressTotal::from_probe(self.duration_secs, self.frame_count)
    }
}

/// Something the render reports while running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderEvent {
    /// Pass `pass` of `passes` is starting
    PassStarted { pass: u32, passes: u32 },
    /// Overall fraction of the job done, 0.0-1.0
    Progress(f64),
}

/// Listener for [`RenderEvent`]s.
pub type RenderListener = Arc<dyn Fn(RenderEvent) + Send + Sync + 'static>;

/// Fully resolved FFmpeg invocations for one job.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub graph: FilterGraph,
    pub passes: Vec<FfmpegCommand>,
    pub video_bitrate_kbps: Option<u32>,
}

impl RenderPlan {
    /// Build the passes that turn `pipeline.source` into `output`.
    ///
    /// `passlog_prefix` is only used in two-pass mode and must point into a
    /// directory that lives until the last pass is done.
    pub fn build(
        ffmpeg: &Path,
        pipeline: &PipelineDescription,
        output: &Path,
        encoding: &EncodingConfig,
        source: &SourceFacts,
        passlog_prefix: Option<&Path>,
    ) -> Self {
        let graph = to_filter_graph(pipeline);
        let bitrate = encoding.resolve_bitrate_kbps(source.duration_secs);

        let passes = match (encoding.is_two_pass(source.duration_secs), passlog_prefix) {
            (true, Some(prefix)) => vec![
                encode_command(
                    ffmpeg,
                    pipeline,
                    &graph,
                    OutputTarget::Null,
                    encoding,
                    bitrate,
                    Some((1, prefix)),
                ),
                encode_command(
                    ffmpeg,
                    pipeline,
                    &graph,
                    OutputTarget::File(output.to_path_buf()),
                    encoding,
                    bitrate,
                    Some((2, prefix)),
                ),
            ],
            _ => vec![encode_command(
                ffmpeg,
                pipeline,
                &graph,
                OutputTarget::File(output.to_path_buf()),
                encoding,
                bitrate,
                None,
            )],
        };

        Self {
            graph,
            passes,
            video_bitrate_kbps: bitrate,
        }
    }

    pub fn pass_count(&self) -> u32 {
        self.passes.len() as u32
    }

    /// Run every pass in order, stopping at the first error.
    pub async fn run(
        &self,
        runner: &FfmpegRunner,
        total: ProgressTotal,
        listener: RenderListener,
    ) -> MediaResult<()> {
        let passes = self.pass_count();

        for (i, cmd) in self.passes.iter().enumerate() {
            let pass = i as u32 + 1;
            let window = PassWindow::for_pass(pass, passes);

            info!("Starting encoding pass {}/{}", pass, passes);
            listener(RenderEvent::PassStarted { pass, passes });

            let on_progress = listener.clone();
            runner
                .run_with_progress(cmd, move |progress| {
                    if let Some(fraction) = progress.fraction(total) {
                        on_progress(RenderEvent::Progress(window.overall(fraction)));
                    }
                })
                .await?;

            // Completion of the last pass is reported by the caller once the
            // output is in place.
            if pass < passes {
                listener(RenderEvent::Progress(window.overall(1.0)));
            }
        }

        Ok(())
    }
}

fn encode_command(
    ffmpeg: &Path,
    pipeline: &PipelineDescription,
    graph: &FilterGraph,
    target: OutputTarget,
    encoding: &EncodingConfig,
    bitrate_kbps: Option<u32>,
    pass: Option<(u32, &Path)>,
) -> FfmpegCommand {
    let analysis_only = target == OutputTarget::Null;

    let mut cmd = match target {
        OutputTarget::File(path) => FfmpegCommand::new(ffmpeg, &pipeline.source, path),
        OutputTarget::Null => FfmpegCommand::to_null(ffmpeg, &pipeline.source),
    }
    .filter_complex(graph.graph.clone())
    .map(graph.map_arg())
    .video_codec(encoding.codec.clone())
    .preset(encoding.preset.clone());

    cmd = match bitrate_kbps {
        Some(kbps) => cmd.video_bitrate_kbps(kbps),
        None => cmd.crf(encoding.crf),
    };

    if let Some((number, prefix)) = pass {
        cmd = cmd.pass(number, prefix);
    }

    if analysis_only {
        return cmd.no_audio();
    }

    // Audio is copied through when present; `?` keeps silent inputs valid.
    cmd = cmd
        .map("0:a?")
        .audio_codec(encoding.audio_codec.clone())
        .audio_bitrate(encoding.audio_bitrate.clone())
        .audio_channels(encoding.audio_channels);

    if encoding.faststart {
        cmd = cmd.faststart();
    }
    cmd
}

/// Passlog prefix inside `dir`, named after the job.
pub fn passlog_prefix(dir: &Path, job_short_id: &str) -> PathBuf {
    dir.join(format!("bezel-{}", job_short_id))
}
