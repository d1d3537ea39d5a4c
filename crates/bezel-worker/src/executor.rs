//! Job executor.
//!
//! Owns every job record, starts one control task per running job and is
//! the only place that moves a job between states.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{debug, info, Instrument};

use bezel_media::fs_utils::{file_size, move_file, output_path_for, partial_output_path, remove_if_exists};
use bezel_media::render::passlog_prefix;
use bezel_media::{
    plan, probe_video, FfmpegRunner, MediaTools, PipelineDescription, RenderEvent, RenderListener,
    RenderPlan, SourceFacts,
};
use bezel_models::{BezelConfig, EncodingConfig, JobId, JobSnapshot, JobStatus, ProcessingJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

const OPERATION: &str = "bezel_removal";

/// What a front end asks for.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub input_path: PathBuf,
    pub bezels: BezelConfig,
    /// Defaults to `<stem>_bezel_removed.<ext>` beside the input
    pub output_path: Option<PathBuf>,
    /// Replace an existing destination
    pub overwrite: bool,
    /// Defaults to the executor's configured encoding
    pub encoding: Option<EncodingConfig>,
}

impl JobRequest {
    pub fn new(input_path: impl Into<PathBuf>, bezels: BezelConfig) -> Self {
        Self {
            input_path: input_path.into(),
            bezels,
            output_path: None,
            overwrite: false,
            encoding: None,
        }
    }

    pub fn with_output(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(output_path.into());
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = Some(encoding);
        self
    }
}

/// Opaque reference to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    id: JobId,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Live state of one job.
struct JobSlot {
    state: watch::Sender<ProcessingJob>,
    cancel: watch::Sender<bool>,
    tools: MediaTools,
    /// Resolved destination, used for reservations
    output_key: PathBuf,
}

impl JobSlot {
    fn status(&self) -> JobStatus {
        self.state.borrow().status
    }
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<JobId, Arc<JobSlot>>,
    /// Destinations held by RUNNING jobs
    reserved_outputs: HashSet<PathBuf>,
}

struct ExecutorInner {
    config: WorkerConfig,
    registry: Mutex<Registry>,
    job_semaphore: Arc<Semaphore>,
}

/// Runs bezel-removal jobs. Cheap to clone; clones share the same jobs.
#[derive(Clone)]
pub struct JobExecutor {
    inner: Arc<ExecutorInner>,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig) -> WorkerResult<Self> {
        config.validate()?;
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));

        Ok(Self {
            inner: Arc::new(ExecutorInner {
                config,
                registry: Mutex::new(Registry::default()),
                job_semaphore,
            }),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Submit a job with default output path and encoding.
    pub async fn submit_job(
        &self,
        input_path: impl Into<PathBuf>,
        bezels: BezelConfig,
    ) -> WorkerResult<JobHandle> {
        self.submit(JobRequest::new(input_path, bezels)).await
    }

    /// Validate, register and start a job.
    ///
    /// Probe, geometry and destination problems are returned here and no
    /// engine process is spawned for them.
    pub async fn submit(&self, request: JobRequest) -> WorkerResult<JobHandle> {
        let handle = self.prepare(request).await?;
        if let Err(e) = self.start(&handle).await {
            self.inner.registry.lock().await.jobs.remove(handle.id());
            return Err(e);
        }
        Ok(handle)
    }

    /// Validate a request and register it as a PENDING job.
    pub async fn prepare(&self, request: JobRequest) -> WorkerResult<JobHandle> {
        let config = &self.inner.config;
        let input = request.input_path;

        let is_file = tokio::fs::metadata(&input)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(WorkerError::probe(format!(
                "input file not found: {}",
                input.display()
            )));
        }

        let tools = MediaTools::locate(config.ffmpeg_path.as_deref(), config.ffprobe_path.as_deref())?;
        let info = probe_video(&tools, &input).await?;
        let layout = plan(info.dimensions(), request.bezels)?;

        let output = request
            .output_path
            .unwrap_or_else(|| output_path_for(&input));
        let output_key = resolve_output_key(&output).await;
        let encoding = request.encoding.unwrap_or_else(|| config.encoding.clone());

        let job = ProcessingJob::new(&input, &output, layout, encoding)
            .with_source_info(info.known_duration(), info.frame_count)
            .with_overwrite(request.overwrite || config.overwrite);
        let id = job.id.clone();

        info!(
            job_id = %id,
            input = %input.display(),
            output = %output.display(),
            source = %info.dimensions(),
            orientation = %job.plan.orientation,
            output_size = %job.plan.output,
            has_audio = info.has_audio,
            "Prepared job"
        );

        let (state, _) = watch::channel(job);
        let (cancel, _) = watch::channel(false);
        let slot = Arc::new(JobSlot {
            state,
            cancel,
            tools,
            output_key,
        });

        self.inner.registry.lock().await.jobs.insert(id.clone(), slot);
        Ok(JobHandle { id })
    }

    /// Start a PENDING job.
    pub async fn start(&self, handle: &JobHandle) -> WorkerResult<()> {
        let slot = self.slot(handle).await?;

        let (status, output, overwrite) = {
            let job = slot.state.borrow();
            (job.status, job.output_path.clone(), job.overwrite)
        };
        if status != JobStatus::Pending {
            return Err(WorkerError::AlreadyRunning(format!(
                "job {} is {}",
                handle, status
            )));
        }

        if !overwrite && tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(WorkerError::OutputExists(output));
        }

        {
            let mut registry = self.inner.registry.lock().await;
            if registry.reserved_outputs.contains(&slot.output_key) {
                return Err(WorkerError::AlreadyRunning(format!(
                    "another job is writing {}",
                    output.display()
                )));
            }

            let mut started = false;
            slot.state.send_if_modified(|job| {
                started = job.mark_running();
                started
            });
            if !started {
                return Err(WorkerError::AlreadyRunning(format!(
                    "job {} is {}",
                    handle,
                    slot.status()
                )));
            }
            registry.reserved_outputs.insert(slot.output_key.clone());
        }

        metrics::record_job_started();

        let logger = JobLogger::new(handle.id(), OPERATION);
        let span = logger.create_span();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_job(inner, slot, logger).instrument(span));

        Ok(())
    }

    /// Current snapshot of a job.
    pub async fn get_status(&self, handle: &JobHandle) -> WorkerResult<JobSnapshot> {
        let slot = self.slot(handle).await?;
        let snapshot = slot.state.borrow().snapshot();
        Ok(snapshot)
    }

    /// Stream of job updates; the current value is available immediately.
    pub async fn subscribe(&self, handle: &JobHandle) -> WorkerResult<watch::Receiver<ProcessingJob>> {
        let slot = self.slot(handle).await?;
        Ok(slot.state.subscribe())
    }

    /// Resolve once the job is terminal.
    pub async fn wait(&self, handle: &JobHandle) -> WorkerResult<JobSnapshot> {
        let slot = self.slot(handle).await?;
        let mut rx = slot.state.subscribe();
        let snapshot = rx
            .wait_for(|job| job.is_terminal())
            .await
            .map(|job| job.snapshot())
            .map_err(|_| WorkerError::JobNotFound(handle.id().clone()))?;
        Ok(snapshot)
    }

    /// Request cancellation. No-op for terminal jobs.
    ///
    /// A PENDING job is cancelled at once. A RUNNING job is cancelled by its
    /// control task, which stops the engine and discards partial output;
    /// use [`wait`](Self::wait) to observe the final state.
    pub async fn cancel(&self, handle: &JobHandle) -> WorkerResult<()> {
        let slot = self.slot(handle).await?;

        let mut cancelled_pending = false;
        slot.state.send_if_modified(|job| {
            if job.status == JobStatus::Pending {
                cancelled_pending = job.cancel("Cancelled before start");
            }
            cancelled_pending
        });

        if cancelled_pending {
            info!(job_id = %handle, "Cancelled pending job");
            metrics::record_job_finished(JobStatus::Cancelled, 0.0);
            return Ok(());
        }

        if slot.status() == JobStatus::Running {
            info!(job_id = %handle, "Cancellation requested");
            slot.cancel.send_replace(true);
        }
        Ok(())
    }

    /// Forget a terminal job.
    pub async fn release(&self, handle: &JobHandle) -> WorkerResult<()> {
        let mut registry = self.inner.registry.lock().await;
        let slot = registry
            .jobs
            .get(handle.id())
            .ok_or_else(|| WorkerError::JobNotFound(handle.id().clone()))?;

        let status = slot.status();
        if !status.is_terminal() {
            return Err(WorkerError::AlreadyRunning(format!(
                "job {} is still {}",
                handle, status
            )));
        }
        registry.jobs.remove(handle.id());
        Ok(())
    }

    async fn slot(&self, handle: &JobHandle) -> WorkerResult<Arc<JobSlot>> {
        self.inner
            .registry
            .lock()
            .await
            .jobs
            .get(handle.id())
            .cloned()
            .ok_or_else(|| WorkerError::JobNotFound(handle.id().clone()))
    }
}

/// Destination with its directory resolved, so two spellings of the same
/// path collide.
async fn resolve_output_key(path: &Path) -> PathBuf {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    match (tokio::fs::canonicalize(dir).await, path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

/// Resolves when cancellation has been requested.
async fn cancelled(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Control task: drive one RUNNING job to a terminal state.
async fn run_job(inner: Arc<ExecutorInner>, slot: Arc<JobSlot>, logger: JobLogger) {
    let started = Instant::now();
    let job = slot.state.borrow().clone();
    let partial = partial_output_path(&job.output_path, &job.id);

    logger.log_start(&format!(
        "{} ({}) -> {} ({})",
        job.input_path.display(),
        job.plan.source,
        job.output_path.display(),
        job.plan.output
    ));

    let outcome = execute(&inner, &slot, &job, &partial, &logger).await;

    if outcome.is_err() {
        remove_if_exists(&partial).await;
    }

    // A destination is free only once its holder is terminal.
    {
        let mut registry = inner.registry.lock().await;
        slot.state.send_modify(|job| {
            let _ = match &outcome {
                Ok(()) => job.complete(),
                Err(e) if e.is_cancelled() => job.cancel("Cancelled by user"),
                Err(e) => job.fail(e.job_message()),
            };
        });
        registry.reserved_outputs.remove(&slot.output_key);
    }

    if let Err(e) = &outcome {
        if !e.is_cancelled() {
            logger.log_error(&e.job_message());
        }
    }

    let status = slot.status();
    let elapsed = started.elapsed().as_secs_f64();
    logger.log_finished(status, elapsed);
    metrics::record_job_finished(status, elapsed);
}

async fn execute(
    inner: &ExecutorInner,
    slot: &Arc<JobSlot>,
    job: &ProcessingJob,
    partial: &Path,
    logger: &JobLogger,
) -> WorkerResult<()> {
    set_step(slot, logger, "Waiting for engine slot");
    let _permit = tokio::select! {
        permit = Arc::clone(&inner.job_semaphore).acquire_owned() => {
            permit.map_err(|_| WorkerError::config("executor is shut down"))?
        }
        _ = cancelled(slot.cancel.subscribe()) => return Err(WorkerError::Cancelled),
    };

    if !job.progress_basis.is_exact() {
        logger.log_warning(
            "source duration and frame count unknown, progress stays at 0 until done",
        );
    }

    set_step(slot, logger, "Building filter graph");
    let pipeline = PipelineDescription::build(&job.input_path, &job.plan);
    if !pipeline.is_consistent() {
        return Err(WorkerError::engine_execution(
            "pipeline does not produce the planned output size",
        ));
    }

    let output_dir = match job.output_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&output_dir).await?;

    let source = SourceFacts {
        duration_secs: job.duration_secs,
        frame_count: job.frame_count,
    };

    // Pass statistics live beside the output and vanish with this guard.
    let passlog_dir = if job.encoding.is_two_pass(job.duration_secs) {
        Some(
            tempfile::Builder::new()
                .prefix(".bezel-passlog-")
                .tempdir_in(&output_dir)?,
        )
    } else {
        None
    };
    let prefix = passlog_dir
        .as_ref()
        .map(|dir| passlog_prefix(dir.path(), job.id.short()));

    let render = RenderPlan::build(
        &slot.tools.ffmpeg,
        &pipeline,
        partial,
        &job.encoding,
        &source,
        prefix.as_deref(),
    );
    debug!(
        filter_graph = %render.graph.graph,
        passes = render.pass_count(),
        video_bitrate_kbps = ?render.video_bitrate_kbps,
        "Render plan ready"
    );

    let exact_progress = job.progress_basis.is_exact();
    let listener: RenderListener = {
        let slot = Arc::clone(slot);
        let logger = logger.clone();
        Arc::new(move |event: RenderEvent| match event {
            RenderEvent::PassStarted { pass, passes } => {
                let step = if passes > 1 {
                    format!("Encoding pass {}/{}", pass, passes)
                } else {
                    "Encoding".to_string()
                };
                set_step(&slot, &logger, step);
            }
            RenderEvent::Progress(fraction) if exact_progress => {
                slot.state.send_if_modified(|job| job.set_progress(fraction));
            }
            RenderEvent::Progress(_) => {}
        })
    };

    let runner = FfmpegRunner::new().with_cancel(slot.cancel.subscribe());
    render.run(&runner, source.progress_total(), listener).await?;
    drop(passlog_dir);

    if *slot.cancel.borrow() {
        return Err(WorkerError::Cancelled);
    }

    set_step(slot, logger, "Finalizing output");
    match file_size(partial).await {
        Some(size) if size > 0 => {}
        _ => return Err(WorkerError::engine_execution("engine produced no output")),
    }
    if !job.overwrite && tokio::fs::try_exists(&job.output_path).await.unwrap_or(false) {
        return Err(WorkerError::OutputExists(job.output_path.clone()));
    }
    move_file(partial, &job.output_path).await?;

    Ok(())
}

fn set_step(slot: &JobSlot, logger: &JobLogger, step: impl Into<String>) {
    let step = step.into();
    logger.log_progress(&step);
    slot.state.send_modify(|job| job.set_step(step));
}
