//! End-to-end job tests against shell-script stand-ins for ffmpeg/ffprobe.
//!
//! Inputs are small shell files (`WIDTH=.. HEIGHT=.. DURATION=.. MODE=..`)
//! that the stand-ins source to decide what to report and how to behave.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;
use tokio_test::assert_ok;

use bezel_models::{
    Axis, BezelConfig, EncodingConfig, GeometryError, JobSnapshot, JobStatus, Orientation,
};
use bezel_worker::{JobExecutor, JobHandle, JobRequest, WorkerConfig, WorkerError};

const FAKE_FFPROBE: &str = r#"#!/bin/sh
for last; do :; done
. "$last"
if [ "$MODE" = "noprobe" ]; then
  echo "Invalid data found when processing input" >&2
  exit 1
fi
printf '{"streams":[{"codec_type":"video","codec_name":"h264","width":%s,"height":%s,"avg_frame_rate":"30/1"}],"format":{"duration":"%s"}}\n' "$WIDTH" "$HEIGHT" "$DURATION"
"#;

const FAKE_FFMPEG: &str = r#"#!/bin/sh
input=""
prev=""
for arg; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  prev="$arg"
done
out="$prev"
. "$input"
case "$MODE" in
  fail)
    echo "Conversion failed!" >&2
    exit 1
    ;;
  empty)
    : > "$out"
    printf 'progress=end\n'
    exit 0
    ;;
  slow)
    printf 'partial' > "$out"
    printf 'frame=30\nout_time_us=1000000\nprogress=continue\n'
    exec sleep 30
    ;;
esac
printf 'frame=60\nout_time_us=2000000\nprogress=continue\n'
printf 'frame=120\nout_time_us=4000000\nprogress=end\n'
if [ "$out" != "-" ]; then
  printf 'encoded' > "$out"
fi
exit 0
"#;

const WAIT_LIMIT: Duration = Duration::from_secs(15);

/// Stand-in binaries, written once per test binary before anything spawns.
fn engine() -> &'static (PathBuf, PathBuf) {
    static ENGINE: OnceLock<(PathBuf, PathBuf)> = OnceLock::new();
    ENGINE.get_or_init(|| {
        let dir = TempDir::new().unwrap().into_path();
        let ffmpeg = dir.join("ffmpeg");
        let ffprobe = dir.join("ffprobe");
        for (path, body) in [(&ffmpeg, FAKE_FFMPEG), (&ffprobe, FAKE_FFPROBE)] {
            std::fs::write(path, body).unwrap();
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        (ffmpeg, ffprobe)
    })
}

fn executor() -> JobExecutor {
    let (ffmpeg, ffprobe) = engine();
    JobExecutor::new(WorkerConfig::default().with_tools(ffmpeg, ffprobe)).unwrap()
}

fn write_input(dir: &Path, name: &str, width: u32, height: u32, mode: &str) -> PathBuf {
    write_input_lasting(dir, name, width, height, "4", mode)
}

/// Input whose probed duration is `duration` ("N/A" for none).
fn write_input_lasting(
    dir: &Path,
    name: &str,
    width: u32,
    height: u32,
    duration: &str,
    mode: &str,
) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(
        &path,
        format!("WIDTH={width}\nHEIGHT={height}\nDURATION={duration}\nMODE={mode}\n"),
    )
    .unwrap();
    path
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

async fn wait_terminal(executor: &JobExecutor, handle: &JobHandle) -> JobSnapshot {
    timeout(WAIT_LIMIT, executor.wait(handle))
        .await
        .expect("job did not finish in time")
        .unwrap()
}

/// Wait until the engine is running and has written its partial file.
async fn wait_until_encoding(executor: &JobExecutor, handle: &JobHandle, dir: &Path) {
    let mut updates = executor.subscribe(handle).await.unwrap();
    timeout(
        WAIT_LIMIT,
        updates.wait_for(|job| job.current_step.as_deref() == Some("Encoding")),
    )
    .await
    .unwrap()
    .unwrap();

    timeout(WAIT_LIMIT, async {
        while !file_names(dir).iter().any(|n| n.contains(".partial.")) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn wide_capture_succeeds_with_default_output_name() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "ok");
    let executor = executor();

    let handle = executor
        .submit_job(&input, BezelConfig::new(16, 21))
        .await
        .unwrap();

    let job = executor.subscribe(&handle).await.unwrap().borrow().clone();
    assert_eq!(job.plan.orientation, Orientation::Wide);
    assert_eq!((job.plan.output.width, job.plan.output.height), (8492, 3840));

    let snapshot = wait_terminal(&executor, &handle).await;
    assert_eq!(snapshot.status, JobStatus::Succeeded);
    assert_eq!(snapshot.progress_fraction, 1.0);
    assert!(snapshot.progress_exact);

    let expected = dir.path().join("wall_bezel_removed.mp4");
    assert_eq!(snapshot.output_path.as_deref(), Some(expected.as_path()));
    assert_eq!(std::fs::read_to_string(&expected).unwrap(), "encoded");
    assert_eq!(file_names(dir.path()), vec!["wall.mp4", "wall_bezel_removed.mp4"]);
}

#[tokio::test]
async fn tall_capture_succeeds() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "tower.mov", 3840, 8640, "ok");
    let output = dir.path().join("out").join("tower_fixed.mov");
    let executor = executor();

    let handle = executor
        .submit(JobRequest::new(&input, BezelConfig::new(16, 21)).with_output(&output))
        .await
        .unwrap();

    let job = executor.subscribe(&handle).await.unwrap().borrow().clone();
    assert_eq!(job.plan.orientation, Orientation::Tall);
    assert_eq!((job.plan.output.width, job.plan.output.height), (8492, 3840));

    let snapshot = wait_terminal(&executor, &handle).await;
    assert_eq!(snapshot.status, JobStatus::Succeeded);
    assert!(output.is_file());
}

#[tokio::test]
async fn progress_never_moves_backwards() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "ok");
    let executor = executor();

    let handle = executor
        .submit_job(&input, BezelConfig::default())
        .await
        .unwrap();
    let mut updates = executor.subscribe(&handle).await.unwrap();

    let first = updates.borrow_and_update().clone();
    let mut seen = vec![first.progress_fraction];
    if !first.is_terminal() {
        timeout(WAIT_LIMIT, async {
            while updates.changed().await.is_ok() {
                let job = updates.borrow_and_update().clone();
                seen.push(job.progress_fraction);
                if job.is_terminal() {
                    break;
                }
            }
        })
        .await
        .unwrap();
    }

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(seen.last().copied(), Some(1.0));
}

#[tokio::test]
async fn unknown_length_reports_inexact_progress() {
    let dir = TempDir::new().unwrap();
    let input = write_input_lasting(dir.path(), "live.mp4", 8640, 3840, "N/A", "ok");
    let executor = executor();

    let handle = executor
        .submit_job(&input, BezelConfig::default())
        .await
        .unwrap();
    let mut updates = executor.subscribe(&handle).await.unwrap();

    let mut seen = Vec::new();
    timeout(WAIT_LIMIT, async {
        loop {
            let job = updates.borrow_and_update().clone();
            seen.push((job.status, job.progress_fraction));
            if job.is_terminal() || updates.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .unwrap();

    let (last_status, last_fraction) = seen.pop().unwrap();
    assert_eq!(last_status, JobStatus::Succeeded);
    assert_eq!(last_fraction, 1.0);
    assert!(seen.iter().all(|(_, fraction)| *fraction == 0.0), "{seen:?}");

    let snapshot = wait_terminal(&executor, &handle).await;
    assert!(!snapshot.progress_exact);
    assert_eq!(snapshot.progress_fraction, 1.0);
}

#[tokio::test]
async fn two_pass_encode_cleans_up_pass_logs() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "ok");
    let executor = executor();

    let encoding = EncodingConfig::default()
        .with_target_size_mb(50.0)
        .with_two_pass();
    let handle = executor
        .submit(JobRequest::new(&input, BezelConfig::default()).with_encoding(encoding))
        .await
        .unwrap();

    let snapshot = wait_terminal(&executor, &handle).await;
    assert_eq!(snapshot.status, JobStatus::Succeeded);
    assert_eq!(file_names(dir.path()), vec!["wall.mp4", "wall_bezel_removed.mp4"]);
}

#[tokio::test]
async fn engine_failure_is_reported_and_partial_removed() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "fail");
    let executor = executor();

    let handle = executor
        .submit_job(&input, BezelConfig::default())
        .await
        .unwrap();
    let snapshot = wait_terminal(&executor, &handle).await;

    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.output_path, None);
    let message = snapshot.error_message.unwrap();
    assert!(message.contains("Encoding failed"), "{message}");
    assert!(message.contains("Conversion failed!"), "{message}");
    assert_eq!(file_names(dir.path()), vec!["wall.mp4"]);
}

#[tokio::test]
async fn empty_engine_output_fails() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "empty");
    let executor = executor();

    let handle = executor
        .submit_job(&input, BezelConfig::default())
        .await
        .unwrap();
    let snapshot = wait_terminal(&executor, &handle).await;

    assert_eq!(snapshot.status, JobStatus::Failed);
    assert!(snapshot
        .error_message
        .unwrap()
        .contains("engine produced no output"));
    assert_eq!(file_names(dir.path()), vec!["wall.mp4"]);
}

#[tokio::test]
async fn cancel_stops_engine_and_discards_partial() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "slow");
    let executor = executor();

    let handle = executor
        .submit_job(&input, BezelConfig::default())
        .await
        .unwrap();
    wait_until_encoding(&executor, &handle, dir.path()).await;

    assert_ok!(executor.cancel(&handle).await);
    let snapshot = wait_terminal(&executor, &handle).await;

    assert_eq!(snapshot.status, JobStatus::Cancelled);
    assert_eq!(snapshot.output_path, None);
    assert_eq!(file_names(dir.path()), vec!["wall.mp4"]);

    // Cancelling again is a no-op
    assert_ok!(executor.cancel(&handle).await);
    assert_eq!(
        executor.get_status(&handle).await.unwrap().status,
        JobStatus::Cancelled
    );
}

#[tokio::test]
async fn queued_job_is_cancelled_without_spawning() {
    let busy_dir = TempDir::new().unwrap();
    let queued_dir = TempDir::new().unwrap();
    let busy_input = write_input(busy_dir.path(), "busy.mp4", 8640, 3840, "slow");
    let queued_input = write_input(queued_dir.path(), "queued.mp4", 8640, 3840, "ok");
    let executor = executor();
    assert_eq!(executor.config().max_concurrent_jobs, 1);

    let busy = executor
        .submit_job(&busy_input, BezelConfig::default())
        .await
        .unwrap();
    wait_until_encoding(&executor, &busy, busy_dir.path()).await;

    let queued = executor
        .submit_job(&queued_input, BezelConfig::default())
        .await
        .unwrap();
    let mut updates = executor.subscribe(&queued).await.unwrap();
    timeout(
        WAIT_LIMIT,
        updates.wait_for(|job| job.current_step.as_deref() == Some("Waiting for engine slot")),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(
        executor.get_status(&queued).await.unwrap().status,
        JobStatus::Running
    );

    assert_ok!(executor.cancel(&queued).await);
    let snapshot = wait_terminal(&executor, &queued).await;
    assert_eq!(snapshot.status, JobStatus::Cancelled);
    assert_eq!(snapshot.output_path, None);
    assert_eq!(file_names(queued_dir.path()), vec!["queued.mp4"]);

    // The running job is untouched
    assert_eq!(
        executor.get_status(&busy).await.unwrap().status,
        JobStatus::Running
    );
    assert_ok!(executor.cancel(&busy).await);
    assert_eq!(
        wait_terminal(&executor, &busy).await.status,
        JobStatus::Cancelled
    );
}

#[tokio::test]
async fn pending_job_can_be_cancelled_and_not_restarted() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "ok");
    let executor = executor();

    let handle = executor
        .prepare(JobRequest::new(&input, BezelConfig::default()))
        .await
        .unwrap();
    assert_eq!(
        executor.get_status(&handle).await.unwrap().status,
        JobStatus::Pending
    );

    assert_ok!(executor.cancel(&handle).await);
    assert_eq!(
        executor.get_status(&handle).await.unwrap().status,
        JobStatus::Cancelled
    );
    assert!(matches!(
        executor.start(&handle).await,
        Err(WorkerError::AlreadyRunning(_))
    ));
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "ok");
    let executor = executor();

    let handle = executor
        .prepare(JobRequest::new(&input, BezelConfig::default()))
        .await
        .unwrap();
    assert_ok!(executor.start(&handle).await);
    assert!(matches!(
        executor.start(&handle).await,
        Err(WorkerError::AlreadyRunning(_))
    ));

    let snapshot = wait_terminal(&executor, &handle).await;
    assert_eq!(snapshot.status, JobStatus::Succeeded);
}

#[tokio::test]
async fn existing_output_requires_overwrite() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "ok");
    let output = dir.path().join("wall_bezel_removed.mp4");
    std::fs::write(&output, "previous").unwrap();
    let executor = executor();

    let err = executor
        .submit_job(&input, BezelConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::OutputExists(ref p) if *p == output));
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "previous");

    let handle = executor
        .submit(JobRequest::new(&input, BezelConfig::default()).with_overwrite(true))
        .await
        .unwrap();
    let snapshot = wait_terminal(&executor, &handle).await;
    assert_eq!(snapshot.status, JobStatus::Succeeded);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "encoded");
}

#[tokio::test]
async fn concurrent_jobs_cannot_share_an_output() {
    let dir = TempDir::new().unwrap();
    let slow = write_input(dir.path(), "slow.mp4", 8640, 3840, "slow");
    let quick = write_input(dir.path(), "quick.mp4", 8640, 3840, "ok");
    let output = dir.path().join("shared.mp4");
    let executor = executor();

    let first = executor
        .submit(JobRequest::new(&slow, BezelConfig::default()).with_output(&output))
        .await
        .unwrap();

    let second_request = JobRequest::new(&quick, BezelConfig::default()).with_output(&output);
    let err = executor.submit(second_request.clone()).await.unwrap_err();
    assert!(matches!(err, WorkerError::AlreadyRunning(_)), "{err:?}");

    assert_ok!(executor.cancel(&first).await);
    assert_eq!(
        wait_terminal(&executor, &first).await.status,
        JobStatus::Cancelled
    );

    // The reservation ends with the first job
    let second = executor.submit(second_request).await.unwrap();
    assert_eq!(
        wait_terminal(&executor, &second).await.status,
        JobStatus::Succeeded
    );
}

#[tokio::test]
async fn output_is_free_only_once_the_holder_is_terminal() {
    let dir = TempDir::new().unwrap();
    let slow = write_input(dir.path(), "slow.mp4", 8640, 3840, "slow");
    let quick = write_input(dir.path(), "quick.mp4", 8640, 3840, "ok");
    let output = dir.path().join("shared.mp4");
    let executor = executor();

    let first = executor
        .submit(JobRequest::new(&slow, BezelConfig::default()).with_output(&output))
        .await
        .unwrap();
    wait_until_encoding(&executor, &first, dir.path()).await;
    assert_ok!(executor.cancel(&first).await);

    // Keep retrying while the first job winds down; the first accepted
    // submission must never overlap a RUNNING holder.
    let second = timeout(WAIT_LIMIT, async {
        loop {
            let request = JobRequest::new(&quick, BezelConfig::default()).with_output(&output);
            match executor.submit(request).await {
                Ok(handle) => {
                    let holder = executor.get_status(&first).await.unwrap();
                    assert!(holder.status.is_terminal(), "{:?}", holder.status);
                    break handle;
                }
                Err(WorkerError::AlreadyRunning(_)) => tokio::task::yield_now().await,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(
        wait_terminal(&executor, &second).await.status,
        JobStatus::Succeeded
    );
}

#[tokio::test]
async fn unreadable_input_is_a_probe_error() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "broken.mp4", 8640, 3840, "noprobe");

    let err = executor()
        .submit_job(&input, BezelConfig::default())
        .await
        .unwrap_err();
    match err {
        WorkerError::Probe(message) => {
            assert!(message.contains("Invalid data found"), "{message}")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn indivisible_frame_is_rejected_before_encoding() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "odd.mp4", 8642, 3840, "ok");

    let err = executor()
        .submit_job(&input, BezelConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::InvalidGeometry(_)));
    assert_eq!(file_names(dir.path()), vec!["odd.mp4"]);
}

#[tokio::test]
async fn frame_with_indivisible_height_is_rejected_at_submit() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "odd.mp4", 8640, 3841, "ok");

    let err = executor()
        .submit_job(&input, BezelConfig::default())
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            WorkerError::InvalidGeometry(GeometryError::NotDivisible {
                axis: Axis::Height,
                value: 3841,
                ..
            })
        ),
        "{err:?}"
    );
    assert_eq!(file_names(dir.path()), vec!["odd.mp4"]);
}

#[tokio::test]
async fn oversized_bezels_are_rejected() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "ok");

    let err = executor()
        .submit_job(&input, BezelConfig::new(2000, 160))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::InvalidGeometry(_)));
}

#[tokio::test]
async fn missing_engine_is_reported() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "ok");
    let config = WorkerConfig::default().with_tools(
        dir.path().join("no-ffmpeg"),
        dir.path().join("no-ffprobe"),
    );
    let executor = JobExecutor::new(config).unwrap();

    let err = executor
        .submit_job(&input, BezelConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::EngineUnavailable(_)), "{err:?}");
}

#[tokio::test]
async fn release_only_forgets_finished_jobs() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "slow");
    let executor = executor();

    let handle = executor
        .submit_job(&input, BezelConfig::default())
        .await
        .unwrap();
    assert!(matches!(
        executor.release(&handle).await,
        Err(WorkerError::AlreadyRunning(_))
    ));

    assert_ok!(executor.cancel(&handle).await);
    wait_terminal(&executor, &handle).await;

    assert_ok!(executor.release(&handle).await);
    assert!(matches!(
        executor.get_status(&handle).await,
        Err(WorkerError::JobNotFound(_))
    ));
}

#[test]
fn cli_keeps_json_logs_off_stdout() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "wall.mp4", 8640, 3840, "ok");
    let (ffmpeg, ffprobe) = engine();

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_bezel-remover"))
        .arg(&input)
        .args(["--top", "16", "--bottom", "21"])
        .arg("--ffmpeg")
        .arg(ffmpeg)
        .arg("--ffprobe")
        .arg(ffprobe)
        .current_dir(dir.path())
        .env("LOG_FORMAT", "json")
        .env("RUST_LOG", "bezel=info")
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("Saved"), "{stdout}");
    assert!(
        !stdout.lines().any(|line| line.trim_start().starts_with('{')),
        "{stdout}"
    );
    assert!(
        stderr
            .lines()
            .any(|line| line.starts_with('{') && line.contains("Prepared job")),
        "{stderr}"
    );
    assert!(dir.path().join("wall_bezel_removed.mp4").is_file());
}
