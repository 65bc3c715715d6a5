//! Soak mode: long-duration runs executed in checkpointed slices.
//!
//! The scenario duration is consumed slice by slice; after each slice the
//! frames are appended to the frame cache and a checkpoint is written
//! atomically. A stop file or interrupt pauses the run with a resumable
//! checkpoint; `--resume` continues from `completed_duration_ms`. On
//! completion the full bundle is produced from the cached frames. Paused
//! runs keep their partial bundle without `metrics.csv`/`summary.md`.

pub mod checkpoint;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::artifacts::hostprobe::write_hostprobe_json;
use crate::artifacts::html::{HtmlReportInput, write_html_report};
use crate::artifacts::manifest::write_bundle_manifest;
use crate::artifacts::metrics_writer::{write_metrics_csv, write_metrics_json};
use crate::artifacts::run_writer::write_run_json;
use crate::artifacts::summary::{RunSummaryInput, write_run_summary_markdown};
use crate::artifacts::zip::write_bundle_zip;
use crate::artifacts::{ensure_output_dir, write_text_artifact};
use crate::backends::CameraBackend;
use crate::core::errors::{LabOpsError, Result};
use crate::core::lock::ProcessLock;
use crate::core::time::to_epoch_millis;
use crate::events::{Event, EventLog, EventType};
use crate::metrics::fps::compute_fps_report;
use crate::run::contract::{RunConfig, RunInfo, RunTimestamps, generate_run_id};
use crate::run::interrupt::InterruptWatch;
use crate::run::{ROLLING_WINDOW_MS, RunOptions, RunOutcome, RunStatus, evaluate_thresholds};
use crate::scenario::load_scenario_file;
use crate::soak::checkpoint::{
    CheckpointState, CheckpointStatus, append_frame_cache, load_checkpoint, load_frame_cache,
    write_checkpoint_artifacts,
};

/// Default slice length between checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL_MS: u64 = 1000;

/// Soak-specific options layered on top of [`RunOptions`].
#[derive(Debug, Clone, Default)]
pub struct SoakOptions {
    pub checkpoint_interval_ms: Option<u64>,
    pub resume_checkpoint: Option<PathBuf>,
    pub stop_file: Option<PathBuf>,
}

/// Outcome of a soak execution.
#[derive(Debug)]
pub enum SoakOutcome {
    /// The full duration completed; a normal bundle was produced.
    Completed(RunOutcome),
    /// Paused via stop file or interrupt; resumable checkpoint on disk.
    Paused {
        checkpoint_path: PathBuf,
        bundle_dir: PathBuf,
        stop_reason: String,
    },
}

fn stop_file_present(stop_file: Option<&Path>) -> bool {
    stop_file.is_some_and(Path::exists)
}

/// Executes a scenario in soak mode.
pub fn execute_soak_run(options: &RunOptions, soak: &SoakOptions) -> Result<SoakOutcome> {
    let lock_path = options
        .lock_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(crate::core::lock::DEFAULT_LOCK_RELATIVE_PATH));
    let _lock = ProcessLock::acquire(&lock_path)?;

    let scenario = load_scenario_file(&options.scenario_path)?;
    let interrupt = options
        .interrupt
        .clone()
        .unwrap_or_else(InterruptWatch::new);
    let interval_ms = soak
        .checkpoint_interval_ms
        .unwrap_or(DEFAULT_CHECKPOINT_INTERVAL_MS)
        .max(1);

    // Fresh session or resume from a prior checkpoint.
    let mut state = match &soak.resume_checkpoint {
        Some(checkpoint_path) => {
            let loaded = load_checkpoint(checkpoint_path)?;
            if loaded.status == CheckpointStatus::Completed {
                return Err(LabOpsError::Usage {
                    details: format!(
                        "checkpoint {} is already completed; nothing to resume",
                        checkpoint_path.display()
                    ),
                });
            }
            loaded
        }
        None => {
            let created_at = Utc::now();
            let run_id = generate_run_id(created_at);
            let bundle_dir = if options.use_per_run_bundle_dir {
                options.output_dir.join(&run_id)
            } else {
                options.output_dir.clone()
            };
            CheckpointState {
                schema_version: "1.0".into(),
                mode: "soak".into(),
                status: CheckpointStatus::Running,
                stop_reason: String::new(),
                run_id,
                scenario_path: options.scenario_path.display().to_string(),
                bundle_dir: bundle_dir.display().to_string(),
                frame_cache_path: bundle_dir.join("frame_cache.jsonl").display().to_string(),
                total_duration_ms: scenario.duration_ms,
                completed_duration_ms: 0,
                remaining_duration_ms: scenario.duration_ms,
                checkpoints_written: 0,
                frames_total: 0,
                frames_received: 0,
                frames_dropped: 0,
                created_at_epoch_ms: to_epoch_millis(created_at),
                started_at_epoch_ms: to_epoch_millis(created_at),
                finished_at_epoch_ms: 0,
                updated_at_epoch_ms: to_epoch_millis(created_at),
                resume_hint: String::new(),
            }
        }
    };

    let bundle_dir = PathBuf::from(&state.bundle_dir);
    let frame_cache_path = PathBuf::from(&state.frame_cache_path);
    ensure_output_dir(&bundle_dir)?;

    let mut artifact_paths = Vec::new();
    let scenario_text = fs::read_to_string(&options.scenario_path)
        .map_err(|e| LabOpsError::io(&options.scenario_path, e))?;
    artifact_paths.push(write_text_artifact(&bundle_dir, "scenario.json", &scenario_text)?);
    artifact_paths.push(write_hostprobe_json(&bundle_dir)?);

    let mut events = EventLog::new();
    events.push(
        Event::new(Utc::now(), EventType::RunStarted)
            .with("run_id", state.run_id.clone())
            .with("scenario_id", scenario.scenario_id.clone())
            .with("mode", "soak")
            .with("resumed", soak.resume_checkpoint.is_some().to_string()),
    );

    let mut backend = CameraBackend::create(scenario.backend);
    backend.connect().map_err(|e| match e {
        err @ LabOpsError::BackendConnect { .. } => err,
        other => LabOpsError::BackendConnect {
            details: other.to_string(),
        },
    })?;
    // Soak reuses the flat sim-style knob application for every backend;
    // soak sessions target endurance, not parameter-bridge coverage.
    {
        let faults = scenario.sim_faults;
        for (key, value) in [
            ("fps", scenario.fps.to_string()),
            ("jitter_us", faults.jitter_us.to_string()),
            ("seed", faults.seed.to_string()),
            ("drop_every_n", faults.drop_every_n.to_string()),
            ("drop_percent", faults.drop_percent.to_string()),
            ("burst_drop", faults.burst_drop.to_string()),
            ("reorder", faults.reorder.to_string()),
        ] {
            backend.set_param(key, &value)?;
        }
    }
    backend.start()?;
    events.push(
        Event::new(Utc::now(), EventType::StreamStarted)
            .with("fps", scenario.fps.to_string())
            .with("remaining_ms", (state.total_duration_ms - state.completed_duration_ms).to_string()),
    );

    // Slice loop. The backend stop below must run on every exit path, so
    // loop errors are collected instead of early-returned.
    let mut pause_reason: Option<String> = None;
    let mut loop_error: Option<LabOpsError> = None;
    while state.completed_duration_ms < state.total_duration_ms {
        if interrupt.is_interrupted() {
            pause_reason = Some("signal_interrupt".into());
            break;
        }
        if stop_file_present(soak.stop_file.as_deref()) {
            pause_reason = Some("stop_file".into());
            break;
        }

        let remaining = state.total_duration_ms - state.completed_duration_ms;
        let slice_ms = interval_ms.min(remaining);
        let frames = match backend.pull_frames(slice_ms) {
            Ok(frames) => frames,
            Err(e) => {
                loop_error = Some(e);
                break;
            }
        };

        for frame in &frames {
            state.frames_total += 1;
            if frame.is_dropped() {
                state.frames_dropped += 1;
            } else {
                state.frames_received += 1;
            }
        }
        if let Err(e) = append_frame_cache(&frames, &frame_cache_path) {
            loop_error = Some(e);
            break;
        }

        state.completed_duration_ms += slice_ms;
        state.checkpoints_written += 1;
        state.updated_at_epoch_ms = to_epoch_millis(Utc::now());
        state.status = CheckpointStatus::Running;
        if let Err(e) = write_checkpoint_artifacts(&state) {
            loop_error = Some(e);
            break;
        }
    }

    if let Some(error) = loop_error {
        // Best-effort stop: the stream may already be gone on this path.
        let _ = backend.stop();
        return Err(error);
    }
    backend.stop()?;

    if let Some(reason) = pause_reason {
        state.status = CheckpointStatus::Paused;
        state.stop_reason = reason.clone();
        state.updated_at_epoch_ms = to_epoch_millis(Utc::now());
        let (checkpoint_path, _) = write_checkpoint_artifacts(&state)?;
        events.push(
            Event::new(Utc::now(), EventType::StreamStopped)
                .with("reason", reason.clone())
                .with("completed_ms", state.completed_duration_ms.to_string()),
        );
        // Paused bundles stay partial: no metrics.csv / summary.md.
        events.write_jsonl(&bundle_dir)?;
        return Ok(SoakOutcome::Paused {
            checkpoint_path,
            bundle_dir,
            stop_reason: state.stop_reason,
        });
    }

    // Completion: rebuild metrics from the whole cache and emit the full
    // bundle.
    let finished_at = Utc::now();
    state.status = CheckpointStatus::Completed;
    state.stop_reason = "completed".into();
    state.finished_at_epoch_ms = to_epoch_millis(finished_at);
    state.updated_at_epoch_ms = state.finished_at_epoch_ms;
    write_checkpoint_artifacts(&state)?;

    events.push(
        Event::new(finished_at, EventType::StreamStopped)
            .with("reason", "completed")
            .with("frames_total", state.frames_total.to_string()),
    );

    let frames = load_frame_cache(&frame_cache_path)?;
    let report = compute_fps_report(&frames, scenario.duration_ms, ROLLING_WINDOW_MS)?;
    let violations = evaluate_thresholds(&report, &scenario.thresholds);

    let run_info = RunInfo {
        run_id: state.run_id.clone(),
        config: RunConfig {
            scenario_id: scenario.scenario_id.clone(),
            backend: scenario.backend.as_str().to_string(),
            seed: scenario.seed(),
            duration_ms: scenario.duration_ms,
        },
        real_device: None,
        webcam_device: None,
        timestamps: RunTimestamps {
            created_at: crate::core::time::from_epoch_millis(state.created_at_epoch_ms),
            started_at: crate::core::time::from_epoch_millis(state.started_at_epoch_ms),
            finished_at,
        },
    };

    let run_json_path = write_run_json(&run_info, &bundle_dir)?;
    artifact_paths.push(run_json_path.clone());
    let metrics_csv_path = write_metrics_csv(&report, &bundle_dir)?;
    artifact_paths.push(metrics_csv_path.clone());
    let metrics_json_path = write_metrics_json(&report, &bundle_dir)?;
    artifact_paths.push(metrics_json_path.clone());
    let summary_path = write_run_summary_markdown(
        &RunSummaryInput {
            run_info: &run_info,
            report: &report,
            configured_fps: scenario.fps,
            thresholds_passed: violations.is_empty(),
            threshold_failures: &violations,
            top_anomalies: &[],
            netem_suggestions: None,
        },
        &bundle_dir,
    )?;
    artifact_paths.push(summary_path.clone());
    artifact_paths.push(write_html_report(
        &HtmlReportInput {
            run_info: &run_info,
            report: &report,
            thresholds_passed: violations.is_empty(),
            threshold_failures: &violations,
            top_anomalies: &[],
            metrics_diff: None,
        },
        &bundle_dir,
    )?);
    let events_jsonl_path = events.write_jsonl(&bundle_dir)?;
    artifact_paths.push(events_jsonl_path.clone());
    if frame_cache_path.is_file() {
        artifact_paths.push(frame_cache_path.clone());
    }
    let latest_checkpoint = bundle_dir.join("soak_checkpoint.json");
    if latest_checkpoint.is_file() {
        artifact_paths.push(latest_checkpoint);
    }
    write_bundle_manifest(&bundle_dir, &artifact_paths)?;
    if options.zip_bundle {
        write_bundle_zip(&bundle_dir, &artifact_paths)?;
    }

    let status = if violations.is_empty() {
        RunStatus::Passed
    } else {
        RunStatus::ThresholdsFailed { violations }
    };
    Ok(SoakOutcome::Completed(RunOutcome {
        run_id: state.run_id,
        bundle_dir,
        status,
        report,
        run_json_path,
        events_jsonl_path,
        metrics_csv_path,
        metrics_json_path,
        summary_path,
    }))
}
