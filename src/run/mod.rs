//! Scenario run pipeline: lock → backend session → apply → acquire →
//! metrics → thresholds → artifacts.
//!
//! This module is the single place a scenario turns into a bundle. The
//! orchestrator and CLI both call [`execute_scenario_run`]; soak mode reuses
//! the same apply/artifact helpers with its own checkpointed loop.

#![allow(missing_docs)]

pub mod contract;
pub mod interrupt;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::artifacts::camera_config::{
    write_camera_config_json, write_config_report_markdown, write_config_verify_json,
};
use crate::artifacts::hostprobe::write_hostprobe_json;
use crate::artifacts::html::{HtmlReportInput, write_html_report};
use crate::artifacts::manifest::write_bundle_manifest;
use crate::artifacts::metrics_writer::{write_metrics_csv, write_metrics_json};
use crate::artifacts::run_writer::write_run_json;
use crate::artifacts::summary::{NetemCommandSuggestions, RunSummaryInput, write_run_summary_markdown};
use crate::artifacts::zip::write_bundle_zip;
use crate::artifacts::{ensure_output_dir, format_fixed, write_text_artifact};
use crate::backends::real_sdk::apply_params::{ApplyReport, apply_params};
use crate::backends::real_sdk::node_map::{NodeMap, default_node_map};
use crate::backends::real_sdk::param_key_map::{ParamKeyMap, resolve_default_param_key_map_path};
use crate::backends::real_sdk::transport_counters::collect_transport_counters;
use crate::backends::{CameraBackend, FrameSample};
use crate::core::errors::{LabOpsError, Result};
use crate::core::lock::ProcessLock;
use crate::events::transport_anomaly::detect_transport_anomalies;
use crate::events::{Event, EventLog, EventType};
use crate::metrics::fps::{FpsReport, compute_fps_report};
use crate::run::contract::{
    RealDeviceMetadata, RunConfig, RunInfo, RunTimestamps, TransportCountersDoc,
    WebcamDeviceMetadata, generate_run_id,
};
use crate::run::interrupt::InterruptWatch;
use crate::scenario::{BackendKind, ParamRequest, ScenarioConfig, Thresholds, load_scenario_file};

/// Rolling FPS window used for every run.
pub const ROLLING_WINDOW_MS: u64 = 1000;

/// Reconnect attempts allowed after a mid-run device disconnect.
pub const RECONNECT_RETRY_LIMIT: u32 = 3;

/// Options for one scenario run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub scenario_path: PathBuf,
    pub output_dir: PathBuf,
    /// When true the bundle lands in `<output_dir>/<run_id>/`; baselines
    /// use a stable scenario-scoped directory instead.
    pub use_per_run_bundle_dir: bool,
    pub zip_bundle: bool,
    pub sdk_log: bool,
    pub netem_interface: Option<String>,
    /// Lock file override; defaults to `tmp/labops.lock` under the working
    /// directory.
    pub lock_path: Option<PathBuf>,
    /// Interrupt source; defaults to a freshly registered signal watch.
    pub interrupt: Option<InterruptWatch>,
}

impl RunOptions {
    #[must_use]
    pub fn new(scenario_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            scenario_path: scenario_path.into(),
            output_dir: output_dir.into(),
            use_per_run_bundle_dir: true,
            zip_bundle: false,
            sdk_log: false,
            netem_interface: None,
            lock_path: None,
            interrupt: None,
        }
    }
}

/// Pass/fail status of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Passed,
    ThresholdsFailed { violations: Vec<String> },
}

impl RunStatus {
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Everything a caller needs to chain further steps onto a finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub bundle_dir: PathBuf,
    pub status: RunStatus,
    pub report: FpsReport,
    pub run_json_path: PathBuf,
    pub events_jsonl_path: PathBuf,
    pub metrics_csv_path: PathBuf,
    pub metrics_json_path: PathBuf,
    pub summary_path: PathBuf,
}

/// Evaluates configured thresholds over a report. Returns human-readable
/// violation lines; empty means pass.
#[must_use]
pub fn evaluate_thresholds(report: &FpsReport, thresholds: &Thresholds) -> Vec<String> {
    let mut violations = Vec::new();
    if let Some(min_avg_fps) = thresholds.min_avg_fps {
        if report.avg_fps < min_avg_fps {
            violations.push(format!(
                "avg_fps {} below min_avg_fps {}",
                format_fixed(report.avg_fps, 3),
                format_fixed(min_avg_fps, 3)
            ));
        }
    }
    if let Some(max_drop_rate) = thresholds.max_drop_rate_percent {
        if report.drop_rate_percent > max_drop_rate {
            violations.push(format!(
                "drop_rate_percent {} above max_drop_rate_percent {}",
                format_fixed(report.drop_rate_percent, 3),
                format_fixed(max_drop_rate, 3)
            ));
        }
    }
    violations
}

/// Builds the manual netem command block for a scenario's fault profile.
#[must_use]
pub fn build_netem_suggestions(scenario: &ScenarioConfig, interface: &str) -> NetemCommandSuggestions {
    let faults = scenario.sim_faults;
    let mut impairments = Vec::new();
    if faults.jitter_us > 0 {
        impairments.push(format!("delay {}us", faults.jitter_us));
    }
    if faults.drop_percent > 0 {
        impairments.push(format!("loss {}%", faults.drop_percent));
    }
    if faults.reorder > 0 {
        impairments.push(format!("reorder {}%", faults.reorder.min(100)));
    }
    if impairments.is_empty() {
        impairments.push("delay 0us".into());
    }
    NetemCommandSuggestions {
        profile_id: format!("{}-impairment", scenario.scenario_id),
        interface: interface.to_string(),
        apply_command: format!(
            "sudo tc qdisc add dev {interface} root netem {}",
            impairments.join(" ")
        ),
        show_command: format!("tc qdisc show dev {interface}"),
        teardown_command: format!("sudo tc qdisc del dev {interface} root"),
        safety_note: "apply only on an isolated lab interface; labops never runs these itself"
            .into(),
    }
}

fn push_frame_events(events: &mut EventLog, frames: &[FrameSample]) {
    use crate::backends::real_sdk::acquisition::classify_frame_event;
    for frame in frames {
        events.push(
            Event::new(frame.timestamp, classify_frame_event(frame))
                .with("frame_id", frame.frame_id.to_string())
                .with("size_bytes", frame.size_bytes.to_string()),
        );
    }
}

fn apply_sim_style_config(
    backend: &mut CameraBackend,
    scenario: &ScenarioConfig,
    events: &mut EventLog,
) -> Result<()> {
    let faults = scenario.sim_faults;
    let mut params: Vec<(&str, String)> = vec![
        ("fps", scenario.fps.to_string()),
        ("jitter_us", faults.jitter_us.to_string()),
        ("seed", faults.seed.to_string()),
        ("drop_every_n", faults.drop_every_n.to_string()),
        ("drop_percent", faults.drop_percent.to_string()),
        ("burst_drop", faults.burst_drop.to_string()),
        ("reorder", faults.reorder.to_string()),
    ];
    if let Some(pixel_format) = &scenario.pixel_format {
        params.push(("pixel_format", pixel_format.clone()));
    }
    if let Some(trigger_mode) = &scenario.trigger_mode {
        params.push(("trigger_mode", trigger_mode.clone()));
    }
    for (key, value) in params {
        backend.set_param(key, &value)?;
        events.push(
            Event::new(Utc::now(), EventType::ConfigApplied)
                .with("key", key)
                .with("value", value),
        );
    }
    Ok(())
}

fn apply_real_config(
    backend: &mut CameraBackend,
    scenario: &ScenarioConfig,
    key_map: &ParamKeyMap,
    node_map: &mut NodeMap,
    events: &mut EventLog,
) -> Result<ApplyReport> {
    backend.set_param("AcquisitionFrameRate", &scenario.fps.to_string())?;
    backend.set_param("FrameSeed", &scenario.seed().to_string())?;
    events.push(
        Event::new(Utc::now(), EventType::ConfigApplied)
            .with("key", "AcquisitionFrameRate")
            .with("value", scenario.fps.to_string()),
    );

    // Camera-section settings route through the same symbolic bridge as
    // explicit params so they get coercion and readback evidence too.
    let mut requests: Vec<ParamRequest> = Vec::new();
    if let Some(pixel_format) = &scenario.pixel_format {
        requests.push(ParamRequest {
            key: "pixel_format".into(),
            value: pixel_format.clone(),
        });
    }
    if let Some(trigger_mode) = &scenario.trigger_mode {
        requests.push(ParamRequest {
            key: "trigger_mode".into(),
            value: trigger_mode.clone(),
        });
    }
    requests.extend(scenario.params.iter().cloned());

    let report = apply_params(backend, key_map, node_map, &requests, scenario.apply_mode);
    for row in &report.readback_rows {
        let (kind, reason_key) = if !row.supported || !row.applied {
            (EventType::ConfigUnsupported, "reason")
        } else if row.adjusted {
            (EventType::ConfigAdjusted, "reason")
        } else {
            (EventType::ConfigApplied, "reason")
        };
        let mut event = Event::new(Utc::now(), kind).with("key", row.generic_key.clone());
        if let Some(node_name) = &row.node_name {
            event = event.with("node", node_name.clone());
        }
        event = event.with("requested", row.requested_value.clone());
        if let Some(actual) = &row.actual_value {
            event = event.with("actual", actual.clone());
        }
        if let Some(reason) = &row.reason {
            event = event.with(reason_key, reason.clone());
        }
        events.push(event);
    }
    Ok(report)
}

struct BundleContext {
    bundle_dir: PathBuf,
    artifact_paths: Vec<PathBuf>,
}

impl BundleContext {
    fn track(&mut self, path: PathBuf) -> PathBuf {
        self.artifact_paths.push(path.clone());
        path
    }
}

fn flush_failure_bundle(
    ctx: &mut BundleContext,
    run_info: &RunInfo,
    events: &EventLog,
) -> Result<()> {
    let bundle_dir = ctx.bundle_dir.clone();
    ctx.track(write_run_json(run_info, &bundle_dir)?);
    ctx.track(events.write_jsonl(&bundle_dir)?);
    Ok(())
}

/// Executes one scenario run end to end.
///
/// Threshold failure is a normal completion (`RunStatus::ThresholdsFailed`
/// with a full bundle); errors are reserved for runs that could not
/// complete. Even most error paths flush a partial bundle first so the
/// triage trail is never empty.
pub fn execute_scenario_run(options: &RunOptions) -> Result<RunOutcome> {
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

    let created_at = Utc::now();
    let run_id = generate_run_id(created_at);
    let bundle_dir = if options.use_per_run_bundle_dir {
        options.output_dir.join(&run_id)
    } else {
        options.output_dir.clone()
    };
    ensure_output_dir(&bundle_dir)?;

    let mut ctx = BundleContext {
        bundle_dir: bundle_dir.clone(),
        artifact_paths: Vec::new(),
    };

    // Scenario copy + host probe first: they are the minimum triage trail.
    let scenario_bytes =
        fs::read_to_string(&options.scenario_path).map_err(|e| LabOpsError::io(&options.scenario_path, e))?;
    ctx.track(write_text_artifact(&bundle_dir, "scenario.json", &scenario_bytes)?);
    ctx.track(write_hostprobe_json(&bundle_dir)?);

    let mut events = EventLog::new();
    events.push(
        Event::new(created_at, EventType::RunStarted)
            .with("run_id", run_id.clone())
            .with("scenario_id", scenario.scenario_id.clone())
            .with("backend", scenario.backend.as_str())
            .with("seed", scenario.seed().to_string()),
    );

    let mut backend = CameraBackend::create(scenario.backend);
    let started_at = Utc::now();
    let mut run_info = RunInfo {
        run_id: run_id.clone(),
        config: RunConfig {
            scenario_id: scenario.scenario_id.clone(),
            backend: scenario.backend.as_str().to_string(),
            seed: scenario.seed(),
            duration_ms: scenario.duration_ms,
        },
        real_device: None,
        webcam_device: None,
        timestamps: RunTimestamps {
            created_at,
            started_at,
            finished_at: started_at,
        },
    };

    if let Err(connect_error) = backend.connect() {
        let details = connect_error.to_string();
        events.push(Event::new(Utc::now(), EventType::Error).with("details", details.clone()));
        run_info.timestamps.finished_at = Utc::now();
        flush_failure_bundle(&mut ctx, &run_info, &events)?;
        return Err(match connect_error {
            err @ LabOpsError::BackendConnect { .. } => err,
            other => LabOpsError::BackendConnect {
                details: other.to_string(),
            },
        });
    }

    // Apply phase. Real backends route through the key map + node map; sim
    // and webcam take the flat fault knobs directly.
    let mut apply_evidence: Option<(ParamKeyMap, ApplyReport)> = None;
    if scenario.backend == BackendKind::Real {
        let key_map_path = resolve_default_param_key_map_path();
        let key_map = ParamKeyMap::from_file(&key_map_path)?;
        let mut node_map = default_node_map();
        let report = apply_real_config(&mut backend, &scenario, &key_map, &mut node_map, &mut events)?;
        if let Some(failure) = &report.failure {
            let error = failure.to_error();
            events.push(
                Event::new(Utc::now(), EventType::Error).with("details", error.to_string()),
            );
            run_info.timestamps.finished_at = Utc::now();
            flush_failure_bundle(&mut ctx, &run_info, &events)?;
            return Err(error);
        }
        apply_evidence = Some((key_map, report));
    } else {
        apply_sim_style_config(&mut backend, &scenario, &mut events)?;
    }

    backend.start()?;
    events.push(
        Event::new(Utc::now(), EventType::StreamStarted)
            .with("fps", scenario.fps.to_string())
            .with("duration_ms", scenario.duration_ms.to_string()),
    );

    if interrupt.is_interrupted() {
        let _ = backend.stop();
        events.push(
            Event::new(Utc::now(), EventType::StreamStopped).with("reason", "signal_interrupt"),
        );
        run_info.timestamps.finished_at = Utc::now();
        return finalize_partial_bundle(&mut ctx, &scenario, &run_info, &events, options, &[], &[])
            .and(Err(LabOpsError::Interrupted));
    }

    // Acquire phase, with the bounded reconnect policy for mid-run device
    // loss on the real path.
    let frames = match backend.pull_frames(scenario.duration_ms) {
        Ok(frames) => frames,
        Err(LabOpsError::DeviceDisconnect { .. }) => {
            events.push(
                Event::new(Utc::now(), EventType::DeviceDisconnected)
                    .with("phase", "pull_frames"),
            );
            let mut attempts_used: u32 = 0;
            let mut reconnected = false;
            while attempts_used < RECONNECT_RETRY_LIMIT {
                attempts_used += 1;
                if backend.connect().is_ok() {
                    reconnected = true;
                    break;
                }
            }
            if reconnected {
                match backend.start().and_then(|()| backend.pull_frames(scenario.duration_ms)) {
                    Ok(frames) => frames,
                    Err(resume_error) => {
                        let _ = backend.stop();
                        events.push(
                            Event::new(Utc::now(), EventType::Error)
                                .with("details", resume_error.to_string()),
                        );
                        run_info.timestamps.finished_at = Utc::now();
                        flush_failure_bundle(&mut ctx, &run_info, &events)?;
                        return Err(resume_error);
                    }
                }
            } else {
                let _ = backend.stop();
                events.push(
                    Event::new(Utc::now(), EventType::StreamStopped)
                        .with("reason", "device_disconnect")
                        .with("reconnect_retry_limit", RECONNECT_RETRY_LIMIT.to_string())
                        .with("reconnect_attempts_used_total", attempts_used.to_string()),
                );
                run_info.timestamps.finished_at = Utc::now();
                // The bundle stays complete: metrics over whatever frames
                // made it across before the device vanished (a failed pull
                // surrenders none at this layer).
                let captured_frames: Vec<FrameSample> = Vec::new();
                let anomalies = vec![format!(
                    "Stream ended early: device disconnected mid-run and reconnect attempts were exhausted (reconnect_attempts_used_total={attempts_used}, reconnect_retry_limit={RECONNECT_RETRY_LIMIT})."
                )];
                finalize_partial_bundle(
                    &mut ctx,
                    &scenario,
                    &run_info,
                    &events,
                    options,
                    &captured_frames,
                    &anomalies,
                )?;
                return Err(LabOpsError::DeviceDisconnect {
                    attempts_used,
                    retry_limit: RECONNECT_RETRY_LIMIT,
                });
            }
        }
        Err(other) => {
            let _ = backend.stop();
            events.push(
                Event::new(Utc::now(), EventType::Error).with("details", other.to_string()),
            );
            run_info.timestamps.finished_at = Utc::now();
            flush_failure_bundle(&mut ctx, &run_info, &events)?;
            return Err(other);
        }
    };

    push_frame_events(&mut events, &frames);
    backend.stop()?;
    let interrupted = interrupt.is_interrupted();
    events.push(
        Event::new(Utc::now(), EventType::StreamStopped)
            .with(
                "reason",
                if interrupted { "signal_interrupt" } else { "completed" },
            )
            .with("frames_total", frames.len().to_string()),
    );

    let report = compute_fps_report(&frames, scenario.duration_ms, ROLLING_WINDOW_MS)?;
    let violations = evaluate_thresholds(&report, &scenario.thresholds);

    // Device metadata + transport anomalies.
    let backend_dump = backend.dump_config();
    let mut top_anomalies = Vec::new();
    match &backend {
        CameraBackend::Real(real) => {
            let counters = collect_transport_counters(&backend_dump);
            for finding in detect_transport_anomalies(&counters) {
                events.push(
                    Event::new(Utc::now(), EventType::TransportAnomaly)
                        .with("heuristic_id", finding.heuristic_id.clone())
                        .with("counter", finding.counter_name.clone())
                        .with("observed", finding.observed_value.to_string())
                        .with("threshold", finding.threshold.to_string()),
                );
                top_anomalies.push(finding.summary);
            }
            let identity = real.identity();
            run_info.real_device = Some(RealDeviceMetadata {
                model: identity.model.clone(),
                serial: identity.serial.clone(),
                transport: identity.transport.clone(),
                user_id: None,
                firmware_version: identity.firmware_version.clone(),
                sdk_version: identity.sdk_version.clone(),
                transport_counters: TransportCountersDoc(counters),
            });
        }
        CameraBackend::Webcam(webcam) => {
            if let Some(device) = webcam.selected_device() {
                run_info.webcam_device = Some(WebcamDeviceMetadata {
                    device_id: device.device_id.clone(),
                    friendly_name: device.friendly_name.clone(),
                    bus_info: device.bus_info.clone(),
                    selection_rule: Some("first_discovered".into()),
                });
            }
        }
        CameraBackend::Sim(_) | CameraBackend::SdkStub(_) => {}
    }

    run_info.timestamps.finished_at = Utc::now();

    // Artifact phase.
    let run_json_path = ctx.track(write_run_json(&run_info, &bundle_dir)?);
    let metrics_csv_path = ctx.track(write_metrics_csv(&report, &bundle_dir)?);
    let metrics_json_path = ctx.track(write_metrics_json(&report, &bundle_dir)?);

    let netem = options
        .netem_interface
        .as_deref()
        .map(|iface| build_netem_suggestions(&scenario, iface));
    let summary_path = ctx.track(write_run_summary_markdown(
        &RunSummaryInput {
            run_info: &run_info,
            report: &report,
            configured_fps: scenario.fps,
            thresholds_passed: violations.is_empty(),
            threshold_failures: &violations,
            top_anomalies: &top_anomalies,
            netem_suggestions: netem.as_ref(),
        },
        &bundle_dir,
    )?);
    ctx.track(write_html_report(
        &HtmlReportInput {
            run_info: &run_info,
            report: &report,
            thresholds_passed: violations.is_empty(),
            threshold_failures: &violations,
            top_anomalies: &top_anomalies,
            metrics_diff: None,
        },
        &bundle_dir,
    )?);

    if let Some((key_map, apply_report)) = &apply_evidence {
        ctx.track(write_camera_config_json(
            &run_info,
            key_map,
            apply_report,
            &backend_dump,
            &bundle_dir,
        )?);
        ctx.track(write_config_report_markdown(
            &run_info,
            key_map,
            apply_report,
            &bundle_dir,
        )?);
        ctx.track(write_config_verify_json(
            &run_info,
            apply_report,
            scenario.apply_mode,
            &bundle_dir,
        )?);
    }
    if options.sdk_log {
        if let CameraBackend::Real(real) = &backend {
            let mut log_body = real.sdk_log_lines().join("\n");
            log_body.push('\n');
            ctx.track(write_text_artifact(&bundle_dir, "sdk_log.txt", &log_body)?);
        }
    }

    let events_jsonl_path = ctx.track(events.write_jsonl(&bundle_dir)?);
    write_bundle_manifest(&bundle_dir, &ctx.artifact_paths)?;
    if options.zip_bundle {
        write_bundle_zip(&bundle_dir, &ctx.artifact_paths)?;
    }

    if interrupted {
        return Err(LabOpsError::Interrupted);
    }

    let status = if violations.is_empty() {
        RunStatus::Passed
    } else {
        RunStatus::ThresholdsFailed { violations }
    };
    Ok(RunOutcome {
        run_id,
        bundle_dir,
        status,
        report,
        run_json_path,
        events_jsonl_path,
        metrics_csv_path,
        metrics_json_path,
        summary_path,
    })
}

// A run cut short (interrupt, reconnect exhaustion) still flushes every
// required artifact, with metrics computed over whatever frames were
// captured before the cut, so the bundle stays structurally complete.
fn finalize_partial_bundle(
    ctx: &mut BundleContext,
    scenario: &ScenarioConfig,
    run_info: &RunInfo,
    events: &EventLog,
    options: &RunOptions,
    frames: &[FrameSample],
    top_anomalies: &[String],
) -> Result<()> {
    let bundle_dir = ctx.bundle_dir.clone();
    let report = compute_fps_report(frames, scenario.duration_ms, ROLLING_WINDOW_MS)?;
    let violations = evaluate_thresholds(&report, &scenario.thresholds);

    ctx.track(write_run_json(run_info, &bundle_dir)?);
    ctx.track(write_metrics_csv(&report, &bundle_dir)?);
    ctx.track(write_metrics_json(&report, &bundle_dir)?);
    ctx.track(write_run_summary_markdown(
        &RunSummaryInput {
            run_info,
            report: &report,
            configured_fps: scenario.fps,
            thresholds_passed: violations.is_empty(),
            threshold_failures: &violations,
            top_anomalies,
            netem_suggestions: None,
        },
        &bundle_dir,
    )?);
    ctx.track(write_html_report(
        &HtmlReportInput {
            run_info,
            report: &report,
            thresholds_passed: violations.is_empty(),
            threshold_failures: &violations,
            top_anomalies,
            metrics_diff: None,
        },
        &bundle_dir,
    )?);
    ctx.track(events.write_jsonl(&bundle_dir)?);
    write_bundle_manifest(&bundle_dir, &ctx.artifact_paths)?;
    if options.zip_bundle {
        write_bundle_zip(&bundle_dir, &ctx.artifact_paths)?;
    }
    Ok(())
}
