//! Soak checkpoint store: durable progress records plus the frame cache.
//!
//! Checkpoint writes are atomic with respect to interrupt: the document is
//! written to a sibling temp file and renamed over the previous checkpoint,
//! so a kill mid-write leaves the prior bytes intact. The
//! `LABOPS_SOAK_TEST_INTERRUPT_CHECKPOINT_WRITE` fixture aborts between the
//! temp write and the rename to prove that property in tests.

#![allow(missing_docs)]

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backends::{FrameOutcome, FrameSample};
use crate::core::errors::{LabOpsError, Result};
use crate::core::time::{from_epoch_micros, to_epoch_micros};

/// Truthy env var simulating an interrupted checkpoint write.
pub const INTERRUPT_CHECKPOINT_WRITE_ENV: &str = "LABOPS_SOAK_TEST_INTERRUPT_CHECKPOINT_WRITE";

/// Lifecycle of a soak run as recorded in its checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Running,
    Paused,
    Completed,
}

impl CheckpointStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

/// Soak checkpoint document (schema v1.0).
///
/// Contract: `completed_duration_ms <= total_duration_ms` and
/// `remaining_duration_ms = total_duration_ms - completed_duration_ms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointState {
    pub schema_version: String,
    pub mode: String,
    pub status: CheckpointStatus,
    pub stop_reason: String,
    pub run_id: String,
    pub scenario_path: String,
    pub bundle_dir: String,
    pub frame_cache_path: String,
    pub total_duration_ms: u64,
    pub completed_duration_ms: u64,
    pub remaining_duration_ms: u64,
    pub checkpoints_written: u64,
    pub frames_total: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub created_at_epoch_ms: i64,
    pub started_at_epoch_ms: i64,
    pub finished_at_epoch_ms: i64,
    pub updated_at_epoch_ms: i64,
    pub resume_hint: String,
}

impl CheckpointState {
    /// Normalizes the derived fields before serialization.
    pub fn normalize(&mut self) {
        self.schema_version = "1.0".into();
        self.mode = "soak".into();
        self.completed_duration_ms = self.completed_duration_ms.min(self.total_duration_ms);
        self.remaining_duration_ms = self.total_duration_ms - self.completed_duration_ms;
        self.resume_hint = format!(
            "labops run {} --soak --resume {}",
            self.scenario_path,
            Path::new(&self.bundle_dir)
                .join("soak_checkpoint.json")
                .display()
        );
    }
}

fn interrupt_fixture_active() -> bool {
    env::var(INTERRUPT_CHECKPOINT_WRITE_ENV)
        .map(|v| {
            let v = v.trim().to_ascii_lowercase();
            !v.is_empty() && v != "0" && v != "false"
        })
        .unwrap_or(false)
}

/// Writes one checkpoint document atomically to `output_path`.
pub fn write_checkpoint_json(state: &CheckpointState, output_path: &Path) -> Result<()> {
    if state.run_id.is_empty() {
        return Err(LabOpsError::Runtime {
            details: "soak checkpoint run_id cannot be empty".into(),
        });
    }
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(|e| LabOpsError::io(parent, e))?;
    }

    let mut normalized = state.clone();
    normalized.normalize();
    let mut body =
        serde_json::to_string_pretty(&normalized).map_err(|e| LabOpsError::Serialization {
            context: "soak checkpoint",
            details: e.to_string(),
        })?;
    body.push('\n');

    let temp_path = output_path.with_extension("json.tmp");
    if interrupt_fixture_active() {
        // Simulated interruption: a torn temp file, no rename. The previous
        // checkpoint bytes must remain untouched.
        let torn = &body[..body.len() / 2];
        fs::write(&temp_path, torn).map_err(|e| LabOpsError::io(&temp_path, e))?;
        return Err(LabOpsError::Runtime {
            details: "simulated interrupt during checkpoint write".into(),
        });
    }

    fs::write(&temp_path, &body).map_err(|e| LabOpsError::io(&temp_path, e))?;
    fs::rename(&temp_path, output_path).map_err(|e| LabOpsError::io(output_path, e))?;
    Ok(())
}

/// Writes the latest checkpoint plus its numbered history entry.
///
/// Returns `(latest_path, history_path)`.
pub fn write_checkpoint_artifacts(state: &CheckpointState) -> Result<(PathBuf, PathBuf)> {
    let bundle_dir = PathBuf::from(&state.bundle_dir);
    let latest_path = bundle_dir.join("soak_checkpoint.json");
    let history_path = bundle_dir
        .join("checkpoints")
        .join(format!("checkpoint_{}.json", state.checkpoints_written));
    write_checkpoint_json(state, &latest_path)?;
    write_checkpoint_json(state, &history_path)?;
    Ok((latest_path, history_path))
}

/// Loads a checkpoint document.
pub fn load_checkpoint(checkpoint_path: &Path) -> Result<CheckpointState> {
    let text =
        fs::read_to_string(checkpoint_path).map_err(|e| LabOpsError::io(checkpoint_path, e))?;
    let state: CheckpointState = serde_json::from_str(&text).map_err(|e| LabOpsError::Parse {
        context: "soak checkpoint",
        details: format!("{}: {e}", checkpoint_path.display()),
    })?;
    if state.schema_version != "1.0" {
        return Err(LabOpsError::Parse {
            context: "soak checkpoint",
            details: format!(
                "unsupported checkpoint schema_version '{}' in {}",
                state.schema_version,
                checkpoint_path.display()
            ),
        });
    }
    Ok(state)
}

/// Appends frames to the cache as one JSON object per line.
pub fn append_frame_cache(frames: &[FrameSample], frame_cache_path: &Path) -> Result<()> {
    if frame_cache_path.as_os_str().is_empty() {
        return Err(LabOpsError::Runtime {
            details: "frame cache path cannot be empty".into(),
        });
    }
    if let Some(parent) = frame_cache_path.parent() {
        fs::create_dir_all(parent).map_err(|e| LabOpsError::io(parent, e))?;
    }

    let mut body = String::new();
    for frame in frames {
        let _ = writeln!(
            body,
            "{{\"frame_id\":{},\"ts_epoch_us\":{},\"size_bytes\":{},\"dropped\":{}}}",
            frame.frame_id,
            to_epoch_micros(frame.timestamp),
            frame.size_bytes,
            frame.is_dropped()
        );
    }

    use std::io::Write as _;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(frame_cache_path)
        .map_err(|e| LabOpsError::io(frame_cache_path, e))?;
    file.write_all(body.as_bytes())
        .map_err(|e| LabOpsError::io(frame_cache_path, e))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct FrameCacheLine {
    frame_id: u64,
    ts_epoch_us: i64,
    size_bytes: u32,
    dropped: bool,
}

/// Loads the whole frame cache. A missing file is an empty cache.
pub fn load_frame_cache(frame_cache_path: &Path) -> Result<Vec<FrameSample>> {
    if !frame_cache_path.exists() {
        return Ok(Vec::new());
    }
    let text =
        fs::read_to_string(frame_cache_path).map_err(|e| LabOpsError::io(frame_cache_path, e))?;

    let mut frames = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let parsed: FrameCacheLine =
            serde_json::from_str(line).map_err(|_| LabOpsError::Parse {
                context: "frame cache",
                details: format!("invalid frame cache line in '{}'", frame_cache_path.display()),
            })?;
        frames.push(FrameSample {
            frame_id: parsed.frame_id,
            timestamp: from_epoch_micros(parsed.ts_epoch_us),
            size_bytes: parsed.size_bytes,
            // Cached lines carry only the legacy flag; metrics reclassifies.
            outcome: FrameOutcome::Received,
            dropped: Some(parsed.dropped),
        });
    }
    Ok(frames)
}
