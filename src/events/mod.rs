//! Append-only structured event stream with a stable type vocabulary.
//!
//! Events are collected in memory during a run and flushed as one JSON
//! object per line (`events.jsonl`). Lines are assembled fully in memory and
//! written with a single `write_all` so a tailing process never observes a
//! partial line. Payload maps are `BTreeMap` so key order inside every line
//! is stable and snapshot tests stay byte-deterministic.

pub mod transport_anomaly;

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{LabOpsError, Result};
use crate::core::time::format_utc_millis;

/// Stable event type vocabulary. The string forms are part of the artifact
/// contract and are case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "run_started")]
    RunStarted,
    #[serde(rename = "CONFIG_APPLIED")]
    ConfigApplied,
    #[serde(rename = "CONFIG_UNSUPPORTED")]
    ConfigUnsupported,
    #[serde(rename = "CONFIG_ADJUSTED")]
    ConfigAdjusted,
    #[serde(rename = "STREAM_STARTED")]
    StreamStarted,
    #[serde(rename = "FRAME_RECEIVED")]
    FrameReceived,
    #[serde(rename = "FRAME_DROPPED")]
    FrameDropped,
    #[serde(rename = "FRAME_TIMEOUT")]
    FrameTimeout,
    #[serde(rename = "FRAME_INCOMPLETE")]
    FrameIncomplete,
    #[serde(rename = "DEVICE_DISCONNECTED")]
    DeviceDisconnected,
    #[serde(rename = "TRANSPORT_ANOMALY")]
    TransportAnomaly,
    #[serde(rename = "STREAM_STOPPED")]
    StreamStopped,
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "error")]
    Error,
}

impl EventType {
    /// Stable string form used in artifacts and assertions.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::ConfigApplied => "CONFIG_APPLIED",
            Self::ConfigUnsupported => "CONFIG_UNSUPPORTED",
            Self::ConfigAdjusted => "CONFIG_ADJUSTED",
            Self::StreamStarted => "STREAM_STARTED",
            Self::FrameReceived => "FRAME_RECEIVED",
            Self::FrameDropped => "FRAME_DROPPED",
            Self::FrameTimeout => "FRAME_TIMEOUT",
            Self::FrameIncomplete => "FRAME_INCOMPLETE",
            Self::DeviceDisconnected => "DEVICE_DISCONNECTED",
            Self::TransportAnomaly => "TRANSPORT_ANOMALY",
            Self::StreamStopped => "STREAM_STOPPED",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// One structured event: timestamp, type, and a sorted string payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub ts: DateTime<Utc>,
    pub kind: EventType,
    pub payload: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct EventLine<'a> {
    ts_utc: String,
    #[serde(rename = "type")]
    kind: EventType,
    payload: &'a BTreeMap<String, String>,
}

impl Event {
    /// Builds an event with an empty payload.
    #[must_use]
    pub fn new(ts: DateTime<Utc>, kind: EventType) -> Self {
        Self {
            ts,
            kind,
            payload: BTreeMap::new(),
        }
    }

    /// Builder-style payload entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Serializes this event as one JSONL line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String> {
        let line = EventLine {
            ts_utc: format_utc_millis(self.ts),
            kind: self.kind,
            payload: &self.payload,
        };
        serde_json::to_string(&line).map_err(|e| LabOpsError::Serialization {
            context: "event jsonl",
            details: e.to_string(),
        })
    }
}

/// In-memory append-only event collection for one run.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one event, preserving insertion order.
    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Writes the whole log as `events.jsonl` into `output_dir`.
    ///
    /// Every line is newline-terminated, including the last one.
    pub fn write_jsonl(&self, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir).map_err(|e| LabOpsError::io(output_dir, e))?;
        let written_path = output_dir.join("events.jsonl");

        let mut body = String::new();
        for event in &self.events {
            body.push_str(&event.to_json_line()?);
            body.push('\n');
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&written_path)
            .map_err(|e| LabOpsError::io(&written_path, e))?;
        file.write_all(body.as_bytes())
            .map_err(|e| LabOpsError::io(&written_path, e))?;
        Ok(written_path)
    }
}
