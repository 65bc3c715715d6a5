//! Run identity contract: immutable config, lifecycle timestamps, and
//! optional device metadata, serialized as `run.json`.

#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::backends::real_sdk::transport_counters::{
    TransportCounterReading, TransportCountersSnapshot,
};
use crate::core::time::{format_utc_millis, to_epoch_millis};

/// Immutable inputs that define how a run executes. Critical for
/// reproducibility; expected to be present for every run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunConfig {
    pub scenario_id: String,
    pub backend: String,
    pub seed: u64,
    pub duration_ms: u64,
}

/// Lifecycle timestamps captured for every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTimestamps {
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Serialize for RunTimestamps {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_struct("RunTimestamps", 3)?;
        out.serialize_field("created_at_utc", &format_utc_millis(self.created_at))?;
        out.serialize_field("started_at_utc", &format_utc_millis(self.started_at))?;
        out.serialize_field("finished_at_utc", &format_utc_millis(self.finished_at))?;
        out.end()
    }
}

struct CounterStatusDoc<'a>(&'a TransportCounterReading);

impl Serialize for CounterStatusDoc<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.available {
            let mut out = serializer.serialize_struct("TransportCounterStatus", 2)?;
            out.serialize_field("status", "available")?;
            out.serialize_field("value", &self.0.value)?;
            out.end()
        } else {
            let mut out = serializer.serialize_struct("TransportCounterStatus", 1)?;
            out.serialize_field("status", "not_available")?;
            out.end()
        }
    }
}

/// Serializable wrapper so counter readings keep the available/not_available
/// shape in `run.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportCountersDoc(pub TransportCountersSnapshot);

impl Serialize for TransportCountersDoc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_struct("TransportCountersDoc", 3)?;
        out.serialize_field("resends", &CounterStatusDoc(&self.0.resends))?;
        out.serialize_field("packet_errors", &CounterStatusDoc(&self.0.packet_errors))?;
        out.serialize_field("dropped_packets", &CounterStatusDoc(&self.0.dropped_packets))?;
        out.end()
    }
}

/// Real-device identity recorded for hardware-path runs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RealDeviceMetadata {
    pub model: String,
    pub serial: String,
    pub transport: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdk_version: Option<String>,
    pub transport_counters: TransportCountersDoc,
}

/// Webcam identity recorded for webcam-path runs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebcamDeviceMetadata {
    pub device_id: String,
    pub friendly_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_rule: Option<String>,
}

/// Run identity + config + lifecycle timing: the minimal contract required
/// to explain what executed and when.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: String,
    pub config: RunConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_device: Option<RealDeviceMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webcam_device: Option<WebcamDeviceMetadata>,
    pub timestamps: RunTimestamps,
}

/// Generates a run id: UTC epoch millis plus a short entropy suffix so two
/// runs created in the same millisecond stay distinct.
#[must_use]
pub fn generate_run_id(created_at: DateTime<Utc>) -> String {
    let suffix: u16 = rand::rng().random();
    format!("run-{}-{suffix:04x}", to_epoch_millis(created_at))
}
