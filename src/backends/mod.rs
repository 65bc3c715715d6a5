//! Camera backend capability contract and implementations.
//!
//! A backend exposes exactly six operations: connect, start, stop,
//! set_param, dump_config, pull_frames. There is no trait object or
//! inheritance chain; the contract is a closed enum and the concrete
//! implementation is selected once, at construction time, from the
//! scenario's backend field.

#![allow(missing_docs)]

pub mod real_sdk;
pub mod sdk_stub;
pub mod sim;
pub mod webcam;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::core::errors::Result;
use crate::scenario::BackendKind;

/// Per-frame delivery outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameOutcome {
    #[default]
    Received,
    Dropped,
    Timeout,
    Incomplete,
}

impl FrameOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Dropped => "dropped",
            Self::Timeout => "timeout",
            Self::Incomplete => "incomplete",
        }
    }
}

/// One captured frame sample.
///
/// `dropped` mirrors the legacy flag carried by older frame caches; new
/// producers always set it consistently with `outcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSample {
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: u32,
    pub outcome: FrameOutcome,
    pub dropped: Option<bool>,
}

impl FrameSample {
    /// Whether this sample counts against delivery (any non-received path).
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        !matches!(self.outcome, FrameOutcome::Received) || self.dropped == Some(true)
    }
}

/// Flat string snapshot of backend parameters. `BTreeMap` keeps dump order
/// deterministic for artifacts.
pub type BackendConfig = BTreeMap<String, String>;

/// The closed set of backend implementations.
#[derive(Debug)]
pub enum CameraBackend {
    Sim(sim::SimCameraBackend),
    Webcam(webcam::WebcamCameraBackend),
    Real(real_sdk::RealCameraBackend),
    SdkStub(sdk_stub::SdkStubBackend),
}

impl CameraBackend {
    /// Constructs the backend selected by the scenario.
    #[must_use]
    pub fn create(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Sim => Self::Sim(sim::SimCameraBackend::new()),
            BackendKind::Webcam => Self::Webcam(webcam::WebcamCameraBackend::new()),
            BackendKind::Real => Self::Real(real_sdk::RealCameraBackend::new()),
            BackendKind::SdkStub => Self::SdkStub(sdk_stub::SdkStubBackend::new()),
        }
    }

    /// Establishes backend connection/session resources.
    pub fn connect(&mut self) -> Result<()> {
        match self {
            Self::Sim(b) => b.connect(),
            Self::Webcam(b) => b.connect(),
            Self::Real(b) => b.connect(),
            Self::SdkStub(b) => b.connect(),
        }
    }

    /// Begins streaming/capture after a successful connect.
    pub fn start(&mut self) -> Result<()> {
        match self {
            Self::Sim(b) => b.start(),
            Self::Webcam(b) => b.start(),
            Self::Real(b) => b.start(),
            Self::SdkStub(b) => b.start(),
        }
    }

    /// Stops active streaming/capture.
    pub fn stop(&mut self) -> Result<()> {
        match self {
            Self::Sim(b) => b.stop(),
            Self::Webcam(b) => b.stop(),
            Self::Real(b) => b.stop(),
            Self::SdkStub(b) => b.stop(),
        }
    }

    /// Updates one backend parameter at a time for controlled experiments.
    pub fn set_param(&mut self, key: &str, value: &str) -> Result<()> {
        match self {
            Self::Sim(b) => b.set_param(key, value),
            Self::Webcam(b) => b.set_param(key, value),
            Self::Real(b) => b.set_param(key, value),
            Self::SdkStub(b) => b.set_param(key, value),
        }
    }

    /// Returns the current backend parameter snapshot.
    #[must_use]
    pub fn dump_config(&self) -> BackendConfig {
        match self {
            Self::Sim(b) => b.dump_config(),
            Self::Webcam(b) => b.dump_config(),
            Self::Real(b) => b.dump_config(),
            Self::SdkStub(b) => b.dump_config(),
        }
    }

    /// Collects frames for the requested duration.
    pub fn pull_frames(&mut self, duration_ms: u64) -> Result<Vec<FrameSample>> {
        match self {
            Self::Sim(b) => b.pull_frames(duration_ms),
            Self::Webcam(b) => b.pull_frames(duration_ms),
            Self::Real(b) => b.pull_frames(duration_ms),
            Self::SdkStub(b) => b.pull_frames(duration_ms),
        }
    }

    /// Backend name as recorded in `run.json`.
    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::Sim(_) => BackendKind::Sim,
            Self::Webcam(_) => BackendKind::Webcam,
            Self::Real(_) => BackendKind::Real,
            Self::SdkStub(_) => BackendKind::SdkStub,
        }
    }
}

/// Shared SplitMix64 mixer used by every deterministic decision in the
/// backends. One implementation keeps seeded runs reproducible across sim
/// and real-skeleton paths.
#[must_use]
pub fn splitmix64(value: u64) -> u64 {
    let mut state = value.wrapping_add(SPLITMIX_INCREMENT);
    state = (state ^ (state >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    state = (state ^ (state >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    state ^ (state >> 31)
}

/// Weyl-sequence increment shared by the deterministic generators.
pub const SPLITMIX_INCREMENT: u64 = 0x9e37_79b9_7f4a_7c15;
