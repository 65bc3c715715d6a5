//! Webcam backend with fixture-driven device enumeration.
//!
//! Hardware probing is a platform concern that lives outside this crate;
//! the backend consumes a device inventory supplied through the
//! `LABOPS_WEBCAM_DEVICE_FIXTURE` environment variable (a JSON array of
//! device records). Selection rule: lowest discovered index wins. Once
//! connected the backend synthesizes frames like the sim path so webcam
//! scenarios stay runnable on headless CI hosts.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backends::sim::SimCameraBackend;
use crate::backends::{BackendConfig, FrameSample};
use crate::core::errors::{LabOpsError, Result};

/// Environment variable naming the device-inventory fixture file.
pub const DEVICE_FIXTURE_ENV: &str = "LABOPS_WEBCAM_DEVICE_FIXTURE";

/// One enumerated webcam device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebcamDevice {
    pub device_id: String,
    pub friendly_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_info: Option<String>,
}

/// Loads the device inventory from the fixture file, if configured.
///
/// An absent variable yields an empty inventory (no devices discovered), a
/// present-but-unreadable fixture is an error so misconfigured test rigs
/// fail loudly.
pub fn enumerate_devices() -> Result<Vec<WebcamDevice>> {
    let Some(fixture) = env::var_os(DEVICE_FIXTURE_ENV) else {
        return Ok(Vec::new());
    };
    load_device_fixture(Path::new(&fixture))
}

/// Parses a device-inventory fixture file.
pub fn load_device_fixture(path: &Path) -> Result<Vec<WebcamDevice>> {
    let text = fs::read_to_string(path).map_err(|e| LabOpsError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| LabOpsError::Parse {
        context: "webcam device fixture",
        details: e.to_string(),
    })
}

/// Webcam backend: enumeration + selection over a sim-style frame source.
#[derive(Debug)]
pub struct WebcamCameraBackend {
    selected: Option<WebcamDevice>,
    inner: SimCameraBackend,
}

impl Default for WebcamCameraBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WebcamCameraBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            selected: None,
            inner: SimCameraBackend::new(),
        }
    }

    /// Device chosen at connect time, if any.
    #[must_use]
    pub fn selected_device(&self) -> Option<&WebcamDevice> {
        self.selected.as_ref()
    }

    pub fn connect(&mut self) -> Result<()> {
        let devices = enumerate_devices()?;
        let Some(first) = devices.into_iter().next() else {
            return Err(LabOpsError::BackendConnect {
                details: format!(
                    "no webcam devices discovered (set {DEVICE_FIXTURE_ENV} to a device fixture)"
                ),
            });
        };
        self.inner.connect()?;
        self.inner.set_param("backend", "webcam")?;
        self.inner.set_param("device_id", &first.device_id)?;
        self.inner.set_param("friendly_name", &first.friendly_name)?;
        self.inner.set_param("selection_rule", "first_discovered")?;
        self.selected = Some(first);
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    pub fn stop(&mut self) -> Result<()> {
        self.inner.stop()
    }

    pub fn set_param(&mut self, key: &str, value: &str) -> Result<()> {
        self.inner.set_param(key, value)
    }

    #[must_use]
    pub fn dump_config(&self) -> BackendConfig {
        self.inner.dump_config()
    }

    pub fn pull_frames(&mut self, duration_ms: u64) -> Result<Vec<FrameSample>> {
        self.inner.pull_frames(duration_ms)
    }
}
