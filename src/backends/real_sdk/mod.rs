//! Real-backend skeleton: the parameter bridge and acquisition machinery
//! that a proprietary SDK adapter would plug into.
//!
//! The open build runs this path against the deterministic frame provider,
//! which keeps the full apply/acquire/readback pipeline testable without
//! hardware. Device identity is synthetic but stable.

pub mod acquisition;
pub mod apply_params;
pub mod frame_provider;
pub mod node_map;
pub mod param_key_map;
pub mod transport_counters;

use std::env;

use chrono::Utc;

use crate::backends::real_sdk::acquisition::{AcquisitionInput, run_acquisition_loop};
use crate::backends::real_sdk::frame_provider::DeterministicFrameProvider;
use crate::backends::{BackendConfig, FrameSample};
use crate::core::errors::{LabOpsError, Result};

/// Environment variable forcing a simulated device detach after N pull
/// operations, for reconnect-policy testing.
pub const DISCONNECT_AFTER_PULLS_ENV: &str = "LABOPS_REAL_DISCONNECT_AFTER_PULLS";

const DEFAULT_FRAME_RATE_FPS: f64 = 30.0;
const DEFAULT_FRAME_SIZE_BYTES: u32 = 4096;
const DEFAULT_TIMEOUT_PERCENT: f64 = 1.0;
const DEFAULT_INCOMPLETE_PERCENT: f64 = 1.0;
const DEFAULT_SEED: u64 = 1;

fn read_disconnect_fixture() -> Option<u64> {
    let raw = env::var(DISCONNECT_AFTER_PULLS_ENV).ok()?;
    raw.trim().parse::<u64>().ok().filter(|n| *n >= 1)
}

/// Synthetic-but-stable device identity reported by the skeleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealDeviceIdentity {
    pub model: String,
    pub serial: String,
    pub transport: String,
    pub firmware_version: Option<String>,
    pub sdk_version: Option<String>,
}

impl Default for RealDeviceIdentity {
    fn default() -> Self {
        Self {
            model: "lab-skeleton-cam".into(),
            serial: "SKEL-0001".into(),
            transport: "gev".into(),
            firmware_version: Some("1.4.2".into()),
            sdk_version: Some("skeleton-0.3".into()),
        }
    }
}

/// Real camera backend skeleton.
#[derive(Debug)]
pub struct RealCameraBackend {
    connected: bool,
    running: bool,
    next_frame_id: u64,
    pull_calls: u64,
    disconnect_after_pull_calls: Option<u64>,
    disconnect_latched: bool,
    params: BackendConfig,
    sdk_log: Vec<String>,
    identity: RealDeviceIdentity,
}

impl Default for RealCameraBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RealCameraBackend {
    #[must_use]
    pub fn new() -> Self {
        let disconnect_after_pull_calls = read_disconnect_fixture();
        let mut params = BackendConfig::new();
        params.insert("backend".into(), "real".into());
        if let Some(n) = disconnect_after_pull_calls {
            params.insert("simulate_disconnect_after_pull_calls".into(), n.to_string());
        }
        Self {
            connected: false,
            running: false,
            next_frame_id: 0,
            pull_calls: 0,
            disconnect_after_pull_calls,
            disconnect_latched: false,
            params,
            sdk_log: Vec::new(),
            identity: RealDeviceIdentity::default(),
        }
    }

    /// Device identity for `run.json` / `camera_config.json`.
    #[must_use]
    pub fn identity(&self) -> &RealDeviceIdentity {
        &self.identity
    }

    /// SDK trace lines collected so far (flushed to `sdk_log.txt` on demand).
    #[must_use]
    pub fn sdk_log_lines(&self) -> &[String] {
        &self.sdk_log
    }

    fn log(&mut self, line: impl Into<String>) {
        self.sdk_log.push(line.into());
    }

    pub fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Err(LabOpsError::Runtime {
                details: "real backend is already connected".into(),
            });
        }
        if self.disconnect_latched {
            // Once the fixture disconnect trips, keep connect failing so
            // run-level retry policy is exercised end to end.
            self.log("connect status=error reason=device_unavailable_after_disconnect");
            return Err(LabOpsError::BackendConnect {
                details: "device unavailable after disconnect".into(),
            });
        }
        self.connected = true;
        self.log("connect status=ok");
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        if !self.connected {
            return Err(LabOpsError::Runtime {
                details: "real backend cannot start before a successful connect".into(),
            });
        }
        if self.running {
            return Err(LabOpsError::Runtime {
                details: "real backend is already running".into(),
            });
        }
        self.running = true;
        self.next_frame_id = 0;
        self.log("start status=ok");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Err(LabOpsError::Runtime {
                details: "real backend is not running".into(),
            });
        }
        self.running = false;
        self.log("stop status=ok");
        Ok(())
    }

    pub fn set_param(&mut self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(LabOpsError::Runtime {
                details: "parameter key cannot be empty".into(),
            });
        }
        if value.is_empty() {
            return Err(LabOpsError::Runtime {
                details: "parameter value cannot be empty".into(),
            });
        }
        self.params.insert(key.to_string(), value.to_string());
        self.log(format!("set_param key={key} value={value}"));
        Ok(())
    }

    #[must_use]
    pub fn dump_config(&self) -> BackendConfig {
        let mut config = self.params.clone();
        config.insert("connected".into(), self.connected.to_string());
        config.insert("running".into(), self.running.to_string());
        config.insert("model".into(), self.identity.model.clone());
        config.insert("serial".into(), self.identity.serial.clone());
        config
    }

    pub fn pull_frames(&mut self, duration_ms: u64) -> Result<Vec<FrameSample>> {
        if !self.connected {
            return Err(LabOpsError::Runtime {
                details: "real backend cannot pull_frames before a successful connect".into(),
            });
        }
        if !self.running {
            return Err(LabOpsError::Runtime {
                details: "real backend cannot pull frames while stream is stopped".into(),
            });
        }

        self.pull_calls += 1;
        if let Some(limit) = self.disconnect_after_pull_calls {
            if self.pull_calls >= limit && !self.disconnect_latched {
                self.disconnect_latched = true;
                self.connected = false;
                self.running = false;
                self.log("pull_frames status=error reason=device_disconnected");
                return Err(LabOpsError::DeviceDisconnect {
                    attempts_used: 0,
                    retry_limit: 0,
                });
            }
        }

        let fps = self.resolve_fps()?;
        let frame_size_bytes = self.resolve_frame_size()?;
        let seed = self.resolve_seed()?;
        let timeout_percent = self.resolve_percent(
            &["TimeoutPercent", "timeout_percent"],
            DEFAULT_TIMEOUT_PERCENT,
        )?;
        let incomplete_percent = self.resolve_percent(
            &["IncompletePercent", "incomplete_percent"],
            DEFAULT_INCOMPLETE_PERCENT,
        )?;

        let mut provider =
            DeterministicFrameProvider::new(seed, frame_size_bytes, timeout_percent, incomplete_percent);
        let input = AcquisitionInput {
            duration_ms,
            frame_rate_fps: fps,
            default_frame_size_bytes: frame_size_bytes,
            first_frame_id: self.next_frame_id,
            stream_start_ts: Utc::now(),
        };
        let result = run_acquisition_loop(&mut provider, &input)?;
        self.next_frame_id = result.next_frame_id;
        self.log(format!(
            "pull_frames status=ok frames={} received={} dropped={}",
            result.counters.frames_total,
            result.counters.frames_received,
            result.counters.frames_dropped
        ));
        Ok(result.frames)
    }

    fn param_by_alias(&self, aliases: &[&str]) -> Option<&str> {
        aliases
            .iter()
            .find_map(|key| self.params.get(*key))
            .map(String::as_str)
    }

    fn resolve_fps(&self) -> Result<f64> {
        let Some(raw) = self.param_by_alias(&["AcquisitionFrameRate", "frame_rate", "fps"]) else {
            return Ok(DEFAULT_FRAME_RATE_FPS);
        };
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| LabOpsError::Runtime {
                details: format!("invalid AcquisitionFrameRate parameter value: {raw}"),
            })
    }

    fn resolve_frame_size(&self) -> Result<u32> {
        let Some(raw) = self.param_by_alias(&["PayloadSize", "frame_size_bytes"]) else {
            return Ok(DEFAULT_FRAME_SIZE_BYTES);
        };
        raw.trim()
            .parse::<u32>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| LabOpsError::Runtime {
                details: format!("invalid PayloadSize parameter value: {raw}"),
            })
    }

    fn resolve_seed(&self) -> Result<u64> {
        let Some(raw) = self.param_by_alias(&["FrameSeed", "seed"]) else {
            return Ok(DEFAULT_SEED);
        };
        raw.trim()
            .parse::<u64>()
            .map_err(|_| LabOpsError::Runtime {
                details: format!("invalid FrameSeed parameter value: {raw}"),
            })
    }

    fn resolve_percent(&self, aliases: &[&str], default: f64) -> Result<f64> {
        let Some(raw) = self.param_by_alias(aliases) else {
            return Ok(default);
        };
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && (0.0..=100.0).contains(v))
            .ok_or_else(|| LabOpsError::Runtime {
                details: format!(
                    "invalid {} parameter value: {raw} (expected 0..100)",
                    aliases[0]
                ),
            })
    }
}
