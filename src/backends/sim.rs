//! Deterministic, hardware-free backend implementation.
//!
//! The sim backend is strict about state transitions so CLI/runtime code
//! exercises realistic control flow before any hardware is involved. All
//! fault injection is a pure function of `(seed, frame_id)`.

use chrono::{DateTime, Duration, Utc};

use crate::backends::{BackendConfig, FrameOutcome, FrameSample, SPLITMIX_INCREMENT, splitmix64};
use crate::core::errors::{LabOpsError, Result};

const DEFAULT_FPS: u32 = 30;
const DEFAULT_JITTER_US: u32 = 0;
const DEFAULT_FRAME_SIZE_BYTES: u32 = 1_048_576;
const DEFAULT_DROP_EVERY_N: u32 = 0;
const DEFAULT_SEED: u64 = 1;

fn parse_u32(text: &str) -> Option<u32> {
    text.parse::<u32>().ok()
}

fn parse_u64(text: &str) -> Option<u64> {
    text.parse::<u64>().ok()
}

fn deterministic_jitter_us(seed: u64, frame_id: u64, max_abs_jitter_us: u32) -> i64 {
    if max_abs_jitter_us == 0 {
        return 0;
    }
    let mixed = splitmix64(seed ^ frame_id.wrapping_mul(SPLITMIX_INCREMENT));
    let span = u64::from(max_abs_jitter_us) * 2 + 1;
    let offset = i64::try_from(mixed % span).unwrap_or(0);
    offset - i64::from(max_abs_jitter_us)
}

// Percent sample in [0, 100) with milli-percent resolution.
fn deterministic_percent(seed: u64, frame_id: u64, salt: u64) -> f64 {
    let mixed = splitmix64((seed ^ salt).wrapping_add(frame_id.wrapping_mul(SPLITMIX_INCREMENT)));
    (mixed % 100_000) as f64 / 1_000.0
}

const DROP_SALT: u64 = 0x5151_5151_5151_5151;

/// Deterministic sim camera backend.
#[derive(Debug)]
pub struct SimCameraBackend {
    connected: bool,
    running: bool,
    next_frame_id: u64,
    stream_start_ts: DateTime<Utc>,
    burst_remaining: u32,
    params: BackendConfig,
}

impl Default for SimCameraBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimCameraBackend {
    #[must_use]
    pub fn new() -> Self {
        let mut params = BackendConfig::new();
        params.insert("backend".into(), "sim".into());
        params.insert("fps".into(), DEFAULT_FPS.to_string());
        params.insert("jitter_us".into(), DEFAULT_JITTER_US.to_string());
        params.insert(
            "frame_size_bytes".into(),
            DEFAULT_FRAME_SIZE_BYTES.to_string(),
        );
        params.insert("drop_every_n".into(), DEFAULT_DROP_EVERY_N.to_string());
        params.insert("seed".into(), DEFAULT_SEED.to_string());
        params.insert("pixel_format".into(), "mono8".into());
        params.insert("trigger_mode".into(), "free_run".into());

        Self {
            connected: false,
            running: false,
            next_frame_id: 0,
            stream_start_ts: Utc::now(),
            burst_remaining: 0,
            params,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Err(LabOpsError::Runtime {
                details: "sim backend is already connected".into(),
            });
        }
        self.connected = true;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        if !self.connected {
            return Err(LabOpsError::Runtime {
                details: "sim backend must be connected before start".into(),
            });
        }
        if self.running {
            return Err(LabOpsError::Runtime {
                details: "sim backend is already running".into(),
            });
        }
        self.running = true;
        self.next_frame_id = 0;
        self.burst_remaining = 0;
        self.stream_start_ts = Utc::now();
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Err(LabOpsError::Runtime {
                details: "sim backend is not running".into(),
            });
        }
        self.running = false;
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
        Ok(())
    }

    #[must_use]
    pub fn dump_config(&self) -> BackendConfig {
        let mut config = self.params.clone();
        config.insert("connected".into(), self.connected.to_string());
        config.insert("running".into(), self.running.to_string());
        config
    }

    pub fn pull_frames(&mut self, duration_ms: u64) -> Result<Vec<FrameSample>> {
        if !self.running {
            return Err(LabOpsError::Runtime {
                details: "sim backend must be running before pull_frames".into(),
            });
        }
        if duration_ms == 0 {
            return Ok(Vec::new());
        }

        let fps = self.resolve_positive_u32("fps", DEFAULT_FPS)?;
        let jitter_us = self.resolve_u32("jitter_us", DEFAULT_JITTER_US)?;
        let frame_size_bytes =
            self.resolve_positive_u32("frame_size_bytes", DEFAULT_FRAME_SIZE_BYTES)?;
        let seed = self.resolve_seed()?;
        let drop_every_n = self.resolve_u32("drop_every_n", DEFAULT_DROP_EVERY_N)?;
        let drop_percent = self.resolve_u32("drop_percent", 0)?;
        let burst_drop = self.resolve_u32("burst_drop", 0)?;
        let reorder = self.resolve_u32("reorder", 0)?;

        let frame_count = duration_ms * u64::from(fps) / 1000;
        let mut frames = Vec::with_capacity(usize::try_from(frame_count).unwrap_or(0));
        if frame_count == 0 {
            return Ok(frames);
        }

        let period_ns = (1_000_000_000u64 / u64::from(fps)).max(1);
        for _ in 0..frame_count {
            let frame_id = self.next_frame_id;
            self.next_frame_id += 1;

            let nominal_offset_ns = period_ns.saturating_mul(frame_id);
            let jitter = deterministic_jitter_us(seed, frame_id, jitter_us);
            let mut timestamp = self.stream_start_ts
                + Duration::nanoseconds(i64::try_from(nominal_offset_ns).unwrap_or(i64::MAX))
                + Duration::microseconds(jitter);
            if let Some(last) = frames.last() {
                let last: &FrameSample = last;
                if timestamp <= last.timestamp {
                    timestamp = last.timestamp + Duration::microseconds(1);
                }
            }

            let every_n_drop =
                drop_every_n > 0 && (frame_id + 1) % u64::from(drop_every_n) == 0;
            let percent_drop = drop_percent > 0
                && deterministic_percent(seed, frame_id, DROP_SALT) < f64::from(drop_percent);
            let burst_continues = self.burst_remaining > 0;
            if burst_continues {
                self.burst_remaining -= 1;
            } else if percent_drop && burst_drop > 1 {
                self.burst_remaining = burst_drop - 1;
            }
            let is_dropped = every_n_drop || percent_drop || burst_continues;

            frames.push(FrameSample {
                frame_id,
                timestamp,
                size_bytes: if is_dropped { 0 } else { frame_size_bytes },
                outcome: if is_dropped {
                    FrameOutcome::Dropped
                } else {
                    FrameOutcome::Received
                },
                dropped: is_dropped.then_some(true),
            });
        }

        // Reorder fault: rotate frame ids inside each fixed window. Delivery
        // order and timestamps stay monotone; only the id sequence shows the
        // transport-level disorder.
        if reorder >= 2 {
            let window = usize::try_from(reorder).unwrap_or(2);
            for chunk in frames.chunks_mut(window) {
                if chunk.len() >= 2 {
                    let first_id = chunk[0].frame_id;
                    for i in 0..chunk.len() - 1 {
                        chunk[i].frame_id = chunk[i + 1].frame_id;
                    }
                    if let Some(last) = chunk.last_mut() {
                        last.frame_id = first_id;
                    }
                }
            }
        }

        Ok(frames)
    }

    fn resolve_u32(&self, key: &str, default: u32) -> Result<u32> {
        match self.params.get(key) {
            None => Ok(default),
            Some(raw) => parse_u32(raw).ok_or_else(|| LabOpsError::Runtime {
                details: format!("invalid {key} parameter value: {raw}"),
            }),
        }
    }

    fn resolve_positive_u32(&self, key: &str, default: u32) -> Result<u32> {
        let value = self.resolve_u32(key, default)?;
        if value == 0 {
            return Err(LabOpsError::Runtime {
                details: format!("invalid {key} parameter value: 0"),
            });
        }
        Ok(value)
    }

    fn resolve_seed(&self) -> Result<u64> {
        match self.params.get("seed") {
            None => Ok(DEFAULT_SEED),
            Some(raw) => parse_u64(raw).ok_or_else(|| LabOpsError::Runtime {
                details: format!("invalid seed parameter value: {raw}"),
            }),
        }
    }
}
