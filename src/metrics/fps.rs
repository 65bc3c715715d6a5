//! FPS report computation from a frame vector.
//!
//! Dropped frames are excluded from FPS numerators. Drop totals are split
//! into generic drops, timeouts, and incomplete frames so engineers can
//! separate transport failure modes from acquisition failure modes.

#![allow(missing_docs)]

use chrono::{DateTime, Duration, Utc};

use crate::backends::{FrameOutcome, FrameSample};
use crate::core::errors::{LabOpsError, Result};

/// One rolling FPS measurement at a specific window-end timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingFpsSample {
    pub window_end: DateTime<Utc>,
    pub frames_in_window: u64,
    pub fps: f64,
}

/// Summary stats for microsecond-based timing distributions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingStatsUs {
    pub sample_count: u64,
    pub min_us: f64,
    pub avg_us: f64,
    pub p95_us: f64,
}

/// FPS report emitted for a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FpsReport {
    pub avg_window_ms: u64,
    pub rolling_window_ms: u64,
    pub frames_total: u64,
    pub received_frames_total: u64,
    pub dropped_frames_total: u64,
    pub dropped_generic_frames_total: u64,
    pub timeout_frames_total: u64,
    pub incomplete_frames_total: u64,
    pub drop_rate_percent: f64,
    pub generic_drop_rate_percent: f64,
    pub timeout_rate_percent: f64,
    pub incomplete_rate_percent: f64,
    pub avg_fps: f64,
    pub rolling_samples: Vec<RollingFpsSample>,
    pub inter_frame_interval_us: TimingStatsUs,
    pub inter_frame_jitter_us: TimingStatsUs,
}

// Legacy frame caches may carry dropped=true without an explicit outcome.
// Those reclassify as generic dropped so historical data stays comparable
// while the category split rolls out.
fn resolve_outcome(frame: &FrameSample) -> FrameOutcome {
    if frame.outcome == FrameOutcome::Received && frame.dropped == Some(true) {
        return FrameOutcome::Dropped;
    }
    frame.outcome
}

fn compute_timing_stats_us(mut samples_us: Vec<f64>) -> TimingStatsUs {
    if samples_us.is_empty() {
        return TimingStatsUs::default();
    }
    samples_us.sort_by(f64::total_cmp);

    let sample_count = samples_us.len() as u64;
    let min_us = samples_us[0];
    let sum: f64 = samples_us.iter().sum();
    #[allow(clippy::cast_precision_loss)]
    let avg_us = sum / samples_us.len() as f64;

    // Nearest-rank p95 keeps the statistic deterministic across platforms.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rank = (0.95 * samples_us.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(samples_us.len() - 1);

    TimingStatsUs {
        sample_count,
        min_us,
        avg_us,
        p95_us: samples_us[index],
    }
}

/// Computes the FPS report over `frames`.
///
/// `avg_window_ms` and `rolling_window_ms` must be positive. Frames may
/// arrive in any order; received timestamps are normalized ascending before
/// windowing.
pub fn compute_fps_report(
    frames: &[FrameSample],
    avg_window_ms: u64,
    rolling_window_ms: u64,
) -> Result<FpsReport> {
    if avg_window_ms == 0 {
        return Err(LabOpsError::Runtime {
            details: "avg fps window must be greater than 0".into(),
        });
    }
    if rolling_window_ms == 0 {
        return Err(LabOpsError::Runtime {
            details: "rolling fps window must be greater than 0".into(),
        });
    }

    let mut received_timestamps = Vec::with_capacity(frames.len());
    let mut report = FpsReport {
        avg_window_ms,
        rolling_window_ms,
        frames_total: frames.len() as u64,
        ..FpsReport::default()
    };

    for frame in frames {
        match resolve_outcome(frame) {
            FrameOutcome::Timeout => {
                report.timeout_frames_total += 1;
                report.dropped_frames_total += 1;
            }
            FrameOutcome::Incomplete => {
                report.incomplete_frames_total += 1;
                report.dropped_frames_total += 1;
            }
            FrameOutcome::Dropped => {
                report.dropped_generic_frames_total += 1;
                report.dropped_frames_total += 1;
            }
            FrameOutcome::Received => received_timestamps.push(frame.timestamp),
        }
    }
    received_timestamps.sort_unstable();
    report.received_frames_total = received_timestamps.len() as u64;

    #[allow(clippy::cast_precision_loss)]
    if report.frames_total > 0 {
        let total = report.frames_total as f64;
        report.drop_rate_percent = report.dropped_frames_total as f64 * 100.0 / total;
        report.generic_drop_rate_percent =
            report.dropped_generic_frames_total as f64 * 100.0 / total;
        report.timeout_rate_percent = report.timeout_frames_total as f64 * 100.0 / total;
        report.incomplete_rate_percent = report.incomplete_frames_total as f64 * 100.0 / total;
    }

    #[allow(clippy::cast_precision_loss)]
    {
        let avg_window_seconds = avg_window_ms as f64 / 1000.0;
        report.avg_fps = report.received_frames_total as f64 / avg_window_seconds;
    }

    if received_timestamps.is_empty() {
        return Ok(report);
    }

    #[allow(clippy::cast_precision_loss)]
    let rolling_window_seconds = rolling_window_ms as f64 / 1000.0;
    let rolling_window = Duration::milliseconds(i64::try_from(rolling_window_ms).unwrap_or(i64::MAX));

    // Two-pointer sliding window keeps the rolling computation linear.
    let mut left = 0usize;
    report.rolling_samples.reserve(received_timestamps.len());
    for right in 0..received_timestamps.len() {
        let window_start = received_timestamps[right] - rolling_window;
        while left < right && received_timestamps[left] < window_start {
            left += 1;
        }
        let count = (right - left + 1) as u64;
        #[allow(clippy::cast_precision_loss)]
        let fps = count as f64 / rolling_window_seconds;
        report.rolling_samples.push(RollingFpsSample {
            window_end: received_timestamps[right],
            frames_in_window: count,
            fps,
        });
    }

    if received_timestamps.len() >= 2 {
        let mut intervals_us = Vec::with_capacity(received_timestamps.len() - 1);
        for pair in received_timestamps.windows(2) {
            let delta_us = (pair[1] - pair[0]).num_microseconds().unwrap_or(i64::MAX);
            #[allow(clippy::cast_precision_loss)]
            intervals_us.push((delta_us.abs()) as f64);
        }
        report.inter_frame_interval_us = compute_timing_stats_us(intervals_us.clone());

        let mean = report.inter_frame_interval_us.avg_us;
        let jitter_us = intervals_us
            .iter()
            .map(|interval| (interval - mean).abs())
            .collect();
        report.inter_frame_jitter_us = compute_timing_stats_us(jitter_us);
    }

    Ok(report)
}
