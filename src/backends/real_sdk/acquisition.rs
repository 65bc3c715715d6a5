//! Acquisition loop: turns provider samples into an ordered frame sequence
//! with monotone timestamps and per-category counters.

#![allow(missing_docs)]

use chrono::{DateTime, Duration, Utc};

use crate::backends::real_sdk::frame_provider::FrameProvider;
use crate::backends::{FrameOutcome, FrameSample};
use crate::core::errors::{LabOpsError, Result};
use crate::events::EventType;

/// Loop input contract.
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionInput {
    pub duration_ms: u64,
    pub frame_rate_fps: f64,
    pub default_frame_size_bytes: u32,
    pub first_frame_id: u64,
    pub stream_start_ts: DateTime<Utc>,
}

/// Per-category frame counters for one acquisition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionCounters {
    pub frames_total: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub frames_timeout: u64,
    pub frames_incomplete: u64,
    /// Sum of synthetic stall periods applied by the provider.
    pub stall_periods_total: u64,
}

/// Full result of one acquisition loop execution.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionResult {
    pub frames: Vec<FrameSample>,
    pub events: Vec<EventType>,
    pub counters: AcquisitionCounters,
    pub next_frame_id: u64,
}

/// Event classification derived from a frame outcome. Mirrors the stable
/// event vocabulary so the run pipeline can append frame events directly.
#[must_use]
pub fn classify_frame_event(frame: &FrameSample) -> EventType {
    match frame.outcome {
        FrameOutcome::Timeout => EventType::FrameTimeout,
        FrameOutcome::Incomplete => EventType::FrameIncomplete,
        FrameOutcome::Dropped => EventType::FrameDropped,
        FrameOutcome::Received => {
            if frame.dropped == Some(true) {
                EventType::FrameDropped
            } else {
                EventType::FrameReceived
            }
        }
    }
}

/// Runs the acquisition loop over `provider` for the requested duration.
///
/// A provider error fails the whole loop; there are no retries at this
/// layer. Zero computed frames is a success with `next_frame_id` equal to
/// the first id.
pub fn run_acquisition_loop(
    provider: &mut dyn FrameProvider,
    input: &AcquisitionInput,
) -> Result<AcquisitionResult> {
    if !input.frame_rate_fps.is_finite() || input.frame_rate_fps <= 0.0 {
        return Err(LabOpsError::Runtime {
            details: "acquisition loop requires a positive finite frame_rate_fps".into(),
        });
    }
    if input.default_frame_size_bytes == 0 {
        return Err(LabOpsError::Runtime {
            details: "acquisition loop requires default_frame_size_bytes > 0".into(),
        });
    }

    let mut result = AcquisitionResult {
        next_frame_id: input.first_frame_id,
        ..AcquisitionResult::default()
    };

    let frame_count_exact = input.duration_ms as f64 * input.frame_rate_fps / 1000.0;
    if frame_count_exact < 1.0 {
        return Ok(result);
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let frame_count = frame_count_exact as u64;

    #[allow(clippy::cast_possible_truncation)]
    let period_ns = ((1e9 / input.frame_rate_fps).round() as i64).max(1);

    result.frames.reserve(usize::try_from(frame_count).unwrap_or(0));
    result.events.reserve(usize::try_from(frame_count).unwrap_or(0));

    let mut stall_periods_total: u64 = 0;
    for index in 0..frame_count {
        let frame_id = input.first_frame_id + index;
        let provided = provider.next(frame_id)?;

        stall_periods_total += u64::from(provided.stall_periods);
        let logical_period_index = frame_id + stall_periods_total;

        let mut timestamp = input.stream_start_ts
            + Duration::nanoseconds(
                period_ns.saturating_mul(i64::try_from(logical_period_index).unwrap_or(i64::MAX)),
            );
        if let Some(previous) = result.frames.last() {
            if timestamp <= previous.timestamp {
                timestamp = previous.timestamp + Duration::microseconds(1);
            }
        }

        let (size_bytes, dropped) = match provided.outcome {
            FrameOutcome::Timeout | FrameOutcome::Dropped => {
                result.counters.frames_dropped += 1;
                if provided.outcome == FrameOutcome::Timeout {
                    result.counters.frames_timeout += 1;
                }
                (0, Some(true))
            }
            FrameOutcome::Incomplete => {
                result.counters.frames_dropped += 1;
                result.counters.frames_incomplete += 1;
                let size = if provided.size_bytes == 0 {
                    (input.default_frame_size_bytes / 4).max(1)
                } else {
                    provided.size_bytes
                };
                (size, Some(true))
            }
            FrameOutcome::Received => {
                result.counters.frames_received += 1;
                let size = if provided.size_bytes == 0 {
                    input.default_frame_size_bytes
                } else {
                    provided.size_bytes
                };
                (size, None)
            }
        };

        let frame = FrameSample {
            frame_id,
            timestamp,
            size_bytes,
            outcome: provided.outcome,
            dropped,
        };
        result.events.push(classify_frame_event(&frame));
        result.frames.push(frame);
    }

    result.counters.frames_total = result.frames.len() as u64;
    result.counters.stall_periods_total = stall_periods_total;
    result.next_frame_id = input.first_frame_id + frame_count;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::real_sdk::frame_provider::ProviderSample;
    use crate::core::time::from_epoch_millis;

    struct ScriptedProvider {
        samples: Vec<ProviderSample>,
    }

    impl FrameProvider for ScriptedProvider {
        fn next(&mut self, frame_id: u64) -> Result<ProviderSample> {
            let index = usize::try_from(frame_id).unwrap() % self.samples.len();
            Ok(self.samples[index])
        }
    }

    fn input(duration_ms: u64, fps: f64) -> AcquisitionInput {
        AcquisitionInput {
            duration_ms,
            frame_rate_fps: fps,
            default_frame_size_bytes: 4096,
            first_frame_id: 0,
            stream_start_ts: from_epoch_millis(1_700_000_000_000),
        }
    }

    #[test]
    fn rejects_invalid_inputs() {
        let mut provider = ScriptedProvider {
            samples: vec![ProviderSample::default()],
        };
        assert!(run_acquisition_loop(&mut provider, &input(100, 0.0)).is_err());
        assert!(run_acquisition_loop(&mut provider, &input(100, f64::NAN)).is_err());

        let mut bad_size = input(100, 30.0);
        bad_size.default_frame_size_bytes = 0;
        assert!(run_acquisition_loop(&mut provider, &bad_size).is_err());
    }

    #[test]
    fn zero_duration_is_success_with_no_frames() {
        let mut provider = ScriptedProvider {
            samples: vec![ProviderSample::default()],
        };
        let mut request = input(0, 30.0);
        request.first_frame_id = 17;
        let result = run_acquisition_loop(&mut provider, &request).unwrap();
        assert!(result.frames.is_empty());
        assert_eq!(result.next_frame_id, 17);
    }

    #[test]
    fn counters_sum_to_frames_total() {
        let mut provider = ScriptedProvider {
            samples: vec![
                ProviderSample {
                    outcome: FrameOutcome::Received,
                    size_bytes: 0,
                    stall_periods: 0,
                },
                ProviderSample {
                    outcome: FrameOutcome::Timeout,
                    size_bytes: 0,
                    stall_periods: 0,
                },
                ProviderSample {
                    outcome: FrameOutcome::Incomplete,
                    size_bytes: 0,
                    stall_periods: 0,
                },
                ProviderSample {
                    outcome: FrameOutcome::Dropped,
                    size_bytes: 0,
                    stall_periods: 0,
                },
            ],
        };
        let result = run_acquisition_loop(&mut provider, &input(800, 25.0)).unwrap();
        let counters = result.counters;
        assert_eq!(counters.frames_total, 20);
        assert_eq!(
            counters.frames_total,
            counters.frames_received + counters.frames_dropped
        );
        // Timeout frames carry zero bytes; incompletes are strictly between
        // zero and the default size.
        for frame in &result.frames {
            match frame.outcome {
                FrameOutcome::Timeout => assert_eq!(frame.size_bytes, 0),
                FrameOutcome::Incomplete => {
                    assert!(frame.size_bytes > 0 && frame.size_bytes < 4096);
                }
                FrameOutcome::Received | FrameOutcome::Dropped => {}
            }
        }
    }

    #[test]
    fn stall_periods_shift_timestamps_forward() {
        let mut provider = ScriptedProvider {
            samples: vec![
                ProviderSample {
                    outcome: FrameOutcome::Received,
                    size_bytes: 0,
                    stall_periods: 0,
                },
                ProviderSample {
                    outcome: FrameOutcome::Received,
                    size_bytes: 0,
                    stall_periods: 3,
                },
            ],
        };
        let result = run_acquisition_loop(&mut provider, &input(100, 20.0)).unwrap();
        assert_eq!(result.frames.len(), 2);
        assert_eq!(result.counters.stall_periods_total, 3);
        let gap = result.frames[1].timestamp - result.frames[0].timestamp;
        // Frame period is 50 ms; the stall inserts 3 extra periods.
        assert_eq!(gap.num_milliseconds(), 200);
    }

    #[test]
    fn timestamps_are_strictly_monotone() {
        let mut provider = ScriptedProvider {
            samples: vec![ProviderSample::default()],
        };
        let result = run_acquisition_loop(&mut provider, &input(1000, 120.0)).unwrap();
        for pair in result.frames.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
        }
    }
}
