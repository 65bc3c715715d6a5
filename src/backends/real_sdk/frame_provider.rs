//! Provider-level frame outcome source for the acquisition loop.
//!
//! The provider seam exists so loop mechanics can be unit-tested without a
//! vendor SDK: deterministic, mock, and (eventually) hardware providers all
//! answer the same one-shot question — what happened to frame N.

#![allow(missing_docs)]

use crate::backends::{FrameOutcome, SPLITMIX_INCREMENT, splitmix64};
use crate::core::errors::Result;

/// One provider sample consumed by the acquisition loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderSample {
    pub outcome: FrameOutcome,
    pub size_bytes: u32,
    /// Synthetic stall expressed in frame periods: `stall_periods = 3` means
    /// a gap of 3 extra frame intervals is inserted before this sample.
    pub stall_periods: u32,
}

/// Source of per-frame outcomes. Implementations must be pure functions of
/// `(seed, frame_id)` when determinism is required.
pub trait FrameProvider {
    /// Produces one provider sample for the requested absolute frame id.
    fn next(&mut self, frame_id: u64) -> Result<ProviderSample>;
}

const OUTCOME_SALT: u64 = 0x8b8b_8b8b_8b8b_8b8b;

fn determine_outcome(
    seed: u64,
    frame_id: u64,
    timeout_percent: f64,
    incomplete_percent: f64,
) -> FrameOutcome {
    if timeout_percent <= 0.0 && incomplete_percent <= 0.0 {
        return FrameOutcome::Received;
    }

    // Deterministic sample in [0, 100) so seeded runs remain reproducible.
    let mixed = splitmix64((seed ^ OUTCOME_SALT).wrapping_add(frame_id.wrapping_mul(SPLITMIX_INCREMENT)));
    let sample_percent = (mixed % 100_000) as f64 / 1_000.0;
    if sample_percent < timeout_percent {
        return FrameOutcome::Timeout;
    }
    if sample_percent < timeout_percent + incomplete_percent {
        return FrameOutcome::Incomplete;
    }
    FrameOutcome::Received
}

/// Deterministic provider used by the open real-backend skeleton.
#[derive(Debug, Clone)]
pub struct DeterministicFrameProvider {
    seed: u64,
    frame_size_bytes: u32,
    timeout_percent: f64,
    incomplete_percent: f64,
}

impl DeterministicFrameProvider {
    /// The combined timeout/incomplete share is clamped so the two shares
    /// never exceed 100%.
    #[must_use]
    pub fn new(
        seed: u64,
        frame_size_bytes: u32,
        timeout_percent: f64,
        incomplete_percent: f64,
    ) -> Self {
        let timeout = timeout_percent.clamp(0.0, 100.0);
        let incomplete = incomplete_percent.clamp(0.0, 100.0 - timeout);
        Self {
            seed,
            frame_size_bytes,
            timeout_percent: timeout,
            incomplete_percent: incomplete,
        }
    }
}

impl FrameProvider for DeterministicFrameProvider {
    fn next(&mut self, frame_id: u64) -> Result<ProviderSample> {
        let outcome = determine_outcome(
            self.seed,
            frame_id,
            self.timeout_percent,
            self.incomplete_percent,
        );
        let size_bytes = match outcome {
            FrameOutcome::Timeout | FrameOutcome::Dropped => 0,
            FrameOutcome::Incomplete => (self.frame_size_bytes / 4).max(1),
            FrameOutcome::Received => self.frame_size_bytes,
        };
        Ok(ProviderSample {
            outcome,
            size_bytes,
            stall_periods: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_is_pure_in_seed_and_frame_id() {
        let mut a = DeterministicFrameProvider::new(42, 4096, 10.0, 10.0);
        let mut b = DeterministicFrameProvider::new(42, 4096, 10.0, 10.0);
        for frame_id in 0..200 {
            assert_eq!(a.next(frame_id).unwrap(), b.next(frame_id).unwrap());
        }
    }

    #[test]
    fn zero_percentages_always_receive() {
        let mut provider = DeterministicFrameProvider::new(7, 4096, 0.0, 0.0);
        for frame_id in 0..100 {
            let sample = provider.next(frame_id).unwrap();
            assert_eq!(sample.outcome, FrameOutcome::Received);
            assert_eq!(sample.size_bytes, 4096);
        }
    }

    #[test]
    fn size_rules_follow_outcome() {
        let mut provider = DeterministicFrameProvider::new(3, 4000, 50.0, 50.0);
        let mut saw_timeout = false;
        let mut saw_incomplete = false;
        for frame_id in 0..500 {
            let sample = provider.next(frame_id).unwrap();
            match sample.outcome {
                FrameOutcome::Timeout => {
                    saw_timeout = true;
                    assert_eq!(sample.size_bytes, 0);
                }
                FrameOutcome::Incomplete => {
                    saw_incomplete = true;
                    assert_eq!(sample.size_bytes, 1000);
                }
                FrameOutcome::Received | FrameOutcome::Dropped => {}
            }
        }
        assert!(saw_timeout && saw_incomplete);
    }

    #[test]
    fn shares_are_clamped_to_100_percent() {
        // 80 + 80 clamps incomplete to 20; every outcome remains classified.
        let mut provider = DeterministicFrameProvider::new(11, 4096, 80.0, 80.0);
        let mut received = 0u32;
        for frame_id in 0..1000 {
            if provider.next(frame_id).unwrap().outcome == FrameOutcome::Received {
                received += 1;
            }
        }
        assert_eq!(received, 0, "timeout+incomplete shares cover 100%");
    }
}
