//! Cooperative interrupt handling for runs.
//!
//! SIGINT/SIGTERM set a shared flag; the run loop polls it between stages
//! rather than aborting mid-write, so a partial bundle is always flushed
//! with every required artifact. `Ordering::Relaxed` is sufficient because
//! the loop polls every stage and no cross-flag ordering is required.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Shared interrupt state between the signal handler and the run loop.
#[derive(Debug, Clone)]
pub struct InterruptWatch {
    flag: Arc<AtomicBool>,
}

impl Default for InterruptWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptWatch {
    /// Creates the watch and registers OS signal hooks. Registration is
    /// best-effort; a failure leaves the flag manual-only rather than
    /// failing the run.
    #[must_use]
    pub fn new() -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&flag)) {
            eprintln!("labops: failed to register SIGINT handler: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&flag)) {
            eprintln!("labops: failed to register SIGTERM handler: {e}");
        }
        Self { flag }
    }

    /// Creates a watch with no signal registration (embedding/test use).
    #[must_use]
    pub fn unregistered() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether an interrupt has been requested.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Programmatically requests an interrupt.
    pub fn request(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_request_trips_the_flag() {
        let watch = InterruptWatch::unregistered();
        assert!(!watch.is_interrupted());
        watch.request();
        assert!(watch.is_interrupted());
        // Clones observe the same flag.
        assert!(watch.clone().is_interrupted());
    }
}
