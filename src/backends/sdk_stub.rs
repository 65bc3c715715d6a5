//! Real-SDK stub backend.
//!
//! Stands in for the proprietary SDK adapter in open builds. `connect()` is
//! a guaranteed failure path with an actionable message; parameter writes
//! are retained so diagnostics can show what a run would have requested.

use crate::backends::{BackendConfig, FrameSample};
use crate::core::errors::{LabOpsError, Result};

/// Whether a proprietary SDK adapter is linked into this build.
#[must_use]
pub const fn is_real_backend_enabled() -> bool {
    cfg!(feature = "real-sdk")
}

fn connection_error() -> String {
    if is_real_backend_enabled() {
        "real backend path is enabled, but no proprietary SDK adapter is linked in this build"
            .into()
    } else {
        "real backend path is disabled at build time (enable the `real-sdk` feature to link an SDK adapter)"
            .into()
    }
}

/// Intentionally non-functional stand-in for a vendor SDK backend.
#[derive(Debug)]
pub struct SdkStubBackend {
    connected: bool,
    running: bool,
    params: BackendConfig,
}

impl Default for SdkStubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SdkStubBackend {
    #[must_use]
    pub fn new() -> Self {
        let mut params = BackendConfig::new();
        params.insert("backend".into(), "real_stub".into());
        params.insert("sdk_adapter".into(), "not_integrated".into());
        params.insert(
            "build_real_backend_enabled".into(),
            is_real_backend_enabled().to_string(),
        );
        Self {
            connected: false,
            running: false,
            params,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Err(LabOpsError::Runtime {
                details: "sdk stub backend is already connected".into(),
            });
        }
        Err(LabOpsError::BackendConnect {
            details: connection_error(),
        })
    }

    pub fn start(&mut self) -> Result<()> {
        if !self.connected {
            return Err(LabOpsError::Runtime {
                details: "sdk stub backend cannot start before a successful connect".into(),
            });
        }
        Err(LabOpsError::Runtime {
            details: "sdk stub backend cannot start stream because no SDK adapter is implemented"
                .into(),
        })
    }

    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Err(LabOpsError::Runtime {
                details: "sdk stub backend is not running".into(),
            });
        }
        Err(LabOpsError::Runtime {
            details: "sdk stub backend cannot stop stream because no active SDK session exists"
                .into(),
        })
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
        // Requested values survive for diagnostics even though no SDK call occurs.
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

    pub fn pull_frames(&mut self, _duration_ms: u64) -> Result<Vec<FrameSample>> {
        if !self.connected {
            return Err(LabOpsError::Runtime {
                details: "sdk stub backend cannot pull_frames before a successful connect".into(),
            });
        }
        Err(LabOpsError::Runtime {
            details: "sdk stub backend cannot produce frames because no SDK adapter is implemented"
                .into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_always_fails_with_actionable_message() {
        let mut backend = SdkStubBackend::new();
        let err = backend.connect().unwrap_err();
        assert!(matches!(err, LabOpsError::BackendConnect { .. }));
        assert_eq!(err.exit_code().as_i32(), 20);
        assert!(err.to_string().contains("SDK adapter"));
    }

    #[test]
    fn params_are_retained_for_diagnostics() {
        let mut backend = SdkStubBackend::new();
        backend.set_param("ExposureTime", "1200").unwrap();
        let dump = backend.dump_config();
        assert_eq!(dump.get("ExposureTime").map(String::as_str), Some("1200"));
        assert_eq!(dump.get("connected").map(String::as_str), Some("false"));
    }
}
