//! `hostprobe.json` writer: a minimal host snapshot so every bundle records
//! where it was produced, including failure-path bundles.

use std::env;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::artifacts::write_text_artifact;
use crate::core::errors::{LabOpsError, Result};
use crate::core::time::format_utc_millis;

#[derive(Debug, Serialize)]
struct HostProbe {
    os: &'static str,
    arch: &'static str,
    working_dir: String,
    probed_at_utc: String,
}

/// Writes `<output_dir>/hostprobe.json`.
pub fn write_hostprobe_json(output_dir: &Path) -> Result<PathBuf> {
    let probe = HostProbe {
        os: env::consts::OS,
        arch: env::consts::ARCH,
        working_dir: env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        probed_at_utc: format_utc_millis(chrono::Utc::now()),
    };
    let body = serde_json::to_string(&probe).map_err(|e| LabOpsError::Serialization {
        context: "hostprobe.json",
        details: e.to_string(),
    })?;
    write_text_artifact(output_dir, "hostprobe.json", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostprobe_records_platform_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_hostprobe_json(dir.path()).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed["os"], env::consts::OS);
        assert!(parsed["probed_at_utc"].as_str().unwrap().ends_with('Z'));
    }
}
