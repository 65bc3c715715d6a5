//! `run.json` writer.

use std::path::{Path, PathBuf};

use crate::artifacts::write_text_artifact;
use crate::core::errors::{LabOpsError, Result};
use crate::run::contract::RunInfo;

/// Serializes `run_info` as `<output_dir>/run.json`.
pub fn write_run_json(run_info: &RunInfo, output_dir: &Path) -> Result<PathBuf> {
    let body = serde_json::to_string(run_info).map_err(|e| LabOpsError::Serialization {
        context: "run.json",
        details: e.to_string(),
    })?;
    write_text_artifact(output_dir, "run.json", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::from_epoch_millis;
    use crate::run::contract::{RunConfig, RunTimestamps};

    #[test]
    fn writes_newline_terminated_run_json() {
        let dir = tempfile::tempdir().unwrap();
        let ts = from_epoch_millis(1_700_000_000_000);
        let run_info = RunInfo {
            run_id: "run-1".into(),
            config: RunConfig {
                scenario_id: "s".into(),
                backend: "sim".into(),
                seed: 1,
                duration_ms: 100,
            },
            real_device: None,
            webcam_device: None,
            timestamps: RunTimestamps {
                created_at: ts,
                started_at: ts,
                finished_at: ts,
            },
        };
        let path = write_run_json(&run_info, dir.path()).unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["config"]["duration_ms"], 100);
        assert_eq!(
            parsed["timestamps"]["started_at_utc"],
            "2023-11-14T22:13:20.000Z"
        );
    }
}
