//! `kb_draft.md` writer: a knowledge-base article skeleton drafted from an
//! existing run bundle so engineers can file findings without retyping
//! metrics.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::artifacts::write_text_artifact;
use crate::core::errors::{LabOpsError, Result};

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|e| LabOpsError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| LabOpsError::Parse {
        context: "bundle json",
        details: format!("{}: {e}", path.display()),
    })
}

/// Drafts `<bundle_dir>/kb_draft.md` from `run.json` + `metrics.json` (+
/// `summary.md` when present).
pub fn write_kb_draft(bundle_dir: &Path) -> Result<PathBuf> {
    let run_json_path = bundle_dir.join("run.json");
    let metrics_json_path = bundle_dir.join("metrics.json");
    if !run_json_path.is_file() || !metrics_json_path.is_file() {
        return Err(LabOpsError::Usage {
            details: format!(
                "bundle at {} is missing run.json/metrics.json",
                bundle_dir.display()
            ),
        });
    }
    let run_info = read_json(&run_json_path)?;
    let metrics = read_json(&metrics_json_path)?;

    let run_id = run_info["run_id"].as_str().unwrap_or("unknown");
    let scenario_id = run_info["config"]["scenario_id"].as_str().unwrap_or("unknown");
    let backend = run_info["config"]["backend"].as_str().unwrap_or("unknown");
    let summary_present = bundle_dir.join("summary.md").is_file();

    let mut out = String::from("# KB Draft\n\n");
    out.push_str("> Fill in symptom, root cause, and resolution before publishing.\n\n");
    out.push_str("## Observed Behavior\n\n");
    let _ = writeln!(out, "- run_id: `{run_id}`");
    let _ = writeln!(out, "- scenario_id: `{scenario_id}`");
    let _ = writeln!(out, "- backend: `{backend}`");
    out.push_str("- symptom: _describe what the user reported_\n\n");

    out.push_str("## Key Metrics\n\n| Metric | Value |\n| --- | --- |\n");
    for metric in [
        "avg_fps",
        "frames_total",
        "received_frames_total",
        "dropped_frames_total",
        "drop_rate_percent",
    ] {
        let _ = writeln!(out, "| {metric} | {} |", metrics[metric].clone());
    }

    out.push_str("\n## Evidence\n\n");
    let _ = writeln!(out, "- bundle: `{}`", bundle_dir.display());
    let _ = writeln!(out, "- run_json: `{}`", run_json_path.display());
    let _ = writeln!(out, "- metrics_json: `{}`", metrics_json_path.display());
    if summary_present {
        let _ = writeln!(out, "- summary_md: `{}`", bundle_dir.join("summary.md").display());
    }
    out.push_str("\n## Root Cause\n\n_unknown — attach diff evidence here_\n");
    out.push_str("\n## Resolution\n\n_unknown_\n");

    write_text_artifact(bundle_dir, "kb_draft.md", &out)
}
