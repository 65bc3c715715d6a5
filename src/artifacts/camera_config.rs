//! Real-backend configuration evidence writers: `camera_config.json`,
//! `config_report.md`, and `config_verify.json`.
//!
//! All three are views over the same readback rows. The JSON documents are
//! for machines (curated per-key state, raw dump, verify counts); the
//! Markdown report is the human table with one status glyph per key.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::artifacts::write_text_artifact;
use crate::backends::BackendConfig;
use crate::backends::real_sdk::apply_params::{ApplyReport, ReadbackRow};
use crate::backends::real_sdk::param_key_map::ParamKeyMap;
use crate::core::errors::{LabOpsError, Result};
use crate::run::contract::RunInfo;
use crate::scenario::ApplyMode;

#[derive(Debug, Serialize)]
struct CuratedRow<'a> {
    generic_key: &'a str,
    node_name: Option<&'a str>,
    requested: Option<&'a str>,
    actual: Option<&'a str>,
    supported: bool,
    applied: bool,
    adjusted: bool,
    missing: bool,
    reason: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CameraConfigDoc<'a> {
    schema_version: &'static str,
    run_id: &'a str,
    scenario_id: &'a str,
    backend: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<IdentityDoc<'a>>,
    curated: Vec<CuratedRow<'a>>,
    raw_backend_dump: &'a BTreeMap<String, String>,
    missing_keys: Vec<&'a str>,
    unsupported_keys: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct IdentityDoc<'a> {
    model: &'a str,
    serial: &'a str,
    transport: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    firmware_version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sdk_version: Option<&'a str>,
}

fn last_row_for_key<'a>(rows: &'a [ReadbackRow], generic_key: &str) -> Option<&'a ReadbackRow> {
    rows.iter().rev().find(|row| row.generic_key == generic_key)
}

/// Writes `<output_dir>/camera_config.json`: identity, curated per-key
/// readback in lexicographic key order, raw backend dump, and missing /
/// unsupported key lists.
pub fn write_camera_config_json(
    run_info: &RunInfo,
    key_map: &ParamKeyMap,
    apply_report: &ApplyReport,
    backend_dump: &BackendConfig,
    output_dir: &Path,
) -> Result<PathBuf> {
    let mut curated = Vec::new();
    let mut missing_keys = Vec::new();
    let mut unsupported_keys = Vec::new();

    let generic_keys = key_map.list_generic_keys();
    for generic_key in &generic_keys {
        match last_row_for_key(&apply_report.readback_rows, generic_key) {
            Some(row) => {
                if !row.supported {
                    unsupported_keys.push(generic_key.as_str());
                }
                curated.push(CuratedRow {
                    generic_key,
                    node_name: row.node_name.as_deref(),
                    requested: Some(row.requested_value.as_str()),
                    actual: row.actual_value.as_deref(),
                    supported: row.supported,
                    applied: row.applied,
                    adjusted: row.adjusted,
                    missing: false,
                    reason: row.reason.as_deref(),
                });
            }
            None => {
                missing_keys.push(generic_key.as_str());
                curated.push(CuratedRow {
                    generic_key,
                    node_name: key_map.resolve(generic_key),
                    requested: None,
                    actual: None,
                    supported: false,
                    applied: false,
                    adjusted: false,
                    missing: true,
                    reason: None,
                });
            }
        }
    }

    let identity = run_info.real_device.as_ref().map(|device| IdentityDoc {
        model: &device.model,
        serial: &device.serial,
        transport: &device.transport,
        firmware_version: device.firmware_version.as_deref(),
        sdk_version: device.sdk_version.as_deref(),
    });

    let doc = CameraConfigDoc {
        schema_version: "1.0",
        run_id: &run_info.run_id,
        scenario_id: &run_info.config.scenario_id,
        backend: &run_info.config.backend,
        identity,
        curated,
        raw_backend_dump: backend_dump,
        missing_keys,
        unsupported_keys,
    };
    let body = serde_json::to_string(&doc).map_err(|e| LabOpsError::Serialization {
        context: "camera_config.json",
        details: e.to_string(),
    })?;
    write_text_artifact(output_dir, "camera_config.json", &body)
}

fn status_glyph(row: &ReadbackRow) -> &'static str {
    if !row.supported || !row.applied {
        return "❌";
    }
    if row.adjusted {
        return "⚠";
    }
    "✅"
}

/// Writes `<output_dir>/config_report.md`: the human per-key table.
pub fn write_config_report_markdown(
    run_info: &RunInfo,
    key_map: &ParamKeyMap,
    apply_report: &ApplyReport,
    output_dir: &Path,
) -> Result<PathBuf> {
    let mut out = String::from("# Camera Config Report\n\n");
    let _ = writeln!(out, "- run_id: `{}`", run_info.run_id);
    let _ = writeln!(out, "- scenario_id: `{}`", run_info.config.scenario_id);
    let _ = writeln!(out, "- backend: `{}`\n", run_info.config.backend);

    out.push_str("| Key | Node | Requested | Actual | Status | Reason |\n");
    out.push_str("| --- | --- | --- | --- | :-: | --- |\n");
    let mut missing = Vec::new();
    for generic_key in key_map.list_generic_keys() {
        let Some(row) = last_row_for_key(&apply_report.readback_rows, &generic_key) else {
            missing.push(generic_key);
            continue;
        };
        let _ = writeln!(
            out,
            "| `{}` | `{}` | `{}` | `{}` | {} | {} |",
            generic_key,
            row.node_name.as_deref().unwrap_or("-"),
            row.requested_value,
            row.actual_value.as_deref().unwrap_or("-"),
            status_glyph(row),
            row.reason.as_deref().unwrap_or("")
        );
    }

    out.push_str("\n## Missing Keys\n\n");
    if missing.is_empty() {
        out.push_str("- None; every mapped key has a recorded apply attempt.\n");
    } else {
        for key in missing {
            let _ = writeln!(out, "- `{key}` was not requested by the scenario.");
        }
    }

    write_text_artifact(output_dir, "config_report.md", &out)
}

#[derive(Debug, Serialize)]
struct VerifyRow<'a> {
    generic_key: &'a str,
    node_name: Option<&'a str>,
    requested: &'a str,
    actual: Option<&'a str>,
    supported: bool,
    applied: bool,
    adjusted: bool,
    reason: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct VerifySummary {
    requested_count: usize,
    supported_count: usize,
    unsupported_count: usize,
    applied_count: usize,
    unapplied_count: usize,
    adjusted_count: usize,
}

#[derive(Debug, Serialize)]
struct ConfigVerifyDoc<'a> {
    schema_version: &'static str,
    run_id: &'a str,
    scenario_id: &'a str,
    backend: &'a str,
    apply_mode: &'static str,
    summary: VerifySummary,
    rows: Vec<VerifyRow<'a>>,
}

/// Writes `<output_dir>/config_verify.json`: machine summary of apply and
/// readback counts plus every row in input order.
pub fn write_config_verify_json(
    run_info: &RunInfo,
    apply_report: &ApplyReport,
    apply_mode: ApplyMode,
    output_dir: &Path,
) -> Result<PathBuf> {
    let rows = &apply_report.readback_rows;
    let supported_count = rows.iter().filter(|r| r.supported).count();
    let applied_count = rows.iter().filter(|r| r.applied).count();
    let adjusted_count = rows.iter().filter(|r| r.adjusted).count();

    let doc = ConfigVerifyDoc {
        schema_version: "1.0",
        run_id: &run_info.run_id,
        scenario_id: &run_info.config.scenario_id,
        backend: &run_info.config.backend,
        apply_mode: apply_mode.as_str(),
        summary: VerifySummary {
            requested_count: rows.len(),
            supported_count,
            unsupported_count: rows.len() - supported_count,
            applied_count,
            unapplied_count: rows.len() - applied_count,
            adjusted_count,
        },
        rows: rows
            .iter()
            .map(|row| VerifyRow {
                generic_key: &row.generic_key,
                node_name: row.node_name.as_deref(),
                requested: &row.requested_value,
                actual: row.actual_value.as_deref(),
                supported: row.supported,
                applied: row.applied,
                adjusted: row.adjusted,
                reason: row.reason.as_deref(),
            })
            .collect(),
    };
    let body = serde_json::to_string(&doc).map_err(|e| LabOpsError::Serialization {
        context: "config_verify.json",
        details: e.to_string(),
    })?;
    write_text_artifact(output_dir, "config_verify.json", &body)
}
