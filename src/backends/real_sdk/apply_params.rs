//! Parameter-apply engine: symbolic scenario keys → typed node writes with
//! coercion, range clamping, enum normalization, and readback evidence.
//!
//! Per input, in caller order: resolve the node name, check node existence,
//! coerce the lexical value by node type, write to the node map, forward to
//! the backend, and read the node back into the evidence row. Strict mode
//! stops at the first unsupported setting; best-effort records it and
//! continues. A backend rejection is fatal in both modes because it signals
//! a real apply failure rather than an unsupported setting.

#![allow(missing_docs)]

use crate::backends::CameraBackend;
use crate::backends::real_sdk::node_map::{NodeMap, NodeNumericRange, NodeValueType};
use crate::backends::real_sdk::param_key_map::ParamKeyMap;
use crate::core::errors::LabOpsError;
use crate::scenario::{ApplyMode, ParamRequest};

/// Per-setting readback row captured after each apply attempt. This is the
/// canonical evidence record for "what was requested vs what the node model
/// actually holds", including unsupported and failed-apply cases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadbackRow {
    pub generic_key: String,
    pub node_name: Option<String>,
    pub requested_value: String,
    pub actual_value: Option<String>,
    pub supported: bool,
    pub applied: bool,
    pub adjusted: bool,
    pub reason: Option<String>,
}

/// One successfully applied parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedParam {
    pub generic_key: String,
    pub node_name: String,
    pub requested_value: String,
    pub applied_value: String,
    pub adjusted: bool,
    pub adjustment_reason: Option<String>,
}

/// One parameter that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedParam {
    pub generic_key: String,
    pub requested_value: String,
    pub reason: String,
}

/// Terminal failure of an apply pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyFailure {
    /// Strict mode hit an unsupported setting.
    Unsupported { generic_key: String, reason: String },
    /// The backend rejected a mapped write (fatal in every mode).
    Backend {
        generic_key: String,
        node_name: String,
        details: String,
    },
}

impl ApplyFailure {
    /// Converts the failure into the error surfaced to the caller.
    #[must_use]
    pub fn to_error(&self) -> LabOpsError {
        match self {
            Self::Unsupported {
                generic_key,
                reason,
            } => LabOpsError::ApplyUnsupported {
                key: generic_key.clone(),
                reason: reason.clone(),
            },
            Self::Backend {
                generic_key,
                node_name,
                details,
            } => LabOpsError::Runtime {
                details: format!(
                    "failed to set mapped backend parameter '{node_name}' for generic key '{generic_key}': {details}"
                ),
            },
        }
    }
}

/// Full apply-pass outcome. Rows recorded before a failure are retained so
/// evidence writers always see the partial trail.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub applied: Vec<AppliedParam>,
    pub unsupported: Vec<UnsupportedParam>,
    pub readback_rows: Vec<ReadbackRow>,
    pub failure: Option<ApplyFailure>,
}

impl ApplyReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

fn parse_bool_lexeme(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Some(true),
        "false" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn parse_int64_strict(raw: &str) -> Option<i64> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<i64>().ok()
}

fn parse_float64_strict(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Fixed-six-decimal formatting with trailing zeros trimmed, shared by clamp
/// reasons and readback values so evidence text stays stable.
#[must_use]
pub fn format_double(value: f64) -> String {
    let mut text = format!("{value:.6}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    if text.is_empty() || text == "-" {
        return "0".into();
    }
    text
}

fn format_range(range: NodeNumericRange) -> String {
    let min_text = range.min.map_or_else(|| "-inf".into(), format_double);
    let max_text = range.max.map_or_else(|| "+inf".into(), format_double);
    format!("[{min_text}, {max_text}]")
}

fn clamp_with_range(value: f64, range: NodeNumericRange) -> Option<(f64, String)> {
    let mut clamped = value;
    if let Some(min) = range.min {
        if clamped < min {
            clamped = min;
        }
    }
    if let Some(max) = range.max {
        if clamped > max {
            clamped = max;
        }
    }
    if (clamped - value).abs() < f64::EPSILON {
        return None;
    }
    let reason = format!(
        "clamped from {} to {} (allowed range {})",
        format_double(value),
        format_double(clamped),
        format_range(range)
    );
    Some((clamped, reason))
}

fn find_case_insensitive_enum_value(allowed: &[String], requested: &str) -> Option<String> {
    let requested_lower = requested.to_ascii_lowercase();
    allowed
        .iter()
        .find(|value| value.to_ascii_lowercase() == requested_lower)
        .cloned()
}

fn read_node_value_as_string(node_map: &NodeMap, node_name: &str) -> Result<String, String> {
    match node_map.node_type(node_name) {
        NodeValueType::Bool => node_map
            .try_get_bool(node_name)
            .map(|v| v.to_string())
            .ok_or_else(|| "failed to read bool value".into()),
        NodeValueType::Int64 => node_map
            .try_get_int64(node_name)
            .map(|v| v.to_string())
            .ok_or_else(|| "failed to read integer value".into()),
        NodeValueType::Float64 => node_map
            .try_get_float64(node_name)
            .map(format_double)
            .ok_or_else(|| "failed to read float value".into()),
        NodeValueType::String | NodeValueType::Enumeration => node_map
            .try_get_string(node_name)
            .ok_or_else(|| "failed to read string value".into()),
        NodeValueType::Unknown => Err("node value type is unknown".into()),
    }
}

// Centralized unsupported handling so strict and best-effort modes follow
// one code path.
fn record_unsupported(
    report: &mut ApplyReport,
    mode: ApplyMode,
    generic_key: &str,
    requested_value: &str,
    node_name: Option<&str>,
    supported: bool,
    reason: &str,
) {
    report.readback_rows.push(ReadbackRow {
        generic_key: generic_key.to_string(),
        node_name: node_name.map(ToString::to_string),
        requested_value: requested_value.to_string(),
        actual_value: None,
        supported,
        applied: false,
        adjusted: false,
        reason: Some(reason.to_string()),
    });
    report.unsupported.push(UnsupportedParam {
        generic_key: generic_key.to_string(),
        requested_value: requested_value.to_string(),
        reason: reason.to_string(),
    });
    if mode == ApplyMode::Strict {
        report.failure = Some(ApplyFailure::Unsupported {
            generic_key: generic_key.to_string(),
            reason: reason.to_string(),
        });
    }
}

enum CoercedWrite {
    Written { backend_value: String },
    Rejected { reason: String },
    Invalid { reason: String },
}

fn coerce_and_write(
    node_map: &mut NodeMap,
    node_name: &str,
    requested_value: &str,
    node_type: NodeValueType,
    adjustment: &mut Option<String>,
) -> CoercedWrite {
    match node_type {
        NodeValueType::Bool => {
            let Some(parsed) = parse_bool_lexeme(requested_value) else {
                return CoercedWrite::Invalid {
                    reason: "expected boolean value".into(),
                };
            };
            match node_map.try_set_bool(node_name, parsed) {
                Ok(()) => CoercedWrite::Written {
                    backend_value: parsed.to_string(),
                },
                Err(e) => CoercedWrite::Rejected {
                    reason: rejection_reason(&e, "node rejected bool value"),
                },
            }
        }
        NodeValueType::Int64 => {
            let Some(mut parsed) = parse_int64_strict(requested_value) else {
                return CoercedWrite::Invalid {
                    reason: "expected integer value".into(),
                };
            };
            if let Some(range) = node_map.try_get_numeric_range(node_name) {
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
                if let Some((clamped, reason)) = clamp_with_range(parsed as f64, range) {
                    parsed = clamped.round() as i64;
                    *adjustment = Some(reason);
                }
            }
            match node_map.try_set_int64(node_name, parsed) {
                Ok(()) => CoercedWrite::Written {
                    backend_value: parsed.to_string(),
                },
                Err(e) => CoercedWrite::Rejected {
                    reason: rejection_reason(&e, "node rejected integer value"),
                },
            }
        }
        NodeValueType::Float64 => {
            let Some(mut parsed) = parse_float64_strict(requested_value) else {
                return CoercedWrite::Invalid {
                    reason: "expected floating-point value".into(),
                };
            };
            if let Some(range) = node_map.try_get_numeric_range(node_name) {
                if let Some((clamped, reason)) = clamp_with_range(parsed, range) {
                    parsed = clamped;
                    *adjustment = Some(reason);
                }
            }
            match node_map.try_set_float64(node_name, parsed) {
                Ok(()) => CoercedWrite::Written {
                    backend_value: format_double(parsed),
                },
                Err(e) => CoercedWrite::Rejected {
                    reason: rejection_reason(&e, "node rejected float value"),
                },
            }
        }
        NodeValueType::Enumeration | NodeValueType::String => {
            let mut normalized = requested_value.to_string();
            if node_type == NodeValueType::Enumeration {
                let allowed = node_map.list_enum_values(node_name);
                if let Some(canonical) = find_case_insensitive_enum_value(&allowed, requested_value)
                {
                    if canonical != requested_value {
                        normalized = canonical;
                        *adjustment = Some("normalized enumeration value casing".into());
                    }
                }
            }
            match node_map.try_set_string(node_name, &normalized) {
                Ok(()) => CoercedWrite::Written {
                    backend_value: normalized,
                },
                Err(e) => CoercedWrite::Rejected {
                    reason: rejection_reason(&e, "node rejected string value"),
                },
            }
        }
        NodeValueType::Unknown => CoercedWrite::Invalid {
            reason: "node value type is unknown".into(),
        },
    }
}

fn rejection_reason(error: &LabOpsError, fallback: &str) -> String {
    let text = match error {
        LabOpsError::Runtime { details } => details.clone(),
        other => other.to_string(),
    };
    if text.is_empty() { fallback.into() } else { text }
}

/// Applies generic scenario parameters to the backend.
///
/// Inputs are processed in caller order; the engine never reorders. For
/// region-of-interest knobs callers are expected to list width and height
/// before offsets.
pub fn apply_params(
    backend: &mut CameraBackend,
    key_map: &ParamKeyMap,
    node_map: &mut NodeMap,
    params: &[ParamRequest],
    mode: ApplyMode,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    for input in params {
        let generic_key = input.key.trim();
        if generic_key.is_empty() {
            continue;
        }
        let requested_value = input.value.as_str();

        let Some(node_name) = key_map.resolve(generic_key).map(ToString::to_string) else {
            record_unsupported(
                &mut report,
                mode,
                generic_key,
                requested_value,
                None,
                false,
                "no generic->node mapping was found",
            );
            if report.failure.is_some() {
                return report;
            }
            continue;
        };

        if !node_map.has(&node_name) {
            record_unsupported(
                &mut report,
                mode,
                generic_key,
                requested_value,
                Some(&node_name),
                false,
                &format!("mapped SDK node '{node_name}' is not available"),
            );
            if report.failure.is_some() {
                return report;
            }
            continue;
        }

        let node_type = node_map.node_type(&node_name);
        let mut adjustment: Option<String> = None;
        let write = coerce_and_write(
            node_map,
            &node_name,
            requested_value,
            node_type,
            &mut adjustment,
        );

        let backend_value = match write {
            CoercedWrite::Written { backend_value } => backend_value,
            CoercedWrite::Rejected { reason } | CoercedWrite::Invalid { reason } => {
                // Unknown node type counts as unsupported outright; every
                // other path got far enough to call the setting supported.
                let supported = node_type != NodeValueType::Unknown;
                record_unsupported(
                    &mut report,
                    mode,
                    generic_key,
                    requested_value,
                    Some(&node_name),
                    supported,
                    &reason,
                );
                if report.failure.is_some() {
                    return report;
                }
                continue;
            }
        };

        if let Err(backend_error) = backend.set_param(&node_name, &backend_value) {
            let details = rejection_reason(&backend_error, "backend rejected value");
            report.readback_rows.push(ReadbackRow {
                generic_key: generic_key.to_string(),
                node_name: Some(node_name.clone()),
                requested_value: requested_value.to_string(),
                actual_value: None,
                supported: true,
                applied: false,
                adjusted: adjustment.is_some(),
                reason: Some(format!("backend rejected mapped value: {details}")),
            });
            report.failure = Some(ApplyFailure::Backend {
                generic_key: generic_key.to_string(),
                node_name,
                details,
            });
            return report;
        }

        let mut row = ReadbackRow {
            generic_key: generic_key.to_string(),
            node_name: Some(node_name.clone()),
            requested_value: requested_value.to_string(),
            actual_value: None,
            supported: true,
            applied: true,
            adjusted: adjustment.is_some(),
            reason: adjustment.clone(),
        };
        match read_node_value_as_string(node_map, &node_name) {
            Ok(actual) => row.actual_value = Some(actual),
            Err(readback_error) => {
                let appended = match row.reason.take() {
                    Some(existing) => format!("{existing}; readback unavailable: {readback_error}"),
                    None => format!("readback unavailable: {readback_error}"),
                };
                row.reason = Some(appended);
            }
        }
        report.readback_rows.push(row);

        report.applied.push(AppliedParam {
            generic_key: generic_key.to_string(),
            node_name,
            requested_value: requested_value.to_string(),
            applied_value: backend_value,
            adjusted: adjustment.is_some(),
            adjustment_reason: adjustment,
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::real_sdk::node_map::default_node_map;
    use crate::scenario::BackendKind;

    fn test_key_map() -> ParamKeyMap {
        ParamKeyMap::from_text(
            r#"{
                "exposure_us": "ExposureTime",
                "gain_db": "Gain",
                "pixel_format": "PixelFormat",
                "trigger_mode": "TriggerMode",
                "fps": "AcquisitionFrameRate",
                "ghost": "MissingNode"
            }"#,
        )
        .unwrap()
    }

    fn request(key: &str, value: &str) -> ParamRequest {
        ParamRequest {
            key: key.into(),
            value: value.into(),
        }
    }

    fn run_apply(params: &[ParamRequest], mode: ApplyMode) -> ApplyReport {
        let mut backend = CameraBackend::create(BackendKind::Sim);
        let key_map = test_key_map();
        let mut node_map = default_node_map();
        apply_params(&mut backend, &key_map, &mut node_map, params, mode)
    }

    #[test]
    fn applies_and_reads_back_typed_values() {
        let report = run_apply(
            &[request("exposure_us", "2500"), request("gain_db", "3.5")],
            ApplyMode::Strict,
        );
        assert!(report.succeeded());
        assert_eq!(report.applied.len(), 2);
        let row = &report.readback_rows[0];
        assert!(row.supported && row.applied && !row.adjusted);
        assert_eq!(row.actual_value.as_deref(), Some("2500"));
        assert!(row.reason.is_none());
    }

    #[test]
    fn missing_mapping_is_unsupported_and_strict_fails() {
        let report = run_apply(&[request("unknown_key", "1")], ApplyMode::Strict);
        assert!(!report.succeeded());
        let row = &report.readback_rows[0];
        assert!(!row.supported && !row.applied);
        assert_eq!(
            row.reason.as_deref(),
            Some("no generic->node mapping was found")
        );
        let err = report.failure.unwrap().to_error();
        assert!(err.to_string().contains("unsupported parameter 'unknown_key'"));
    }

    #[test]
    fn missing_node_is_unsupported_best_effort_continues() {
        let report = run_apply(
            &[request("ghost", "1"), request("gain_db", "2")],
            ApplyMode::BestEffort,
        );
        assert!(report.succeeded());
        assert_eq!(report.unsupported.len(), 1);
        assert!(
            report.unsupported[0]
                .reason
                .contains("mapped SDK node 'MissingNode' is not available")
        );
        assert_eq!(report.applied.len(), 1);
    }

    #[test]
    fn out_of_range_values_are_clamped_and_marked_adjusted() {
        let report = run_apply(&[request("gain_db", "99")], ApplyMode::Strict);
        assert!(report.succeeded());
        let row = &report.readback_rows[0];
        assert!(row.adjusted && row.applied && row.supported);
        assert_eq!(
            row.reason.as_deref(),
            Some("clamped from 99 to 48 (allowed range [0, 48])")
        );
        assert_eq!(row.actual_value.as_deref(), Some("48"));
    }

    #[test]
    fn enum_casing_is_normalized_and_marked_adjusted() {
        let report = run_apply(&[request("pixel_format", "Mono8")], ApplyMode::Strict);
        assert!(report.succeeded());
        let row = &report.readback_rows[0];
        assert!(row.adjusted);
        assert_eq!(
            row.reason.as_deref(),
            Some("normalized enumeration value casing")
        );
        assert_eq!(row.actual_value.as_deref(), Some("mono8"));
    }

    #[test]
    fn unknown_enum_value_is_unsupported() {
        let report = run_apply(&[request("trigger_mode", "warp_drive")], ApplyMode::BestEffort);
        assert!(report.succeeded());
        let row = &report.readback_rows[0];
        assert!(row.supported && !row.applied);
        assert!(row.reason.as_deref().unwrap().contains("not supported"));
    }

    #[test]
    fn invalid_bool_lexeme_reports_expected_boolean() {
        let mut backend = CameraBackend::create(BackendKind::Sim);
        let key_map = ParamKeyMap::from_text(r#"{"flip": "ReverseX"}"#).unwrap();
        let mut node_map = NodeMap::new();
        node_map.upsert_node(
            "ReverseX",
            crate::backends::real_sdk::node_map::NodeDefinition {
                value_type: NodeValueType::Bool,
                bool_value: Some(false),
                ..Default::default()
            },
        );
        let report = apply_params(
            &mut backend,
            &key_map,
            &mut node_map,
            &[request("flip", "maybe")],
            ApplyMode::BestEffort,
        );
        let row = &report.readback_rows[0];
        assert!(row.supported && !row.applied);
        assert_eq!(row.reason.as_deref(), Some("expected boolean value"));

        let report = apply_params(
            &mut backend,
            &key_map,
            &mut node_map,
            &[request("flip", " ON ")],
            ApplyMode::Strict,
        );
        assert!(report.succeeded());
        assert_eq!(report.readback_rows[0].actual_value.as_deref(), Some("true"));
    }

    #[test]
    fn readback_rows_keep_input_order_and_invariants() {
        let report = run_apply(
            &[
                request("exposure_us", "100"),
                request("unknown_key", "1"),
                request("gain_db", "999"),
            ],
            ApplyMode::BestEffort,
        );
        let keys: Vec<&str> = report
            .readback_rows
            .iter()
            .map(|r| r.generic_key.as_str())
            .collect();
        assert_eq!(keys, vec!["exposure_us", "unknown_key", "gain_db"]);
        for row in &report.readback_rows {
            if row.applied {
                assert!(row.supported, "applied implies supported");
            }
            if !row.supported {
                assert!(!row.applied, "unsupported implies not applied");
            }
            if row.adjusted {
                assert!(row.applied && row.supported);
            }
            if !row.supported || !row.applied || row.adjusted {
                assert!(
                    row.reason.as_deref().is_some_and(|r| !r.is_empty()),
                    "reason required for {}",
                    row.generic_key
                );
            }
        }
    }
}
