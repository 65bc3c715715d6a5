//! Scenario JSON loading and per-field validation.
//!
//! The scenario document is the single input to a run: identity, duration,
//! camera settings, fault injection, thresholds, and optional backend
//! parameter requests. Validation reports one actionable diagnostic per
//! failing field (`invalid scenario: <path-field>: <reason>`). Unknown keys
//! are ignored so fixtures can carry annotations without breaking older
//! binaries.

#![allow(missing_docs)]

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::errors::{LabOpsError, Result};

/// Backend selector recognized by the run pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Sim,
    Webcam,
    Real,
    SdkStub,
}

impl BackendKind {
    /// Stable name used in `run.json` and CLI arguments.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sim => "sim",
            Self::Webcam => "webcam",
            Self::Real => "real",
            Self::SdkStub => "sdk_stub",
        }
    }

    /// Parses a backend name.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "sim" => Ok(Self::Sim),
            "webcam" => Ok(Self::Webcam),
            "real" => Ok(Self::Real),
            "sdk_stub" => Ok(Self::SdkStub),
            other => Err(LabOpsError::schema(
                "backend",
                format!("unknown backend '{other}' (expected sim, webcam, real, sdk_stub)"),
            )),
        }
    }
}

/// How unsupported parameters are handled while applying scenario params.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyMode {
    #[default]
    Strict,
    BestEffort,
}

impl ApplyMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::BestEffort => "best_effort",
        }
    }

    /// Parses an apply mode; empty input selects strict.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "strict" => Ok(Self::Strict),
            "best_effort" | "best-effort" => Ok(Self::BestEffort),
            _ => Err(LabOpsError::schema(
                "apply_mode",
                "must be one of: strict, best_effort",
            )),
        }
    }
}

/// Fault injection knobs controlled by scenario-level config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimFaults {
    pub seed: u64,
    pub jitter_us: u32,
    pub drop_every_n: u32,
    /// 0..=100
    pub drop_percent: u32,
    pub burst_drop: u32,
    pub reorder: u32,
}

/// One requested backend parameter (symbolic key + lexical value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRequest {
    pub key: String,
    pub value: String,
}

/// Optional region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiConfig {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Pass/fail thresholds evaluated after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Thresholds {
    pub min_avg_fps: Option<f64>,
    pub max_drop_rate_percent: Option<f64>,
}

/// Validated scenario configuration consumed by the run pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub scenario_id: String,
    pub backend: BackendKind,
    pub duration_ms: u64,
    pub fps: u32,
    pub pixel_format: Option<String>,
    pub trigger_mode: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub roi: Option<RoiConfig>,
    pub thresholds: Thresholds,
    pub sim_faults: SimFaults,
    pub apply_mode: ApplyMode,
    pub params: Vec<ParamRequest>,
}

impl ScenarioConfig {
    /// The seed driving every deterministic decision in the run.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.sim_faults.seed
    }
}

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").unwrap())
}

fn field_as_object<'a>(value: &'a Value, field: &str) -> Result<&'a serde_json::Map<String, Value>> {
    value
        .get(field)
        .ok_or_else(|| LabOpsError::schema(field, "required object is missing"))?
        .as_object()
        .ok_or_else(|| LabOpsError::schema(field, "must be a JSON object"))
}

fn optional_u64(object: &Value, path: &str, key: &str) -> Result<Option<u64>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            LabOpsError::schema(format!("{path}.{key}"), "must be a non-negative integer")
        }),
    }
}

fn optional_i64(object: &Value, path: &str, key: &str) -> Result<Option<i64>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| LabOpsError::schema(format!("{path}.{key}"), "must be an integer")),
    }
}

fn optional_f64(object: &Value, path: &str, key: &str) -> Result<Option<f64>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let parsed = value.as_f64().ok_or_else(|| {
                LabOpsError::schema(format!("{path}.{key}"), "must be a number")
            })?;
            if !parsed.is_finite() {
                return Err(LabOpsError::schema(
                    format!("{path}.{key}"),
                    "must be finite",
                ));
            }
            Ok(Some(parsed))
        }
    }
}

fn optional_string(object: &Value, path: &str, key: &str) -> Result<Option<String>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| LabOpsError::schema(format!("{path}.{key}"), "must be a string")),
    }
}

fn parse_scenario_id(root: &Value) -> Result<String> {
    let raw = root
        .get("scenario_id")
        .ok_or_else(|| LabOpsError::schema("scenario_id", "required field is missing"))?;
    let text = raw
        .as_str()
        .ok_or_else(|| LabOpsError::schema("scenario_id", "must be a string"))?;
    if text.is_empty() {
        return Err(LabOpsError::schema("scenario_id", "must not be empty"));
    }
    if !slug_pattern().is_match(text) {
        return Err(LabOpsError::schema(
            "scenario_id",
            "must be slug-like (alphanumerics, '_' and '-')",
        ));
    }
    Ok(text.to_string())
}

fn parse_sim_faults(root: &Value) -> Result<SimFaults> {
    let Some(section) = root.get("sim_faults") else {
        return Ok(SimFaults {
            seed: 1,
            ..SimFaults::default()
        });
    };
    if !section.is_object() {
        return Err(LabOpsError::schema("sim_faults", "must be a JSON object"));
    }

    let to_u32 = |value: Option<u64>, field: &str| -> Result<u32> {
        match value {
            None => Ok(0),
            Some(v) => u32::try_from(v).map_err(|_| {
                LabOpsError::schema(format!("sim_faults.{field}"), "value is out of range")
            }),
        }
    };

    let faults = SimFaults {
        seed: optional_u64(section, "sim_faults", "seed")?.unwrap_or(1),
        jitter_us: to_u32(optional_u64(section, "sim_faults", "jitter_us")?, "jitter_us")?,
        drop_every_n: to_u32(
            optional_u64(section, "sim_faults", "drop_every_n")?,
            "drop_every_n",
        )?,
        drop_percent: to_u32(
            optional_u64(section, "sim_faults", "drop_percent")?,
            "drop_percent",
        )?,
        burst_drop: to_u32(optional_u64(section, "sim_faults", "burst_drop")?, "burst_drop")?,
        reorder: to_u32(optional_u64(section, "sim_faults", "reorder")?, "reorder")?,
    };

    if faults.drop_percent > 100 {
        return Err(LabOpsError::schema(
            "sim_faults.drop_percent",
            "must be in range [0, 100]",
        ));
    }
    Ok(faults)
}

fn parse_roi(camera: &Value) -> Result<Option<RoiConfig>> {
    let Some(section) = camera.get("roi") else {
        return Ok(None);
    };
    if !section.is_object() {
        return Err(LabOpsError::schema("camera.roi", "must be a JSON object"));
    }
    let read = |key: &str| -> Result<i64> {
        optional_i64(section, "camera.roi", key)?.ok_or_else(|| {
            LabOpsError::schema(format!("camera.roi.{key}"), "required field is missing")
        })
    };
    Ok(Some(RoiConfig {
        x: read("x")?,
        y: read("y")?,
        width: read("width")?,
        height: read("height")?,
    }))
}

fn parse_params(root: &Value) -> Result<Vec<ParamRequest>> {
    let Some(section) = root.get("params") else {
        return Ok(Vec::new());
    };
    let entries = section
        .as_array()
        .ok_or_else(|| LabOpsError::schema("params", "must be an array of {key, value} objects"))?;

    let mut params = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let path = format!("params[{index}]");
        let key = optional_string(entry, &path, "key")?
            .ok_or_else(|| LabOpsError::schema(format!("{path}.key"), "required field is missing"))?;
        if key.is_empty() {
            return Err(LabOpsError::schema(format!("{path}.key"), "must not be empty"));
        }
        let value = optional_string(entry, &path, "value")?.ok_or_else(|| {
            LabOpsError::schema(format!("{path}.value"), "required field is missing")
        })?;
        params.push(ParamRequest { key, value });
    }
    Ok(params)
}

/// Parses and validates scenario JSON text.
pub fn parse_scenario_text(text: &str) -> Result<ScenarioConfig> {
    let root: Value = serde_json::from_str(text).map_err(|e| LabOpsError::Parse {
        context: "scenario json",
        details: e.to_string(),
    })?;
    if !root.is_object() {
        return Err(LabOpsError::schema("<root>", "must be a JSON object"));
    }

    let scenario_id = parse_scenario_id(&root)?;

    let duration = field_as_object(&root, "duration")?;
    let duration_ms = duration
        .get("duration_ms")
        .and_then(Value::as_u64)
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            LabOpsError::schema("duration.duration_ms", "must be a positive integer")
        })?;

    let camera_section = root
        .get("camera")
        .ok_or_else(|| LabOpsError::schema("camera", "required object is missing"))?;
    if !camera_section.is_object() {
        return Err(LabOpsError::schema("camera", "must be a JSON object"));
    }
    let fps_raw = optional_u64(camera_section, "camera", "fps")?
        .ok_or_else(|| LabOpsError::schema("camera.fps", "must be a positive integer"))?;
    let fps = u32::try_from(fps_raw)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| LabOpsError::schema("camera.fps", "must be a positive integer"))?;

    let thresholds_section = root
        .get("thresholds")
        .ok_or_else(|| LabOpsError::schema("thresholds", "required object is missing"))?;
    if !thresholds_section.is_object() {
        return Err(LabOpsError::schema("thresholds", "must be a JSON object"));
    }
    let thresholds = Thresholds {
        min_avg_fps: optional_f64(thresholds_section, "thresholds", "min_avg_fps")?,
        max_drop_rate_percent: optional_f64(
            thresholds_section,
            "thresholds",
            "max_drop_rate_percent",
        )?,
    };

    let backend = match optional_string(&root, "<root>", "backend")? {
        Some(name) => BackendKind::parse(&name)?,
        None => BackendKind::Sim,
    };

    let apply_mode = match optional_string(&root, "<root>", "apply_mode")? {
        Some(raw) => ApplyMode::parse(&raw)?,
        None => ApplyMode::Strict,
    };

    Ok(ScenarioConfig {
        scenario_id,
        backend,
        duration_ms,
        fps,
        pixel_format: optional_string(camera_section, "camera", "pixel_format")?,
        trigger_mode: optional_string(camera_section, "camera", "trigger_mode")?,
        width: optional_i64(camera_section, "camera", "width")?,
        height: optional_i64(camera_section, "camera", "height")?,
        roi: parse_roi(camera_section)?,
        thresholds,
        sim_faults: parse_sim_faults(&root)?,
        apply_mode,
        params: parse_params(&root)?,
    })
}

/// Loads and validates a scenario file.
///
/// Filesystem-level problems (missing file, wrong extension, empty file)
/// are reported as IO/usage failures; only structural problems inside the
/// document use the schema-invalid classification.
pub fn load_scenario_file(path: &Path) -> Result<ScenarioConfig> {
    if path.as_os_str().is_empty() {
        return Err(LabOpsError::Usage {
            details: "scenario path cannot be empty".into(),
        });
    }
    if !path.is_file() {
        return Err(LabOpsError::Usage {
            details: format!("scenario file not found: {}", path.display()),
        });
    }
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return Err(LabOpsError::Usage {
            details: format!("scenario file must use .json extension: {}", path.display()),
        });
    }

    let text = fs::read_to_string(path).map_err(|e| LabOpsError::io(path, e))?;
    if text.trim().is_empty() {
        return Err(LabOpsError::Usage {
            details: format!("scenario file is empty: {}", path.display()),
        });
    }
    parse_scenario_text(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_scenario() -> String {
        r#"{
            "scenario_id": "baseline_sim",
            "duration": { "duration_ms": 800 },
            "camera": { "fps": 25 },
            "thresholds": { "min_avg_fps": 1.0 }
        }"#
        .to_string()
    }

    #[test]
    fn parses_minimal_scenario_with_defaults() {
        let config = parse_scenario_text(&minimal_scenario()).unwrap();
        assert_eq!(config.scenario_id, "baseline_sim");
        assert_eq!(config.backend, BackendKind::Sim);
        assert_eq!(config.duration_ms, 800);
        assert_eq!(config.fps, 25);
        assert_eq!(config.sim_faults.seed, 1);
        assert_eq!(config.apply_mode, ApplyMode::Strict);
        assert_eq!(config.thresholds.min_avg_fps, Some(1.0));
    }

    #[test]
    fn missing_scenario_id_is_schema_invalid() {
        let err = parse_scenario_text(
            r#"{"duration": {"duration_ms": 100}, "camera": {"fps": 30}, "thresholds": {}}"#,
        )
        .unwrap_err();
        assert_eq!(err.exit_code().as_i32(), 10);
        assert!(err.to_string().contains("scenario_id:"));
    }

    #[test]
    fn rejects_non_slug_scenario_id() {
        let err = parse_scenario_text(
            r#"{"scenario_id": "bad id!", "duration": {"duration_ms": 100},
                "camera": {"fps": 30}, "thresholds": {}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("slug-like"));
    }

    #[test]
    fn rejects_zero_duration() {
        let err = parse_scenario_text(
            r#"{"scenario_id": "x", "duration": {"duration_ms": 0},
                "camera": {"fps": 30}, "thresholds": {}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duration.duration_ms"));
    }

    #[test]
    fn rejects_drop_percent_above_100() {
        let err = parse_scenario_text(
            r#"{"scenario_id": "x", "duration": {"duration_ms": 100},
                "camera": {"fps": 30}, "thresholds": {},
                "sim_faults": {"drop_percent": 101}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("sim_faults.drop_percent"));
    }

    #[test]
    fn parses_faults_params_and_roi() {
        let config = parse_scenario_text(
            r#"{
                "scenario_id": "full",
                "backend": "real",
                "apply_mode": "best_effort",
                "duration": { "duration_ms": 500 },
                "camera": {
                    "fps": 30, "pixel_format": "mono8", "trigger_mode": "free_run",
                    "width": 1920, "height": 1080,
                    "roi": { "x": 0, "y": 0, "width": 960, "height": 540 }
                },
                "thresholds": { "max_drop_rate_percent": 5.0 },
                "sim_faults": { "seed": 42, "jitter_us": 150, "drop_every_n": 10 },
                "params": [
                    { "key": "exposure_us", "value": "1200" },
                    { "key": "gain_db", "value": "3.5" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Real);
        assert_eq!(config.apply_mode, ApplyMode::BestEffort);
        assert_eq!(config.sim_faults.seed, 42);
        assert_eq!(config.roi.unwrap().width, 960);
        assert_eq!(config.params.len(), 2);
        assert_eq!(config.params[0].key, "exposure_us");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let text = minimal_scenario().replace(
            "\"thresholds\"",
            "\"future_extension\": {\"x\": 1}, \"thresholds\"",
        );
        assert!(parse_scenario_text(&text).is_ok());
    }
}
