//! OAAT scenario variant generation.
//!
//! Each variant deep-copies the base scenario and mutates exactly one
//! playbook knob, read-before-write, leaving every other field untouched.
//! Variants land next to a manifest that records knob, path, and the
//! lexical before/after values.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::agent::playbook::{Playbook, select_playbook_for_symptom};
use crate::artifacts::write_text_artifact;
use crate::core::errors::{LabOpsError, Result};

/// One generated scenario variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioVariant {
    pub knob_name: String,
    pub knob_path: String,
    pub before_value: String,
    pub after_value: String,
    pub scenario_path: PathBuf,
}

/// Request contract for variant generation.
#[derive(Debug, Clone)]
pub struct VariantGenerationRequest {
    pub base_scenario_path: PathBuf,
    pub symptom: String,
    pub output_dir: PathBuf,
}

/// Result contract exposed to orchestrators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantGenerationResult {
    pub playbook_id: String,
    pub output_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub variants: Vec<ScenarioVariant>,
}

fn read_integer_at_path(root: &Value, path: &[&str]) -> Option<i64> {
    let mut cursor = root;
    for key in path {
        cursor = cursor.get(key)?;
    }
    cursor.as_i64()
}

fn as_object_coercing(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        // Unreachable: the line above replaced any non-object.
        _ => unreachable!("value was just coerced to an object"),
    }
}

fn set_integer_at_path(root: &mut Value, path: &[&str], value: i64) {
    let mut cursor = root;
    for (index, key) in path.iter().enumerate() {
        let is_leaf = index + 1 == path.len();
        let object = as_object_coercing(cursor);
        if is_leaf {
            object.insert((*key).to_string(), Value::from(value));
            return;
        }
        cursor = object
            .entry((*key).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn sanitize_filename_token(input: &str) -> String {
    let out: String = input
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() { "variant".into() } else { out }
}

struct Mutation {
    knob_path: &'static str,
    before_value: String,
    after_value: String,
}

fn apply_packet_delay_mutation(base: &Value, variant: &mut Value) -> Mutation {
    let path = ["camera", "network", "inter_packet_delay_us"];
    let base_us = read_integer_at_path(base, &path).unwrap_or(0);
    let candidate_us = base_us + 5000;
    set_integer_at_path(variant, &path, candidate_us);
    Mutation {
        knob_path: "camera.network.inter_packet_delay_us",
        before_value: base_us.to_string(),
        after_value: candidate_us.to_string(),
    }
}

fn apply_fps_mutation(base: &Value, variant: &mut Value) -> Mutation {
    let path = ["camera", "fps"];
    let base_fps = read_integer_at_path(base, &path).unwrap_or(30);
    let candidate_fps = (base_fps - 1).max(1);
    set_integer_at_path(variant, &path, candidate_fps);
    Mutation {
        knob_path: "camera.fps",
        before_value: base_fps.to_string(),
        after_value: candidate_fps.to_string(),
    }
}

fn apply_roi_toggle_mutation(base: &Value, variant: &mut Value) -> Mutation {
    let has_base_roi = base
        .get("camera")
        .and_then(|camera| camera.get("roi"))
        .is_some();

    let camera = as_object_coercing(variant)
        .entry("camera".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let camera_object = as_object_coercing(camera);

    if has_base_roi {
        camera_object.remove("roi");
        Mutation {
            knob_path: "camera.roi",
            before_value: "enabled".into(),
            after_value: "disabled".into(),
        }
    } else {
        let width = read_integer_at_path(base, &["camera", "width"]).unwrap_or(1920);
        let height = read_integer_at_path(base, &["camera", "height"]).unwrap_or(1080);
        camera_object.insert(
            "roi".into(),
            json!({
                "x": 0,
                "y": 0,
                "width": (width / 2).max(1),
                "height": (height / 2).max(1),
            }),
        );
        Mutation {
            knob_path: "camera.roi",
            before_value: "disabled".into(),
            after_value: "enabled".into(),
        }
    }
}

fn apply_reorder_mutation(base: &Value, variant: &mut Value) -> Mutation {
    let path = ["sim_faults", "reorder"];
    let base_reorder = read_integer_at_path(base, &path).unwrap_or(0);
    let candidate = (base_reorder + 5).clamp(0, 100);
    set_integer_at_path(variant, &path, candidate);
    Mutation {
        knob_path: "sim_faults.reorder",
        before_value: base_reorder.to_string(),
        after_value: candidate.to_string(),
    }
}

fn apply_loss_mutation(base: &Value, variant: &mut Value) -> Mutation {
    let path = ["sim_faults", "drop_percent"];
    let base_drop = read_integer_at_path(base, &path).unwrap_or(0);
    let candidate = if base_drop >= 100 {
        90
    } else {
        (base_drop + 10).clamp(0, 100)
    };
    set_integer_at_path(variant, &path, candidate);
    Mutation {
        knob_path: "sim_faults.drop_percent",
        before_value: base_drop.to_string(),
        after_value: candidate.to_string(),
    }
}

fn apply_knob_mutation(base: &Value, variant: &mut Value, knob_name: &str) -> Result<Mutation> {
    match knob_name {
        "packet_delay_ms" => Ok(apply_packet_delay_mutation(base, variant)),
        "fps" => Ok(apply_fps_mutation(base, variant)),
        "roi_enabled" => Ok(apply_roi_toggle_mutation(base, variant)),
        "reorder_percent" => Ok(apply_reorder_mutation(base, variant)),
        "loss_percent" => Ok(apply_loss_mutation(base, variant)),
        other => Err(LabOpsError::Runtime {
            details: format!(
                "unsupported playbook knob for scenario variant generation: {other}"
            ),
        }),
    }
}

fn validate_request(request: &VariantGenerationRequest) -> Result<()> {
    if request.base_scenario_path.as_os_str().is_empty() {
        return Err(LabOpsError::Usage {
            details: "base scenario path cannot be empty".into(),
        });
    }
    if request.symptom.is_empty() {
        return Err(LabOpsError::Usage {
            details: "symptom cannot be empty".into(),
        });
    }
    if request.output_dir.as_os_str().is_empty() {
        return Err(LabOpsError::Usage {
            details: "output directory cannot be empty".into(),
        });
    }
    if !request.base_scenario_path.is_file() {
        return Err(LabOpsError::Usage {
            details: format!(
                "base scenario file not found: {}",
                request.base_scenario_path.display()
            ),
        });
    }
    if request.base_scenario_path.extension().and_then(|e| e.to_str()) != Some("json") {
        return Err(LabOpsError::Usage {
            details: format!(
                "base scenario must use .json extension: {}",
                request.base_scenario_path.display()
            ),
        });
    }
    Ok(())
}

#[derive(Serialize)]
struct ManifestDoc<'a> {
    playbook_id: &'a str,
    output_dir: String,
    variants: &'a [ScenarioVariant],
}

/// Generates one scenario variant per playbook knob plus the manifest.
pub fn generate_variants(request: &VariantGenerationRequest) -> Result<VariantGenerationResult> {
    validate_request(request)?;

    let base_text = fs::read_to_string(&request.base_scenario_path)
        .map_err(|e| LabOpsError::io(&request.base_scenario_path, e))?;
    let base_root: Value = serde_json::from_str(&base_text).map_err(|e| LabOpsError::Parse {
        context: "base scenario json",
        details: e.to_string(),
    })?;
    if !base_root.is_object() {
        return Err(LabOpsError::Parse {
            context: "base scenario json",
            details: "base scenario JSON root must be an object".into(),
        });
    }

    let playbook: Playbook = select_playbook_for_symptom(&request.symptom)?;
    fs::create_dir_all(&request.output_dir)
        .map_err(|e| LabOpsError::io(&request.output_dir, e))?;

    let base_stem = request
        .base_scenario_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scenario".into());

    let mut variants = Vec::with_capacity(playbook.knobs.len());
    for knob in &playbook.knobs {
        let mut variant_root = base_root.clone();
        let mutation = apply_knob_mutation(&base_root, &mut variant_root, knob.name)?;

        let file_name = format!("{base_stem}__{}.json", sanitize_filename_token(knob.name));
        let body = serde_json::to_string_pretty(&variant_root).map_err(|e| {
            LabOpsError::Serialization {
                context: "variant scenario",
                details: e.to_string(),
            }
        })?;
        let scenario_path = write_text_artifact(&request.output_dir, &file_name, &body)?;

        variants.push(ScenarioVariant {
            knob_name: knob.name.to_string(),
            knob_path: mutation.knob_path.to_string(),
            before_value: mutation.before_value,
            after_value: mutation.after_value,
            scenario_path,
        });
    }

    let manifest = ManifestDoc {
        playbook_id: playbook.id,
        output_dir: request.output_dir.display().to_string(),
        variants: &variants,
    };
    let manifest_body =
        serde_json::to_string_pretty(&manifest).map_err(|e| LabOpsError::Serialization {
            context: "variants manifest",
            details: e.to_string(),
        })?;
    let manifest_path =
        write_text_artifact(&request.output_dir, "variants_manifest.json", &manifest_body)?;

    Ok(VariantGenerationResult {
        playbook_id: playbook.id.to_string(),
        output_dir: request.output_dir.clone(),
        manifest_path,
        variants,
    })
}
