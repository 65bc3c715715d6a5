//! End-to-end triage session through the CLI binary: seeded known issue,
//! OAAT sweep, stop decision, and engineer packet content.

mod common;

use std::fs;

use common::{run_cli_in, write_scenario};

// Healthy by default; the OAAT fps mutation fails the strict min_avg_fps
// threshold and yields a reproducible isolation signal.
const SEEDED_KNOWN_ISSUE: &str = r#"{
    "scenario_id": "seeded_known_issue",
    "duration": { "duration_ms": 600 },
    "camera": { "fps": 30, "pixel_format": "mono8", "trigger_mode": "free_run" },
    "sim_faults": { "seed": 777, "jitter_us": 0, "drop_every_n": 0, "drop_percent": 0 },
    "thresholds": { "min_avg_fps": 29.5, "max_drop_rate_percent": 100.0 }
}"#;

#[test]
fn triage_session_isolates_fps_and_writes_packet() {
    let dir = common::case_dir("triage_session_e2e");
    let scenario = write_scenario(&dir, "seeded_known_issue.json", SEEDED_KNOWN_ISSUE);

    let result = run_cli_in(
        &dir,
        &[
            "triage",
            scenario.to_str().unwrap(),
            "--symptom",
            "dropped_frames",
            "--out",
            "out",
            "--max-runs",
            "20",
        ],
        &[],
    );
    assert_eq!(result.exit_code(), 0, "stderr: {}", result.stderr);
    assert!(result.stdout.contains("single_variable_flip"));

    // Directory layout contract.
    let baseline_dir = dir.join("out/baselines/seeded_known_issue");
    assert!(baseline_dir.join("metrics.csv").is_file());
    assert!(dir.join("out/agent_runs/variants_manifest.json").is_file());
    assert!(dir.join("out/agent/agent_state.json").is_file());

    let manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.join("out/agent_runs/variants_manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["playbook_id"], "dropped_frames_oaat_v1");
    let variants = manifest["variants"].as_array().unwrap();
    let names: Vec<&str> = variants
        .iter()
        .map(|v| v["knob_name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["packet_delay_ms", "fps", "roi_enabled", "reorder_percent", "loss_percent"]
    );
    assert_eq!(variants[1]["before_value"], "30");
    assert_eq!(variants[1]["after_value"], "29");

    // Engineer packet content.
    let packet = fs::read_to_string(dir.join("out/packet/engineer_packet.md")).unwrap();
    for section in [
        "## Run Context",
        "## Repro Steps",
        "## Configs Tried",
        "## What Changed",
        "## What We Ruled Out",
        "## Ranked Hypotheses + Evidence Links",
    ] {
        assert!(packet.contains(section), "missing {section}");
    }
    assert!(packet.contains("stop_reason: `single_variable_flip`"));
    assert!(packet.contains("camera.fps"));
    assert!(packet.contains(&baseline_dir.display().to_string()));
    assert!(packet.contains("diff_md"));

    // Agent state reflects the isolation.
    let state: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("out/agent/agent_state.json")).unwrap())
            .unwrap();
    assert_eq!(state["scenario_id"], "seeded_known_issue");
    assert!(
        state["results_table"]
            .as_array()
            .unwrap()
            .iter()
            .any(|row| row["result"] == "fail" && row["variable_name"] == "camera.fps")
    );
}

#[test]
fn triage_with_unknown_symptom_exits_with_usage_error() {
    let dir = common::case_dir("triage_unknown_symptom");
    let scenario = write_scenario(&dir, "s.json", SEEDED_KNOWN_ISSUE);
    let result = run_cli_in(
        &dir,
        &[
            "triage",
            scenario.to_str().unwrap(),
            "--symptom",
            "purple_haze",
            "--out",
            "out",
        ],
        &[],
    );
    assert_eq!(result.exit_code(), 2);
    assert!(result.stderr.contains("available symptoms: dropped_frames"));
}
