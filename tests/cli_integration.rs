//! Integration smoke tests for the labops CLI surface and its exit-code
//! contract.

mod common;

use common::{passing_scenario_json, run_cli_case, run_cli_in, write_scenario};

#[test]
fn help_prints_usage() {
    let result = run_cli_case("help_prints_usage", &["--help"]);
    assert!(result.status.success());
    assert!(
        result.stdout.contains("Usage: labops"),
        "missing usage banner; stdout: {}",
        result.stdout
    );
}

#[test]
fn version_prints_package_version() {
    let result = run_cli_case("version_prints_package_version", &["version"]);
    assert_eq!(result.exit_code(), 0);
    assert!(result.stdout.contains("labops "));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let result = run_cli_case("unknown_subcommand", &["frobnicate"]);
    assert_eq!(result.exit_code(), 2);
}

#[test]
fn validate_accepts_a_well_formed_scenario() {
    let dir = common::case_dir("validate_accepts");
    let scenario = write_scenario(&dir, "ok.json", &passing_scenario_json());
    let result = run_cli_in(&dir, &["validate", scenario.to_str().unwrap()], &[]);
    assert_eq!(result.exit_code(), 0, "stderr: {}", result.stderr);
    assert!(result.stdout.contains("valid:"));
    assert!(result.stdout.contains("architecture_contract_pass"));
}

#[test]
fn validate_missing_scenario_id_exits_10_and_names_the_field() {
    let dir = common::case_dir("validate_missing_id");
    let scenario = write_scenario(
        &dir,
        "bad.json",
        r#"{
            "duration": { "duration_ms": 800 },
            "camera": { "fps": 25 },
            "thresholds": {}
        }"#,
    );
    let result = run_cli_in(&dir, &["validate", scenario.to_str().unwrap()], &[]);
    assert_eq!(result.exit_code(), 10);
    assert!(
        result.stderr.contains("scenario_id:"),
        "stderr must name the field: {}",
        result.stderr
    );
}

#[test]
fn validate_missing_file_is_not_a_schema_error() {
    let dir = common::case_dir("validate_missing_file");
    let result = run_cli_in(&dir, &["validate", "no_such.json"], &[]);
    assert_eq!(result.exit_code(), 2);
    assert!(result.stderr.contains("no_such.json"));
}

#[test]
fn list_devices_sim_always_reports_one() {
    let result = run_cli_case("list_devices_sim", &["list-devices", "--backend", "sim"]);
    assert_eq!(result.exit_code(), 0);
    assert!(result.stdout.contains("deterministic-sim-camera"));
}

#[test]
fn list_devices_unknown_backend_is_usage_error() {
    let result = run_cli_case(
        "list_devices_unknown",
        &["list-devices", "--backend", "quantum"],
    );
    assert_eq!(result.exit_code(), 2);
}

#[test]
fn list_devices_webcam_reads_the_fixture() {
    let dir = common::case_dir("list_devices_webcam");
    let fixture = dir.join("devices.json");
    std::fs::write(
        &fixture,
        r#"[{"device_id": "video0", "friendly_name": "Bench Camera", "bus_info": "usb-2"}]"#,
    )
    .unwrap();
    let result = run_cli_in(
        &dir,
        &["list-devices", "--backend", "webcam"],
        &[("LABOPS_WEBCAM_DEVICE_FIXTURE", fixture.to_str().unwrap())],
    );
    assert_eq!(result.exit_code(), 0, "stderr: {}", result.stderr);
    assert!(result.stdout.contains("video0"));
    assert!(result.stdout.contains("Bench Camera"));
    assert!(result.stdout.contains("bus=usb-2"));

    let empty = run_cli_in(&dir, &["list-devices", "--backend", "webcam"], &[]);
    assert_eq!(empty.exit_code(), 0);
    assert!(empty.stdout.contains("no webcam devices discovered"));
}

#[test]
fn netem_iface_is_required_with_apply_netem() {
    let dir = common::case_dir("netem_requires_iface");
    let scenario = write_scenario(&dir, "s.json", &passing_scenario_json());
    let result = run_cli_in(
        &dir,
        &["run", scenario.to_str().unwrap(), "--apply-netem"],
        &[],
    );
    assert_eq!(result.exit_code(), 2);
}
