//! Shared test infrastructure for labops integration tests.
//!
//! Provides the CLI runner (spawns the built binary with a per-case scratch
//! working directory) and scenario fixture builders.

// Not every test binary uses every item; suppress dead-code warnings for
// the shared module.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub work_dir: PathBuf,
}

impl CmdResult {
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_labops") {
        let p = PathBuf::from(path);
        if p.exists() {
            return p;
        }
    }

    let exe_name = if cfg!(windows) { "labops.exe" } else { "labops" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!(
            "unable to resolve labops binary path for integration test (checked CARGO_BIN_EXE_labops and debug sibling path)"
        ),
    }
}

/// Creates a scratch working directory for one named test case.
pub fn case_dir(case_name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("labops-tests")
        .join(format!("{}_{}", sanitize(case_name), now_millis()));
    fs::create_dir_all(&dir).expect("create case dir");
    dir
}

/// Runs the labops binary with `args`, using `work_dir` as the process
/// working directory and applying `envs` on top of a scrubbed environment.
pub fn run_cli_in(work_dir: &Path, args: &[&str], envs: &[(&str, &str)]) -> CmdResult {
    let mut command = Command::new(resolve_bin_path());
    command.args(args).current_dir(work_dir);
    // Keep fixture variables from the ambient environment out of the runs.
    for variable in [
        "LABOPS_PARAM_KEY_MAP",
        "LABOPS_WEBCAM_DEVICE_FIXTURE",
        "LABOPS_REAL_DISCONNECT_AFTER_PULLS",
        "LABOPS_SOAK_TEST_INTERRUPT_CHECKPOINT_WRITE",
    ] {
        command.env_remove(variable);
    }
    for (key, value) in envs {
        command.env(key, value);
    }

    let output = command.output().expect("spawn labops binary");
    CmdResult {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        work_dir: work_dir.to_path_buf(),
    }
}

/// Runs the labops binary in a fresh scratch directory.
pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let dir = case_dir(case_name);
    run_cli_in(&dir, args, &[])
}

/// Writes a scenario file into `dir` and returns its path.
pub fn write_scenario(dir: &Path, file_name: &str, body: &str) -> PathBuf {
    let path = dir.join(file_name);
    fs::write(&path, body).expect("write scenario fixture");
    path
}

/// The reference passing scenario from the architecture contract.
pub fn passing_scenario_json() -> String {
    r#"{
        "scenario_id": "architecture_contract_pass",
        "duration": { "duration_ms": 800 },
        "camera": { "fps": 25 },
        "sim_faults": { "seed": 42 },
        "thresholds": { "min_avg_fps": 1.0 }
    }"#
    .to_string()
}

/// Writes a param key map fixture and returns its path.
pub fn write_param_key_map(dir: &Path) -> PathBuf {
    let path = dir.join("param_key_map.json");
    fs::write(
        &path,
        r#"{
            "exposure_us": "ExposureTime",
            "gain_db": "Gain",
            "pixel_format": "PixelFormat",
            "trigger_mode": "TriggerMode",
            "fps": "AcquisitionFrameRate"
        }"#,
    )
    .expect("write key map fixture");
    path
}
