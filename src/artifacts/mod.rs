//! Per-run artifact writers.
//!
//! Every writer creates parent directories as needed, emits a trailing
//! newline, and keeps key iteration deterministic so bundles produced from
//! the same seed are byte-comparable.

pub mod camera_config;
pub mod diff_writer;
pub mod hostprobe;
pub mod html;
pub mod kb;
pub mod manifest;
pub mod metrics_writer;
pub mod run_writer;
pub mod summary;
pub mod zip;

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{LabOpsError, Result};

/// Creates `output_dir` (and parents) if needed.
pub fn ensure_output_dir(output_dir: &Path) -> Result<()> {
    if output_dir.as_os_str().is_empty() {
        return Err(LabOpsError::Runtime {
            details: "output directory cannot be empty".into(),
        });
    }
    fs::create_dir_all(output_dir).map_err(|e| LabOpsError::io(output_dir, e))
}

/// Writes `contents` to `<output_dir>/<file_name>`, guaranteeing a trailing
/// newline so shell inspection (`cat`, `tail`, diffs) stays clean.
pub fn write_text_artifact(output_dir: &Path, file_name: &str, contents: &str) -> Result<PathBuf> {
    ensure_output_dir(output_dir)?;
    let written_path = output_dir.join(file_name);
    let mut body = contents.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    fs::write(&written_path, body).map_err(|e| LabOpsError::io(&written_path, e))?;
    Ok(written_path)
}

/// Fixed-six-decimal formatting used across canonical artifacts.
#[must_use]
pub fn format_fixed(value: f64, precision: usize) -> String {
    format!("{value:.precision$}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_artifacts_always_end_with_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_text_artifact(dir.path(), "note.md", "no newline").unwrap();
        assert!(fs::read_to_string(path).unwrap().ends_with('\n'));

        let path = write_text_artifact(dir.path(), "note2.md", "has newline\n").unwrap();
        let body = fs::read_to_string(path).unwrap();
        assert!(body.ends_with('\n') && !body.ends_with("\n\n"));
    }

    #[test]
    fn missing_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        write_text_artifact(&nested, "x.txt", "x").unwrap();
        assert!(nested.join("x.txt").is_file());
    }
}
