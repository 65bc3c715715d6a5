//! `bundle_manifest.json` writer: path, size, and FNV-1a 64 hash for every
//! artifact in the bundle, sorted by path.
//!
//! The manifest is the integrity anchor for engineer handoff: a receiver
//! can re-hash the bundle and prove nothing was truncated or swapped.

use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::artifacts::write_text_artifact;
use crate::core::errors::{LabOpsError, Result};

const FNV1A64_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV1A64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 64 over a byte slice, as zero-padded 16-char lowercase hex.
#[must_use]
pub fn fnv1a_64_hex(bytes: &[u8]) -> String {
    let mut hash = FNV1A64_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV1A64_PRIME);
    }
    format!("{hash:016x}")
}

#[derive(Debug)]
struct ManifestEntry {
    relative_path: String,
    size_bytes: u64,
    hash_hex: String,
}

fn relative_inside_bundle(bundle_dir: &Path, artifact_path: &Path) -> Result<String> {
    let relative = artifact_path.strip_prefix(bundle_dir).map_err(|_| {
        LabOpsError::Runtime {
            details: format!(
                "artifact is outside bundle directory: {}",
                artifact_path.display()
            ),
        }
    })?;
    if relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(LabOpsError::Runtime {
            details: format!(
                "artifact is outside bundle directory: {}",
                artifact_path.display()
            ),
        });
    }
    // Forward slashes keep manifests identical across platforms.
    let text = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Ok(text)
}

/// Writes `<bundle_dir>/bundle_manifest.json` covering `artifact_paths`.
///
/// Every listed path must be a regular file strictly inside the bundle
/// directory. Entries are sorted lexicographically by relative path.
pub fn write_bundle_manifest(bundle_dir: &Path, artifact_paths: &[PathBuf]) -> Result<PathBuf> {
    if artifact_paths.is_empty() {
        return Err(LabOpsError::Runtime {
            details: "artifact path list cannot be empty".into(),
        });
    }

    let mut entries = Vec::with_capacity(artifact_paths.len());
    for artifact_path in artifact_paths {
        if !artifact_path.is_file() {
            return Err(LabOpsError::Runtime {
                details: format!(
                    "artifact path must be a regular file: {}",
                    artifact_path.display()
                ),
            });
        }
        let relative_path = relative_inside_bundle(bundle_dir, artifact_path)?;
        let bytes = fs::read(artifact_path).map_err(|e| LabOpsError::io(artifact_path, e))?;
        entries.push(ManifestEntry {
            relative_path,
            size_bytes: bytes.len() as u64,
            hash_hex: fnv1a_64_hex(&bytes),
        });
    }
    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let mut out = String::from(
        "{\n  \"schema_version\":\"1.0\",\n  \"hash_algorithm\":\"fnv1a_64\",\n  \"files\":[",
    );
    for (index, entry) in entries.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        let escaped: String = entry
            .relative_path
            .chars()
            .flat_map(|c| match c {
                '"' => "\\\"".chars().collect::<Vec<_>>(),
                '\\' => "\\\\".chars().collect::<Vec<_>>(),
                other => vec![other],
            })
            .collect();
        let _ = write!(
            out,
            "\n    {{\"path\":\"{escaped}\",\"size_bytes\":{},\"hash\":\"{}\"}}",
            entry.size_bytes, entry.hash_hex
        );
    }
    out.push_str("\n  ]\n}");

    write_text_artifact(bundle_dir, "bundle_manifest.json", &out)
}
