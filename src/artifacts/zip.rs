//! On-demand bundle packaging as `bundle.zip`.
//!
//! Entries are stored uncompressed with fixed timestamps and sorted names,
//! so packaging the same bundle twice yields identical bytes. The manifest
//! never lists the zip and the zip never contains itself.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::core::errors::{LabOpsError, Result};

/// File name of the packaged bundle.
pub const BUNDLE_ZIP_NAME: &str = "bundle.zip";

// Fixed DOS timestamp (2020-01-01 00:00:00) keeps archives byte-stable.
const DOS_TIME: u16 = 0;
const DOS_DATE: u16 = ((2020 - 1980) << 9) | (1 << 5) | 1;

fn crc32_ieee(bytes: &[u8]) -> u32 {
    let mut crc = !0u32;
    for byte in bytes {
        crc ^= u32::from(*byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xedb8_8320 & mask);
        }
    }
    !crc
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

struct ZipEntry {
    name: String,
    crc32: u32,
    size: u32,
    local_header_offset: u32,
}

fn entry_name(bundle_dir: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(bundle_dir)
        .map_err(|_| LabOpsError::Runtime {
            details: format!("zip entry is outside bundle directory: {}", path.display()),
        })?;
    if relative
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(LabOpsError::Runtime {
            details: format!("zip entry is outside bundle directory: {}", path.display()),
        });
    }
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Packages `artifact_paths` into `<bundle_dir>/bundle.zip`.
pub fn write_bundle_zip(bundle_dir: &Path, artifact_paths: &[PathBuf]) -> Result<PathBuf> {
    if artifact_paths.is_empty() {
        return Err(LabOpsError::Runtime {
            details: "artifact path list cannot be empty".into(),
        });
    }

    let mut sorted_paths: Vec<&PathBuf> = artifact_paths.iter().collect();
    sorted_paths.sort();

    let mut archive = Vec::new();
    let mut entries = Vec::with_capacity(sorted_paths.len());

    for path in sorted_paths {
        let name = entry_name(bundle_dir, path)?;
        let bytes = fs::read(path).map_err(|e| LabOpsError::io(path, e))?;
        let size = u32::try_from(bytes.len()).map_err(|_| LabOpsError::Runtime {
            details: format!("artifact too large for zip packaging: {}", path.display()),
        })?;
        let crc32 = crc32_ieee(&bytes);
        let local_header_offset = u32::try_from(archive.len()).map_err(|_| LabOpsError::Runtime {
            details: "bundle too large for zip packaging".into(),
        })?;

        // Local file header, stored (method 0).
        push_u32(&mut archive, 0x0403_4b50);
        push_u16(&mut archive, 20);
        push_u16(&mut archive, 0);
        push_u16(&mut archive, 0);
        push_u16(&mut archive, DOS_TIME);
        push_u16(&mut archive, DOS_DATE);
        push_u32(&mut archive, crc32);
        push_u32(&mut archive, size);
        push_u32(&mut archive, size);
        push_u16(&mut archive, u16::try_from(name.len()).unwrap_or(u16::MAX));
        push_u16(&mut archive, 0);
        archive.extend_from_slice(name.as_bytes());
        archive.extend_from_slice(&bytes);

        entries.push(ZipEntry {
            name,
            crc32,
            size,
            local_header_offset,
        });
    }

    let central_directory_offset = u32::try_from(archive.len()).unwrap_or(u32::MAX);
    for entry in &entries {
        push_u32(&mut archive, 0x0201_4b50);
        push_u16(&mut archive, 20);
        push_u16(&mut archive, 20);
        push_u16(&mut archive, 0);
        push_u16(&mut archive, 0);
        push_u16(&mut archive, DOS_TIME);
        push_u16(&mut archive, DOS_DATE);
        push_u32(&mut archive, entry.crc32);
        push_u32(&mut archive, entry.size);
        push_u32(&mut archive, entry.size);
        push_u16(&mut archive, u16::try_from(entry.name.len()).unwrap_or(u16::MAX));
        push_u16(&mut archive, 0);
        push_u16(&mut archive, 0);
        push_u16(&mut archive, 0);
        push_u16(&mut archive, 0);
        push_u32(&mut archive, 0);
        push_u32(&mut archive, entry.local_header_offset);
        archive.extend_from_slice(entry.name.as_bytes());
    }
    let central_directory_size =
        u32::try_from(archive.len()).unwrap_or(u32::MAX) - central_directory_offset;

    // End of central directory.
    push_u32(&mut archive, 0x0605_4b50);
    push_u16(&mut archive, 0);
    push_u16(&mut archive, 0);
    let entry_count = u16::try_from(entries.len()).unwrap_or(u16::MAX);
    push_u16(&mut archive, entry_count);
    push_u16(&mut archive, entry_count);
    push_u32(&mut archive, central_directory_size);
    push_u32(&mut archive, central_directory_offset);
    push_u16(&mut archive, 0);

    let written_path = bundle_dir.join(BUNDLE_ZIP_NAME);
    fs::write(&written_path, archive).map_err(|e| LabOpsError::io(&written_path, e))?;
    Ok(written_path)
}
