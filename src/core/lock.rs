//! Single-instance process lock.
//!
//! At most one labops run may be active per host. The lock is a pid file at
//! `tmp/labops.lock` relative to the working directory; a lock held by a
//! foreign process fails the run before any output is written. The guard
//! releases the lock on drop so every exit path (including errors and
//! interrupts) cleans up.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{LabOpsError, Result};

/// Default lock location relative to the working directory.
pub const DEFAULT_LOCK_RELATIVE_PATH: &str = "tmp/labops.lock";

/// Held process lock. Dropping the guard removes the lock file.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
}

impl ProcessLock {
    /// Acquires the lock at the default location under `base_dir`.
    pub fn acquire_default(base_dir: &Path) -> Result<Self> {
        Self::acquire(&base_dir.join(DEFAULT_LOCK_RELATIVE_PATH))
    }

    /// Acquires the lock at `path`, creating parent directories as needed.
    ///
    /// A lock file naming our own pid is treated as a leftover from an
    /// earlier run of this same process and is taken over; any other
    /// existing lock is contention.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LabOpsError::io(parent, e))?;
        }

        let own_pid = std::process::id();
        if let Ok(existing) = fs::read_to_string(path) {
            let holder = existing.trim().parse::<u32>().ok();
            if holder != Some(own_pid) {
                return Err(LabOpsError::LockContention {
                    path: path.to_path_buf(),
                });
            }
        }

        fs::write(path, format!("{own_pid}\n")).map_err(|e| LabOpsError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Path of the held lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        // Removal failure is non-actionable at drop time; the takeover rule
        // above keeps a leftover file from wedging future runs of this pid.
        let _ = fs::remove_file(&self.path);
    }
}
