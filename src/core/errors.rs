//! LAB-prefixed error types with structured error codes and the stable
//! process-exit contract.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, LabOpsError>;

/// Stable process-exit contract for CLI automation.
///
/// The first three values preserve conventional meanings used by scripts:
/// 0 success, 1 generic command failure, 2 usage/argument failure. The
/// remaining values classify common operational failure modes so CI wrappers
/// can branch without scraping stderr text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    Usage = 2,
    SchemaInvalid = 10,
    BackendConnectFailed = 20,
    ThresholdsFailed = 30,
}

impl ExitCode {
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Top-level error type for LabOps.
#[derive(Debug, Error)]
pub enum LabOpsError {
    #[error("[LAB-1001] usage: {details}")]
    Usage { details: String },

    #[error("[LAB-1002] invalid scenario: {field}: {reason}")]
    SchemaInvalid { field: String, reason: String },

    #[error("[LAB-1003] parse failure in {context}: {details}")]
    Parse {
        context: &'static str,
        details: String,
    },

    #[error("[LAB-2001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[LAB-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[LAB-3001] backend connect failed: {details}")]
    BackendConnect { details: String },

    #[error("[LAB-3002] unsupported parameter '{key}': {reason}")]
    ApplyUnsupported { key: String, reason: String },

    #[error(
        "[LAB-3003] device disconnected after {attempts_used} reconnect attempts (limit {retry_limit})"
    )]
    DeviceDisconnect {
        attempts_used: u32,
        retry_limit: u32,
    },

    #[error("[LAB-3004] run interrupted by signal")]
    Interrupted,

    #[error("[LAB-3005] threshold checks failed: {violation_count} violation(s)")]
    ThresholdsFailed { violation_count: usize },

    #[error("[LAB-3101] another labops run appears active (lock file {path} is held)")]
    LockContention { path: PathBuf },

    #[error("[LAB-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl LabOpsError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Usage { .. } => "LAB-1001",
            Self::SchemaInvalid { .. } => "LAB-1002",
            Self::Parse { .. } => "LAB-1003",
            Self::Io { .. } => "LAB-2001",
            Self::Serialization { .. } => "LAB-2101",
            Self::BackendConnect { .. } => "LAB-3001",
            Self::ApplyUnsupported { .. } => "LAB-3002",
            Self::DeviceDisconnect { .. } => "LAB-3003",
            Self::Interrupted => "LAB-3004",
            Self::ThresholdsFailed { .. } => "LAB-3005",
            Self::LockContention { .. } => "LAB-3101",
            Self::Runtime { .. } => "LAB-3900",
        }
    }

    /// Exit code this error maps to. The CLI dispatcher is the only caller
    /// that turns errors into process exits.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Usage { .. } => ExitCode::Usage,
            Self::SchemaInvalid { .. } => ExitCode::SchemaInvalid,
            Self::BackendConnect { .. } => ExitCode::BackendConnectFailed,
            Self::ThresholdsFailed { .. } => ExitCode::ThresholdsFailed,
            Self::Parse { .. }
            | Self::Io { .. }
            | Self::Serialization { .. }
            | Self::ApplyUnsupported { .. }
            | Self::DeviceDisconnect { .. }
            | Self::Interrupted
            | Self::LockContention { .. }
            | Self::Runtime { .. } => ExitCode::Failure,
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for scenario schema diagnostics.
    #[must_use]
    pub fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_contract() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(
            LabOpsError::Runtime { details: "x".into() }.exit_code().as_i32(),
            1
        );
        assert_eq!(
            LabOpsError::Usage { details: "x".into() }.exit_code().as_i32(),
            2
        );
        assert_eq!(
            LabOpsError::schema("scenario_id", "missing").exit_code().as_i32(),
            10
        );
        assert_eq!(
            LabOpsError::BackendConnect { details: "x".into() }.exit_code().as_i32(),
            20
        );
        assert_eq!(
            LabOpsError::ThresholdsFailed { violation_count: 1 }.exit_code().as_i32(),
            30
        );
    }

    #[test]
    fn schema_error_message_names_field_and_reason() {
        let err = LabOpsError::schema("duration.duration_ms", "must be a positive integer");
        let text = err.to_string();
        assert!(text.contains("invalid scenario: duration.duration_ms:"));
        assert!(text.contains("positive integer"));
    }
}
