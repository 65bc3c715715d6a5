//! Experiment state: the checkpointable session document for a triage run.
//!
//! Self-contained so it can be serialized between agent iterations
//! (`agent_state.json`) and shipped inside engineer bundles.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::artifacts::write_text_artifact;
use crate::core::errors::{LabOpsError, Result};
use crate::core::time::format_utc_millis;

/// Hypothesis lifecycle. Explicit so the agent can explain whether a theory
/// is still open, supported by evidence, rejected, or blocked on human
/// review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    #[default]
    Open,
    Supported,
    Rejected,
    NeedsHuman,
}

impl HypothesisStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Supported => "supported",
            Self::Rejected => "rejected",
            Self::NeedsHuman => "needs_human",
        }
    }
}

/// Row-level outcome for the results table. A small, stable vocabulary
/// keeps machine parsing and human summaries aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pass,
    Fail,
    #[default]
    Inconclusive,
}

impl ResultStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Inconclusive => "inconclusive",
        }
    }

    /// Whether the row decides anything (pass or fail, not inconclusive).
    #[must_use]
    pub const fn is_decisive(self) -> bool {
        matches!(self, Self::Pass | Self::Fail)
    }
}

/// A single root-cause hypothesis tracked by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub statement: String,
    pub variable_name: String,
    pub status: HypothesisStatus,
}

/// One variable mutation already tried. Baseline and candidate side by side
/// keeps one-at-a-time analysis readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestedVariable {
    pub name: String,
    pub baseline_value: String,
    pub candidate_value: String,
}

/// One experiment result row with verdict and key metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub experiment_id: String,
    pub hypothesis_id: String,
    pub variable_name: String,
    pub variable_value: String,
    pub result: ResultStatus,
    pub evidence_run_id: String,
    pub avg_fps: f64,
    pub drop_rate_percent: f64,
    pub jitter_p95_us: f64,
    pub notes: String,
}

/// Canonical in-memory state for triage planning and progress tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentState {
    pub session_id: String,
    pub scenario_id: String,
    pub baseline_id: String,
    pub seed: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub hypotheses: Vec<Hypothesis>,
    pub tested_variables: Vec<TestedVariable>,
    pub results_table: Vec<ResultRow>,
    pub next_action: String,
}

impl Serialize for ExperimentState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_struct("ExperimentState", 10)?;
        out.serialize_field("session_id", &self.session_id)?;
        out.serialize_field("scenario_id", &self.scenario_id)?;
        out.serialize_field("baseline_id", &self.baseline_id)?;
        out.serialize_field("seed", &self.seed)?;
        out.serialize_field("created_at_utc", &format_utc_millis(self.created_at))?;
        out.serialize_field("updated_at_utc", &format_utc_millis(self.updated_at))?;
        out.serialize_field("next_action", &self.next_action)?;
        out.serialize_field("hypotheses", &self.hypotheses)?;
        out.serialize_field("tested_variables", &self.tested_variables)?;
        out.serialize_field("results_table", &self.results_table)?;
        out.end()
    }
}

impl ExperimentState {
    /// Creates a fresh session document.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        scenario_id: impl Into<String>,
        seed: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            scenario_id: scenario_id.into(),
            baseline_id: String::new(),
            seed,
            created_at,
            updated_at: created_at,
            hypotheses: Vec::new(),
            tested_variables: Vec::new(),
            results_table: Vec::new(),
            next_action: String::new(),
        }
    }
}

/// Writes `<output_dir>/agent_state.json`.
pub fn write_agent_state_json(state: &ExperimentState, output_dir: &Path) -> Result<PathBuf> {
    let body = serde_json::to_string(state).map_err(|e| LabOpsError::Serialization {
        context: "agent_state.json",
        details: e.to_string(),
    })?;
    write_text_artifact(output_dir, "agent_state.json", &body)
}
