//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use labops::prelude::*;
//! ```

// Core
pub use crate::core::errors::{ExitCode, LabOpsError, Result};
pub use crate::core::lock::ProcessLock;

// Scenario + backends
pub use crate::backends::{CameraBackend, FrameOutcome, FrameSample};
pub use crate::scenario::{ApplyMode, BackendKind, ScenarioConfig, load_scenario_file};

// Metrics
pub use crate::metrics::{FpsReport, MetricsDiffReport, compute_fps_report, compute_metrics_diff_from_csv};

// Run pipeline
pub use crate::run::{RunOptions, RunOutcome, RunStatus, execute_scenario_run};
pub use crate::soak::{SoakOptions, SoakOutcome, execute_soak_run};

// Agent
pub use crate::agent::playbook::select_playbook_for_symptom;
pub use crate::agent::state::{ExperimentState, Hypothesis, ResultRow, ResultStatus};
pub use crate::agent::stop::{StopConfig, StopDecision, StopReason, evaluate_stop_conditions};
pub use crate::agent::triage::{TriageOptions, run_triage_session};
pub use crate::agent::variants::{VariantGenerationRequest, generate_variants};

// Events
pub use crate::events::{Event, EventLog, EventType};
