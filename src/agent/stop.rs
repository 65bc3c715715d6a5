//! Stop-decision engine.
//!
//! Conditions are evaluated in fixed priority order; the first match is the
//! sole reason reported. The order is part of the contract because
//! automation depends on one stable reason when several conditions hold:
//! 1. max_runs, 2. single-variable flip, 3. confidence threshold,
//! 4. stable repro rate.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use crate::agent::state::{ExperimentState, ResultStatus};
use crate::artifacts::format_fixed;
use crate::core::errors::{LabOpsError, Result};

/// Stop reasons in strict priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    Continue,
    MaxRuns,
    SingleVariableFlip,
    ConfidenceThreshold,
    StableReproRate,
}

impl StopReason {
    /// Stable string form used in logs and artifacts.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::MaxRuns => "max_runs",
            Self::SingleVariableFlip => "single_variable_flip",
            Self::ConfidenceThreshold => "confidence_threshold",
            Self::StableReproRate => "stable_repro_rate",
        }
    }
}

/// Stop policy thresholds. Explicit and numeric so labs can tune behavior
/// while keeping the decision logic deterministic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopConfig {
    pub max_runs: usize,
    pub stable_repro_window: usize,
    pub stable_repro_rate_min: f64,
    pub confidence_threshold: f64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            max_runs: 12,
            stable_repro_window: 4,
            stable_repro_rate_min: 0.75,
            confidence_threshold: 0.90,
        }
    }
}

/// Deterministic stop decision with machine- and human-readable context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopDecision {
    pub should_stop: bool,
    pub reason: StopReason,
    pub explanation: String,
    pub run_count: usize,
    pub decisive_run_count: usize,
    pub repro_window_count: usize,
    pub observed_repro_rate: f64,
    pub observed_confidence: f64,
    pub isolating_variable: Option<String>,
}

#[derive(Default)]
struct ValueOutcomeStats {
    pass_count: usize,
    fail_count: usize,
}

struct FlipEvidence {
    variable: String,
    fail_value: String,
    pass_value: String,
}

// Sorted maps keep iteration deterministic across platforms: variables in
// lexicographic order, values in lexicographic order within a variable.
fn find_single_variable_flip(state: &ExperimentState) -> Option<FlipEvidence> {
    let mut stats: BTreeMap<&str, BTreeMap<&str, ValueOutcomeStats>> = BTreeMap::new();
    for row in &state.results_table {
        if !row.result.is_decisive() || row.variable_name.is_empty() {
            continue;
        }
        let value_stats = stats
            .entry(row.variable_name.as_str())
            .or_default()
            .entry(row.variable_value.as_str())
            .or_default();
        match row.result {
            ResultStatus::Pass => value_stats.pass_count += 1,
            ResultStatus::Fail => value_stats.fail_count += 1,
            ResultStatus::Inconclusive => {}
        }
    }

    for (variable, value_table) in &stats {
        let mut fail_value: Option<&str> = None;
        let mut pass_value: Option<&str> = None;
        for (value, value_stats) in value_table {
            if fail_value.is_none() && value_stats.fail_count > 0 {
                fail_value = Some(value);
            }
            if pass_value.is_none() && value_stats.pass_count > 0 {
                pass_value = Some(value);
            }
        }
        // Evidence must span two distinct values; contradictory outcomes of
        // one value do not isolate anything.
        if let (Some(fail), Some(pass)) = (fail_value, pass_value) {
            if fail != pass {
                return Some(FlipEvidence {
                    variable: (*variable).to_string(),
                    fail_value: fail.to_string(),
                    pass_value: pass.to_string(),
                });
            }
        }
    }
    None
}

fn validate_config(config: &StopConfig) -> Result<()> {
    if config.max_runs == 0 {
        return Err(LabOpsError::Usage {
            details: "max_runs must be greater than 0".into(),
        });
    }
    if config.stable_repro_window == 0 {
        return Err(LabOpsError::Usage {
            details: "stable_repro_window must be greater than 0".into(),
        });
    }
    if !config.stable_repro_rate_min.is_finite()
        || !(0.0..=1.0).contains(&config.stable_repro_rate_min)
    {
        return Err(LabOpsError::Usage {
            details: "stable_repro_rate_min must be in [0,1]".into(),
        });
    }
    if !config.confidence_threshold.is_finite()
        || !(0.0..=1.0).contains(&config.confidence_threshold)
    {
        return Err(LabOpsError::Usage {
            details: "confidence_threshold must be in [0,1]".into(),
        });
    }
    Ok(())
}

/// Evaluates stop conditions over `state` with the caller's confidence
/// signal. Pure in `(config, state, confidence_score)`.
pub fn evaluate_stop_conditions(
    config: &StopConfig,
    state: &ExperimentState,
    confidence_score: f64,
) -> Result<StopDecision> {
    validate_config(config)?;
    if !confidence_score.is_finite() || !(0.0..=1.0).contains(&confidence_score) {
        return Err(LabOpsError::Usage {
            details: "confidence_score must be in [0,1]".into(),
        });
    }

    let mut decision = StopDecision {
        run_count: state.results_table.len(),
        observed_confidence: confidence_score,
        ..StopDecision::default()
    };

    let decisive: Vec<ResultStatus> = state
        .results_table
        .iter()
        .filter(|row| row.result.is_decisive())
        .map(|row| row.result)
        .collect();
    decision.decisive_run_count = decisive.len();

    if !decisive.is_empty() {
        let window = config.stable_repro_window.min(decisive.len());
        decision.repro_window_count = window;
        let repro_count = decisive[decisive.len() - window..]
            .iter()
            .filter(|status| **status == ResultStatus::Fail)
            .count();
        #[allow(clippy::cast_precision_loss)]
        {
            decision.observed_repro_rate = repro_count as f64 / window as f64;
        }
    }

    // Priority 1: hard safety cap so automation cannot run unbounded.
    if decision.run_count >= config.max_runs {
        decision.should_stop = true;
        decision.reason = StopReason::MaxRuns;
        decision.explanation = format!(
            "stop: reached max runs (run_count={}, max_runs={})",
            decision.run_count, config.max_runs
        );
        return Ok(decision);
    }

    // Priority 2: strongest isolation signal, one variable with an explicit
    // pass/fail flip.
    if let Some(flip) = find_single_variable_flip(state) {
        decision.should_stop = true;
        decision.reason = StopReason::SingleVariableFlip;
        decision.explanation = format!(
            "stop: single-variable flip isolated variable '{}' (value='{}' => fail, value='{}' => pass)",
            flip.variable, flip.fail_value, flip.pass_value
        );
        decision.isolating_variable = Some(flip.variable);
        return Ok(decision);
    }

    // Priority 3: caller-provided confidence crosses the threshold.
    if confidence_score >= config.confidence_threshold {
        decision.should_stop = true;
        decision.reason = StopReason::ConfidenceThreshold;
        decision.explanation = format!(
            "stop: confidence score {} reached threshold {}",
            format_fixed(confidence_score, 3),
            format_fixed(config.confidence_threshold, 3)
        );
        return Ok(decision);
    }

    // Priority 4: reproducibility stabilized over the full recent window.
    if decision.repro_window_count == config.stable_repro_window
        && decision.observed_repro_rate >= config.stable_repro_rate_min
    {
        decision.should_stop = true;
        decision.reason = StopReason::StableReproRate;
        decision.explanation = format!(
            "stop: stable repro rate {} over last {} decisive runs reached threshold {}",
            format_fixed(decision.observed_repro_rate, 3),
            decision.repro_window_count,
            format_fixed(config.stable_repro_rate_min, 3)
        );
        return Ok(decision);
    }

    decision.explanation = format!(
        "continue: no stop condition met (run_count={}, confidence={}, recent_repro_rate={}, repro_window={})",
        decision.run_count,
        format_fixed(confidence_score, 3),
        format_fixed(decision.observed_repro_rate, 3),
        decision.repro_window_count
    );
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::ResultRow;
    use crate::core::time::from_epoch_millis;

    fn row(variable: &str, value: &str, result: ResultStatus) -> ResultRow {
        ResultRow {
            experiment_id: "exp".into(),
            hypothesis_id: "h".into(),
            variable_name: variable.into(),
            variable_value: value.into(),
            result,
            evidence_run_id: "run".into(),
            avg_fps: 0.0,
            drop_rate_percent: 0.0,
            jitter_p95_us: 0.0,
            notes: String::new(),
        }
    }

    fn state_with(rows: Vec<ResultRow>) -> ExperimentState {
        let mut state = ExperimentState::new("s", "sc", 1, from_epoch_millis(0));
        state.results_table = rows;
        state
    }

    #[test]
    fn config_bounds_are_validated() {
        let state = state_with(vec![]);
        let bad = StopConfig {
            max_runs: 0,
            ..StopConfig::default()
        };
        assert!(evaluate_stop_conditions(&bad, &state, 0.0).is_err());
        let bad = StopConfig {
            confidence_threshold: 1.5,
            ..StopConfig::default()
        };
        assert!(evaluate_stop_conditions(&bad, &state, 0.0).is_err());
        assert!(
            evaluate_stop_conditions(&StopConfig::default(), &state, f64::NAN).is_err()
        );
    }

    #[test]
    fn max_runs_wins_over_everything() {
        // Table also contains a flip; max_runs must be the sole reason.
        let rows = vec![
            row("trigger_mode", "hardware", ResultStatus::Fail),
            row("trigger_mode", "free_run", ResultStatus::Pass),
        ];
        let config = StopConfig {
            max_runs: 2,
            ..StopConfig::default()
        };
        let decision = evaluate_stop_conditions(&config, &state_with(rows), 0.99).unwrap();
        assert!(decision.should_stop);
        assert_eq!(decision.reason, StopReason::MaxRuns);
        assert_eq!(
            decision.explanation,
            "stop: reached max runs (run_count=2, max_runs=2)"
        );
    }

    #[test]
    fn single_variable_flip_names_both_literals() {
        let rows = vec![
            row("trigger_mode", "hardware", ResultStatus::Fail),
            row("trigger_mode", "free_run", ResultStatus::Pass),
        ];
        let decision =
            evaluate_stop_conditions(&StopConfig::default(), &state_with(rows), 0.0).unwrap();
        assert!(decision.should_stop);
        assert_eq!(decision.reason, StopReason::SingleVariableFlip);
        assert_eq!(decision.isolating_variable.as_deref(), Some("trigger_mode"));
        assert!(decision.explanation.contains("hardware"));
        assert!(decision.explanation.contains("free_run"));
    }

    #[test]
    fn same_value_pass_and_fail_is_not_a_flip() {
        let rows = vec![
            row("fps", "29", ResultStatus::Fail),
            row("fps", "29", ResultStatus::Pass),
        ];
        let decision =
            evaluate_stop_conditions(&StopConfig::default(), &state_with(rows), 0.0).unwrap();
        assert_eq!(decision.reason, StopReason::Continue);
    }

    #[test]
    fn confidence_threshold_triggers_without_flip() {
        let rows = vec![row("fps", "29", ResultStatus::Inconclusive)];
        let decision =
            evaluate_stop_conditions(&StopConfig::default(), &state_with(rows), 0.95).unwrap();
        assert_eq!(decision.reason, StopReason::ConfidenceThreshold);
        assert!(decision.explanation.contains("0.950"));
    }

    #[test]
    fn stable_repro_rate_requires_a_full_window() {
        let fails = |n: usize| -> Vec<ResultRow> {
            (0..n).map(|i| row("loss", &i.to_string(), ResultStatus::Fail)).collect()
        };
        let config = StopConfig {
            stable_repro_window: 4,
            stable_repro_rate_min: 0.75,
            ..StopConfig::default()
        };

        // Three decisive fails: window not yet full, keep going. Distinct
        // values per row avoid the flip shortcut but also avoid pass rows.
        let decision = evaluate_stop_conditions(&config, &state_with(fails(3)), 0.0).unwrap();
        assert_eq!(decision.reason, StopReason::Continue);
        assert_eq!(decision.repro_window_count, 3);

        let decision = evaluate_stop_conditions(&config, &state_with(fails(4)), 0.0).unwrap();
        assert_eq!(decision.reason, StopReason::StableReproRate);
        assert!((decision.observed_repro_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn continue_explanation_cites_the_gap() {
        let decision =
            evaluate_stop_conditions(&StopConfig::default(), &state_with(vec![]), 0.25).unwrap();
        assert!(!decision.should_stop);
        assert_eq!(decision.reason, StopReason::Continue);
        assert_eq!(
            decision.explanation,
            "continue: no stop condition met (run_count=0, confidence=0.250, recent_repro_rate=0.000, repro_window=0)"
        );
    }

    #[test]
    fn decision_is_pure_in_its_inputs() {
        let rows = vec![
            row("fps", "29", ResultStatus::Fail),
            row("fps", "30", ResultStatus::Pass),
        ];
        let a = evaluate_stop_conditions(&StopConfig::default(), &state_with(rows.clone()), 0.5)
            .unwrap();
        let b = evaluate_stop_conditions(&StopConfig::default(), &state_with(rows), 0.5).unwrap();
        assert_eq!(a, b);
    }
}
