//! Hypothesis ranking from the experiment results table.
//!
//! A fail row supports the hypothesis it names (the mutation reproduced the
//! symptom); a pass row contradicts it. The final id tiebreaker guarantees
//! the same order across platforms and serialization round-trips.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use crate::agent::state::{ExperimentState, Hypothesis, ResultStatus};

/// One ranked hypothesis with its score and evidence rows.
#[derive(Debug, Clone)]
pub struct RankedHypothesis<'a> {
    pub hypothesis: &'a Hypothesis,
    pub score: i64,
    pub support_count: usize,
    pub contradiction_count: usize,
    /// Indices into `state.results_table`, in table order.
    pub row_indices: Vec<usize>,
}

/// Ranks all hypotheses in `state`.
///
/// Ordering: score desc, support desc, contradictions asc, id asc.
#[must_use]
pub fn rank_hypotheses(state: &ExperimentState) -> Vec<RankedHypothesis<'_>> {
    let mut ranks: BTreeMap<&str, RankedHypothesis<'_>> = state
        .hypotheses
        .iter()
        .map(|hypothesis| {
            (
                hypothesis.id.as_str(),
                RankedHypothesis {
                    hypothesis,
                    score: 0,
                    support_count: 0,
                    contradiction_count: 0,
                    row_indices: Vec::new(),
                },
            )
        })
        .collect();

    for (index, row) in state.results_table.iter().enumerate() {
        let Some(rank) = ranks.get_mut(row.hypothesis_id.as_str()) else {
            continue;
        };
        rank.row_indices.push(index);
        match row.result {
            ResultStatus::Fail => {
                rank.score += 2;
                rank.support_count += 1;
            }
            ResultStatus::Pass => {
                rank.score -= 2;
                rank.contradiction_count += 1;
            }
            ResultStatus::Inconclusive => {}
        }
    }

    let mut ordered: Vec<RankedHypothesis<'_>> = ranks.into_values().collect();
    ordered.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.support_count.cmp(&a.support_count))
            .then_with(|| a.contradiction_count.cmp(&b.contradiction_count))
            .then_with(|| a.hypothesis.id.cmp(&b.hypothesis.id))
    });
    ordered
}

/// Deterministic confidence signal for the stop engine: support share of
/// the top-ranked hypothesis, 0.0 when it has no decisive rows.
#[must_use]
pub fn top_hypothesis_confidence(ranked: &[RankedHypothesis<'_>]) -> f64 {
    let Some(top) = ranked.first() else {
        return 0.0;
    };
    let decisive = top.support_count + top.contradiction_count;
    if decisive == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        top.support_count as f64 / decisive as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::{HypothesisStatus, ResultRow};
    use crate::core::time::from_epoch_millis;

    fn hypothesis(id: &str, variable: &str) -> Hypothesis {
        Hypothesis {
            id: id.into(),
            statement: format!("{variable} drives the symptom"),
            variable_name: variable.into(),
            status: HypothesisStatus::Open,
        }
    }

    fn row(hypothesis_id: &str, result: ResultStatus, run: &str) -> ResultRow {
        ResultRow {
            experiment_id: format!("exp-{run}"),
            hypothesis_id: hypothesis_id.into(),
            variable_name: "v".into(),
            variable_value: "1".into(),
            result,
            evidence_run_id: run.into(),
            avg_fps: 0.0,
            drop_rate_percent: 0.0,
            jitter_p95_us: 0.0,
            notes: String::new(),
        }
    }

    fn state_with(rows: Vec<ResultRow>) -> ExperimentState {
        let mut state = ExperimentState::new("s", "sc", 1, from_epoch_millis(0));
        state.hypotheses = vec![
            hypothesis("h_delay", "packet_delay_ms"),
            hypothesis("h_fps", "fps"),
            hypothesis("h_loss", "loss_percent"),
        ];
        state.results_table = rows;
        state
    }

    #[test]
    fn fails_score_plus_two_passes_minus_two() {
        let state = state_with(vec![
            row("h_fps", ResultStatus::Fail, "r1"),
            row("h_fps", ResultStatus::Fail, "r2"),
            row("h_delay", ResultStatus::Pass, "r3"),
            row("h_loss", ResultStatus::Inconclusive, "r4"),
        ]);
        let ranked = rank_hypotheses(&state);
        assert_eq!(ranked[0].hypothesis.id, "h_fps");
        assert_eq!(ranked[0].score, 4);
        assert_eq!(ranked[0].support_count, 2);
        // Inconclusive leaves h_loss at zero, above the contradicted h_delay.
        assert_eq!(ranked[1].hypothesis.id, "h_loss");
        assert_eq!(ranked[2].hypothesis.id, "h_delay");
        assert_eq!(ranked[2].score, -2);
    }

    #[test]
    fn id_breaks_exact_ties() {
        let state = state_with(vec![
            row("h_delay", ResultStatus::Fail, "r1"),
            row("h_fps", ResultStatus::Fail, "r2"),
        ]);
        let ranked = rank_hypotheses(&state);
        assert_eq!(ranked[0].hypothesis.id, "h_delay");
        assert_eq!(ranked[1].hypothesis.id, "h_fps");
    }

    #[test]
    fn ranking_is_stable_under_row_permutation() {
        let rows = vec![
            row("h_fps", ResultStatus::Fail, "r1"),
            row("h_delay", ResultStatus::Pass, "r2"),
            row("h_loss", ResultStatus::Fail, "r3"),
            row("h_fps", ResultStatus::Pass, "r4"),
            row("h_loss", ResultStatus::Fail, "r5"),
        ];
        let forward = state_with(rows.clone());
        let mut reversed_rows = rows;
        reversed_rows.reverse();
        let reversed = state_with(reversed_rows);

        let order_a: Vec<String> = rank_hypotheses(&forward)
            .iter()
            .map(|r| r.hypothesis.id.clone())
            .collect();
        let order_b: Vec<String> = rank_hypotheses(&reversed)
            .iter()
            .map(|r| r.hypothesis.id.clone())
            .collect();
        assert_eq!(order_a, order_b);
    }

    #[test]
    fn confidence_is_support_share_of_top_hypothesis() {
        let state = state_with(vec![
            row("h_fps", ResultStatus::Fail, "r1"),
            row("h_fps", ResultStatus::Fail, "r2"),
            row("h_fps", ResultStatus::Pass, "r3"),
        ]);
        let ranked = rank_hypotheses(&state);
        let confidence = top_hypothesis_confidence(&ranked);
        assert!((confidence - 2.0 / 3.0).abs() < 1e-9);

        let empty = state_with(vec![]);
        assert!((top_hypothesis_confidence(&rank_hypotheses(&empty))).abs() < f64::EPSILON);
    }

    #[test]
    fn rows_for_unknown_hypotheses_are_ignored() {
        let state = state_with(vec![row("h_ghost", ResultStatus::Fail, "r1")]);
        let ranked = rank_hypotheses(&state);
        assert!(ranked.iter().all(|r| r.score == 0));
    }
}
