//! Engineer packet writer: the cross-run Markdown handoff document.
//!
//! Section order is fixed: run context, repro steps, configs tried, what
//! changed, what we ruled out, ranked hypotheses with evidence links.
//! Attempts are sorted by `(sequence, run_id)` so the packet reads the same
//! regardless of wall-clock interleaving, and every evidence run id under a
//! hypothesis is listed exactly once.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::agent::ranker::rank_hypotheses;
use crate::agent::state::{ExperimentState, ResultStatus};
use crate::agent::stop::StopDecision;
use crate::artifacts::write_text_artifact;
use crate::core::errors::{LabOpsError, Result};

/// One knob mutation attempted during the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketConfigAttempt {
    pub sequence: usize,
    pub run_id: String,
    pub knob_name: String,
    pub knob_path: String,
    pub before_value: String,
    pub after_value: String,
    pub scenario_path: PathBuf,
    pub result: ResultStatus,
    pub notes: String,
}

/// Canonical artifact links for one evidence run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketRunEvidence {
    pub run_id: String,
    pub bundle_dir: PathBuf,
    pub run_json_path: PathBuf,
    pub events_jsonl_path: PathBuf,
    pub metrics_json_path: PathBuf,
    pub summary_markdown_path: PathBuf,
    pub diff_json_path: Option<PathBuf>,
    pub diff_markdown_path: Option<PathBuf>,
}

/// Full input contract for the packet writer.
#[derive(Debug, Clone)]
pub struct EngineerPacketInput<'a> {
    pub state: &'a ExperimentState,
    pub symptom: String,
    pub baseline_scenario_path: PathBuf,
    pub baseline_bundle_dir: PathBuf,
    pub stop_decision: StopDecision,
    pub configs_tried: Vec<PacketConfigAttempt>,
    pub run_evidence: Vec<PacketRunEvidence>,
}

fn validate_input(input: &EngineerPacketInput<'_>) -> Result<()> {
    if input.baseline_scenario_path.as_os_str().is_empty() {
        return Err(LabOpsError::Usage {
            details: "baseline_scenario_path cannot be empty".into(),
        });
    }
    if input.baseline_bundle_dir.as_os_str().is_empty() {
        return Err(LabOpsError::Usage {
            details: "baseline_bundle_dir cannot be empty".into(),
        });
    }
    if input.configs_tried.is_empty() {
        return Err(LabOpsError::Usage {
            details: "configs_tried cannot be empty".into(),
        });
    }
    Ok(())
}

fn sorted_attempts(configs_tried: &[PacketConfigAttempt]) -> Vec<&PacketConfigAttempt> {
    let mut attempts: Vec<&PacketConfigAttempt> = configs_tried.iter().collect();
    attempts.sort_by(|a, b| {
        a.sequence
            .cmp(&b.sequence)
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
    attempts
}

fn evidence_map(run_evidence: &[PacketRunEvidence]) -> BTreeMap<&str, &PacketRunEvidence> {
    run_evidence
        .iter()
        .filter(|item| !item.run_id.is_empty())
        .map(|item| (item.run_id.as_str(), item))
        .collect()
}

fn write_evidence_links(out: &mut String, evidence: &PacketRunEvidence) {
    let _ = writeln!(out, "  - bundle: `{}`", evidence.bundle_dir.display());
    let _ = writeln!(out, "  - run_json: `{}`", evidence.run_json_path.display());
    let _ = writeln!(
        out,
        "  - events_jsonl: `{}`",
        evidence.events_jsonl_path.display()
    );
    let _ = writeln!(
        out,
        "  - metrics_json: `{}`",
        evidence.metrics_json_path.display()
    );
    let _ = writeln!(
        out,
        "  - summary_md: `{}`",
        evidence.summary_markdown_path.display()
    );
    if let Some(diff_json) = &evidence.diff_json_path {
        let _ = writeln!(out, "  - diff_json: `{}`", diff_json.display());
    }
    if let Some(diff_md) = &evidence.diff_markdown_path {
        let _ = writeln!(out, "  - diff_md: `{}`", diff_md.display());
    }
}

fn write_repro_steps(
    out: &mut String,
    input: &EngineerPacketInput<'_>,
    attempts: &[&PacketConfigAttempt],
    evidence: &BTreeMap<&str, &PacketRunEvidence>,
) {
    out.push_str("## Repro Steps\n\n");
    let _ = writeln!(
        out,
        "1. Validate baseline scenario: `labops validate {}`",
        input.baseline_scenario_path.display()
    );
    let _ = writeln!(
        out,
        "2. Run baseline scenario and capture bundle under `{}`.",
        input.baseline_bundle_dir.display()
    );
    for (index, attempt) in attempts.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. Apply knob `{}` ({}: `{}` -> `{}`) and run scenario `{}`.",
            index + 3,
            attempt.knob_name,
            attempt.knob_path,
            attempt.before_value,
            attempt.after_value,
            attempt.scenario_path.display()
        );
        if let Some(item) = evidence.get(attempt.run_id.as_str()) {
            let _ = writeln!(out, "   Evidence bundle: `{}`", item.bundle_dir.display());
            if let Some(diff_md) = &item.diff_markdown_path {
                let _ = writeln!(out, "   Diff: `{}`", diff_md.display());
            }
        }
    }
    out.push('\n');
}

fn write_configs_tried(
    out: &mut String,
    attempts: &[&PacketConfigAttempt],
    evidence: &BTreeMap<&str, &PacketRunEvidence>,
) {
    out.push_str("## Configs Tried\n\n");
    out.push_str("| seq | run_id | knob | from | to | result | scenario_path | diff_md |\n");
    out.push_str("| --- | --- | --- | --- | --- | --- | --- | --- |\n");
    for attempt in attempts {
        let diff_md = evidence
            .get(attempt.run_id.as_str())
            .and_then(|item| item.diff_markdown_path.as_ref())
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "| {} | `{}` | `{}` | `{}` | `{}` | `{}` | `{}` | `{}` |",
            attempt.sequence,
            attempt.run_id,
            attempt.knob_name,
            attempt.before_value,
            attempt.after_value,
            attempt.result.as_str(),
            attempt.scenario_path.display(),
            diff_md
        );
    }
    out.push('\n');
}

fn write_what_changed(out: &mut String, attempts: &[&PacketConfigAttempt]) {
    out.push_str("## What Changed\n\n");
    for attempt in attempts {
        let _ = writeln!(
            out,
            "- [`{}`] changed `{}` from `{}` to `{}` using scenario `{}`.",
            attempt.run_id,
            attempt.knob_path,
            attempt.before_value,
            attempt.after_value,
            attempt.scenario_path.display()
        );
    }
    out.push('\n');
}

fn write_ruled_out(
    out: &mut String,
    attempts: &[&PacketConfigAttempt],
    evidence: &BTreeMap<&str, &PacketRunEvidence>,
) {
    out.push_str("## What We Ruled Out\n\n");
    let mut wrote_any = false;
    for attempt in attempts {
        if attempt.result != ResultStatus::Pass {
            continue;
        }
        wrote_any = true;
        let _ = writeln!(
            out,
            "- `{}` (`{}` -> `{}`) did not reproduce failure (run `{}`).",
            attempt.knob_name, attempt.before_value, attempt.after_value, attempt.run_id
        );
        if let Some(item) = evidence.get(attempt.run_id.as_str()) {
            let _ = writeln!(out, "  - run_json: `{}`", item.run_json_path.display());
            if let Some(diff_md) = &item.diff_markdown_path {
                let _ = writeln!(out, "  - diff_md: `{}`", diff_md.display());
            }
        }
    }
    if !wrote_any {
        out.push_str("- No configurations have been confidently ruled out yet.\n");
    }
    out.push('\n');
}

fn write_ranked_hypotheses(
    out: &mut String,
    input: &EngineerPacketInput<'_>,
    evidence: &BTreeMap<&str, &PacketRunEvidence>,
) {
    out.push_str("## Ranked Hypotheses + Evidence Links\n\n");
    let ranked = rank_hypotheses(input.state);
    if ranked.is_empty() {
        out.push_str("- No hypotheses recorded.\n\n");
        return;
    }

    for (index, rank) in ranked.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. [`{}`] score={} status=`{}` variable=`{}`",
            index + 1,
            rank.hypothesis.id,
            rank.score,
            rank.hypothesis.status.as_str(),
            rank.hypothesis.variable_name
        );
        let _ = writeln!(out, "   - statement: {}", rank.hypothesis.statement);
        let _ = writeln!(
            out,
            "   - support_count: {}, contradiction_count: {}",
            rank.support_count, rank.contradiction_count
        );

        let mut seen_runs = BTreeSet::new();
        for row_index in &rank.row_indices {
            let row = &input.state.results_table[*row_index];
            if row.evidence_run_id.is_empty() || !seen_runs.insert(row.evidence_run_id.as_str()) {
                continue;
            }
            let _ = writeln!(
                out,
                "   - evidence run `{}` result=`{}`",
                row.evidence_run_id,
                row.result.as_str()
            );
            match evidence.get(row.evidence_run_id.as_str()) {
                Some(item) => write_evidence_links(out, item),
                None => out.push_str("     - artifact links unavailable for this run id\n"),
            }
        }
    }
    out.push('\n');
}

/// Writes `<output_dir>/engineer_packet.md`.
pub fn write_engineer_packet_markdown(
    input: &EngineerPacketInput<'_>,
    output_dir: &Path,
) -> Result<PathBuf> {
    validate_input(input)?;
    let attempts = sorted_attempts(&input.configs_tried);
    let evidence = evidence_map(&input.run_evidence);

    let mut out = String::from("# Engineer Packet\n\n## Run Context\n\n");
    let _ = writeln!(out, "- session_id: `{}`", input.state.session_id);
    let _ = writeln!(out, "- scenario_id: `{}`", input.state.scenario_id);
    let _ = writeln!(out, "- symptom: `{}`", input.symptom);
    let _ = writeln!(
        out,
        "- baseline_scenario: `{}`",
        input.baseline_scenario_path.display()
    );
    let _ = writeln!(
        out,
        "- baseline_bundle: `{}`",
        input.baseline_bundle_dir.display()
    );
    let _ = writeln!(out, "- stop_reason: `{}`", input.stop_decision.reason.as_str());
    let _ = writeln!(
        out,
        "- stop_explanation: {}\n",
        input.stop_decision.explanation
    );

    write_repro_steps(&mut out, input, &attempts, &evidence);
    write_configs_tried(&mut out, &attempts, &evidence);
    write_what_changed(&mut out, &attempts);
    write_ruled_out(&mut out, &attempts, &evidence);
    write_ranked_hypotheses(&mut out, input, &evidence);

    write_text_artifact(output_dir, "engineer_packet.md", &out)
}
