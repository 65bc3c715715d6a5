//! `summary.md` writer: the one-page human triage summary.

#![allow(missing_docs)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::artifacts::{format_fixed, write_text_artifact};
use crate::core::errors::Result;
use crate::core::time::format_utc_millis;
use crate::metrics::fps::FpsReport;
use crate::run::contract::RunInfo;

/// Manual netem command suggestions rendered into the summary. Commands are
/// suggestions only; labops never executes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetemCommandSuggestions {
    pub profile_id: String,
    pub interface: String,
    pub apply_command: String,
    pub show_command: String,
    pub teardown_command: String,
    pub safety_note: String,
}

/// Inputs for the summary writer.
#[derive(Debug, Clone)]
pub struct RunSummaryInput<'a> {
    pub run_info: &'a RunInfo,
    pub report: &'a FpsReport,
    pub configured_fps: u32,
    pub thresholds_passed: bool,
    pub threshold_failures: &'a [String],
    pub top_anomalies: &'a [String],
    pub netem_suggestions: Option<&'a NetemCommandSuggestions>,
}

/// Writes `<output_dir>/summary.md`.
pub fn write_run_summary_markdown(
    input: &RunSummaryInput<'_>,
    output_dir: &Path,
) -> Result<PathBuf> {
    let mut out = String::new();

    // Intentionally concise so humans can scan it during triage.
    out.push_str("# Run Summary\n\n## Status\n\n");
    let _ = writeln!(
        out,
        "**{}**\n",
        if input.thresholds_passed { "PASS" } else { "FAIL" }
    );

    out.push_str("## Run Identity\n\n");
    let run = input.run_info;
    let _ = writeln!(out, "- run_id: `{}`", run.run_id);
    let _ = writeln!(out, "- scenario_id: `{}`", run.config.scenario_id);
    let _ = writeln!(out, "- backend: `{}`", run.config.backend);
    let _ = writeln!(out, "- seed: `{}`", run.config.seed);
    let _ = writeln!(out, "- duration_ms: `{}`", run.config.duration_ms);
    let _ = writeln!(
        out,
        "- started_at_utc: `{}`",
        format_utc_millis(run.timestamps.started_at)
    );
    let _ = writeln!(
        out,
        "- finished_at_utc: `{}`\n",
        format_utc_millis(run.timestamps.finished_at)
    );

    out.push_str("## Key Metrics\n\n| Metric | Value |\n| --- | --- |\n");
    let report = input.report;
    let _ = writeln!(out, "| configured_fps | {} |", input.configured_fps);
    let _ = writeln!(out, "| avg_fps | {} |", format_fixed(report.avg_fps, 3));
    let _ = writeln!(out, "| frames_total | {} |", report.frames_total);
    let _ = writeln!(
        out,
        "| received_frames_total | {} |",
        report.received_frames_total
    );
    let _ = writeln!(
        out,
        "| dropped_frames_total | {} |",
        report.dropped_frames_total
    );
    let _ = writeln!(
        out,
        "| drop_rate_percent | {} |",
        format_fixed(report.drop_rate_percent, 3)
    );
    let _ = writeln!(
        out,
        "| inter_frame_interval_p95_us | {} |",
        format_fixed(report.inter_frame_interval_us.p95_us, 3)
    );
    let _ = writeln!(
        out,
        "| inter_frame_jitter_p95_us | {} |\n",
        format_fixed(report.inter_frame_jitter_us.p95_us, 3)
    );

    out.push_str("## Threshold Checks\n\n");
    if input.thresholds_passed {
        out.push_str("- All configured thresholds passed.\n\n");
    } else {
        let _ = writeln!(
            out,
            "- Threshold violations: {}",
            input.threshold_failures.len()
        );
        for failure in input.threshold_failures {
            let _ = writeln!(out, "- {failure}");
        }
        out.push('\n');
    }

    out.push_str("## Top Anomalies\n\n");
    if input.top_anomalies.is_empty() {
        out.push_str("1. No notable anomalies detected.\n\n");
    } else {
        for (index, anomaly) in input.top_anomalies.iter().enumerate() {
            let _ = writeln!(out, "{}. {anomaly}", index + 1);
        }
        out.push('\n');
    }

    if let Some(netem) = input.netem_suggestions {
        out.push_str("## Netem Commands (Manual)\n\n");
        let _ = writeln!(out, "- profile_id: `{}`", netem.profile_id);
        let _ = writeln!(out, "- interface: `{}`", netem.interface);
        let _ = writeln!(out, "- note: {}\n", netem.safety_note);
        out.push_str("```bash\n");
        let _ = writeln!(out, "{}", netem.apply_command);
        let _ = writeln!(out, "{}", netem.show_command);
        let _ = writeln!(out, "{}", netem.teardown_command);
        out.push_str("```\n\n");
    }

    write_text_artifact(output_dir, "summary.md", &out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::from_epoch_millis;
    use crate::run::contract::{RunConfig, RunTimestamps};

    fn run_info() -> RunInfo {
        let ts = from_epoch_millis(1_700_000_000_000);
        RunInfo {
            run_id: "run-42".into(),
            config: RunConfig {
                scenario_id: "baseline".into(),
                backend: "sim".into(),
                seed: 42,
                duration_ms: 800,
            },
            real_device: None,
            webcam_device: None,
            timestamps: RunTimestamps {
                created_at: ts,
                started_at: ts,
                finished_at: ts,
            },
        }
    }

    #[test]
    fn pass_summary_has_banner_and_all_passed_line() {
        let dir = tempfile::tempdir().unwrap();
        let info = run_info();
        let report = FpsReport {
            avg_fps: 25.0,
            frames_total: 20,
            received_frames_total: 20,
            ..FpsReport::default()
        };
        let path = write_run_summary_markdown(
            &RunSummaryInput {
                run_info: &info,
                report: &report,
                configured_fps: 25,
                thresholds_passed: true,
                threshold_failures: &[],
                top_anomalies: &[],
                netem_suggestions: None,
            },
            dir.path(),
        )
        .unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.contains("**PASS**"));
        assert!(body.contains("- All configured thresholds passed."));
        assert!(body.contains("1. No notable anomalies detected."));
    }

    #[test]
    fn fail_summary_lists_violations_and_netem_block() {
        let dir = tempfile::tempdir().unwrap();
        let info = run_info();
        let report = FpsReport::default();
        let failures = vec!["avg_fps 0.000 below min_avg_fps 1000.000".to_string()];
        let netem = NetemCommandSuggestions {
            profile_id: "baseline-impairment".into(),
            interface: "eth0".into(),
            apply_command: "sudo tc qdisc add dev eth0 root netem loss 10%".into(),
            show_command: "tc qdisc show dev eth0".into(),
            teardown_command: "sudo tc qdisc del dev eth0 root".into(),
            safety_note: "run only on an isolated lab interface".into(),
        };
        let path = write_run_summary_markdown(
            &RunSummaryInput {
                run_info: &info,
                report: &report,
                configured_fps: 25,
                thresholds_passed: false,
                threshold_failures: &failures,
                top_anomalies: &["Transport anomaly: resend spike counter 120 exceeded threshold 50.".into()],
                netem_suggestions: Some(&netem),
            },
            dir.path(),
        )
        .unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.contains("**FAIL**"));
        assert!(body.contains("Threshold violations: 1"));
        assert!(body.contains("## Netem Commands (Manual)"));
        assert!(body.contains("tc qdisc add dev eth0"));
    }
}
