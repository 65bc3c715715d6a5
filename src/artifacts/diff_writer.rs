//! `diff.json` and `diff.md` writers for baseline/run metric comparisons.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::artifacts::{format_fixed, write_text_artifact};
use crate::core::errors::Result;
use crate::metrics::diff::MetricsDiffReport;

fn escape_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Writes `<output_dir>/diff.json`.
pub fn write_metrics_diff_json(report: &MetricsDiffReport, output_dir: &Path) -> Result<PathBuf> {
    let (increased, decreased, unchanged) = report.change_summary();

    let mut out = String::from("{\n  \"schema_version\":\"1.0\",\n");
    let _ = writeln!(
        out,
        "  \"baseline_metrics_csv\":\"{}\",",
        escape_json(&report.baseline_metrics_csv_path.display().to_string())
    );
    let _ = writeln!(
        out,
        "  \"run_metrics_csv\":\"{}\",",
        escape_json(&report.run_metrics_csv_path.display().to_string())
    );
    out.push_str("  \"compared_metrics\":[");
    for (index, delta) in report.deltas.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        let delta_percent = delta
            .delta_percent
            .map_or_else(|| "null".to_string(), |p| format_fixed(p, 6));
        let _ = write!(
            out,
            "\n    {{\"metric\":\"{}\",\"baseline\":{},\"run\":{},\"delta\":{},\"delta_percent\":{}}}",
            escape_json(&delta.metric),
            format_fixed(delta.baseline, 6),
            format_fixed(delta.run, 6),
            format_fixed(delta.delta, 6),
            delta_percent
        );
    }
    let _ = write!(
        out,
        "\n  ],\n  \"summary\":{{\"increased\":{increased},\"decreased\":{decreased},\"unchanged\":{unchanged}}}\n}}"
    );

    write_text_artifact(output_dir, "diff.json", &out)
}

/// Writes `<output_dir>/diff.md`.
pub fn write_metrics_diff_markdown(
    report: &MetricsDiffReport,
    output_dir: &Path,
) -> Result<PathBuf> {
    let (increased, decreased, unchanged) = report.change_summary();

    let mut out = String::from("# Metrics Diff\n\n");
    let _ = writeln!(
        out,
        "Baseline metrics: `{}`\n",
        report.baseline_metrics_csv_path.display()
    );
    let _ = writeln!(
        out,
        "Run metrics: `{}`\n",
        report.run_metrics_csv_path.display()
    );
    out.push_str("| Metric | Baseline | Run | Delta | Delta % |\n| --- | ---: | ---: | ---: | ---: |\n");
    for delta in &report.deltas {
        let sign = if delta.delta >= 0.0 { "+" } else { "" };
        let delta_percent = delta.delta_percent.map_or_else(
            || "n/a".to_string(),
            |p| {
                let sign = if p >= 0.0 { "+" } else { "" };
                format!("{sign}{}%", format_fixed(p, 6))
            },
        );
        let _ = writeln!(
            out,
            "| {} | {} | {} | {sign}{} | {delta_percent} |",
            delta.metric,
            format_fixed(delta.baseline, 6),
            format_fixed(delta.run, 6),
            format_fixed(delta.delta, 6)
        );
    }
    let _ = writeln!(
        out,
        "\nSummary: increased={increased}, decreased={decreased}, unchanged={unchanged}"
    );

    write_text_artifact(output_dir, "diff.md", &out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::diff::MetricDelta;
    use std::path::PathBuf;

    fn report() -> MetricsDiffReport {
        MetricsDiffReport {
            baseline_metrics_csv_path: PathBuf::from("/tmp/base/metrics.csv"),
            run_metrics_csv_path: PathBuf::from("/tmp/run/metrics.csv"),
            deltas: vec![
                MetricDelta {
                    metric: "avg_fps".into(),
                    baseline: 25.0,
                    run: 20.0,
                    delta: -5.0,
                    delta_percent: Some(-20.0),
                },
                MetricDelta {
                    metric: "drops_total".into(),
                    baseline: 0.0,
                    run: 4.0,
                    delta: 4.0,
                    delta_percent: None,
                },
            ],
        }
    }

    #[test]
    fn diff_json_serializes_null_delta_percent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_metrics_diff_json(&report(), dir.path()).unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        let metrics = parsed["compared_metrics"].as_array().unwrap();
        assert_eq!(metrics[0]["delta_percent"], -20.0);
        assert!(metrics[1]["delta_percent"].is_null());
        assert_eq!(parsed["summary"]["increased"], 1);
        assert_eq!(parsed["summary"]["decreased"], 1);
    }

    #[test]
    fn diff_markdown_signs_deltas_and_marks_na() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_metrics_diff_markdown(&report(), dir.path()).unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.contains("| avg_fps | 25.000000 | 20.000000 | -5.000000 | -20.000000% |"));
        assert!(body.contains("| drops_total | 0.000000 | 4.000000 | +4.000000 | n/a |"));
        assert!(body.contains("Summary: increased=1, decreased=1, unchanged=0"));
    }
}
