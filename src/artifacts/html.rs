//! `report.html` writer: the summary data plus rolling-fps and metric-delta
//! tables as pure static HTML. No scripts, so bundles can be opened from
//! restricted file shares.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::artifacts::{format_fixed, write_text_artifact};
use crate::core::errors::Result;
use crate::core::time::{format_utc_millis, to_epoch_millis};
use crate::metrics::diff::MetricsDiffReport;
use crate::metrics::fps::FpsReport;
use crate::run::contract::RunInfo;

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Inputs for the HTML report writer.
#[derive(Debug, Clone)]
pub struct HtmlReportInput<'a> {
    pub run_info: &'a RunInfo,
    pub report: &'a FpsReport,
    pub thresholds_passed: bool,
    pub threshold_failures: &'a [String],
    pub top_anomalies: &'a [String],
    pub metrics_diff: Option<&'a MetricsDiffReport>,
}

/// Writes `<output_dir>/report.html`.
pub fn write_html_report(input: &HtmlReportInput<'_>, output_dir: &Path) -> Result<PathBuf> {
    let mut out = String::new();
    let status_class = if input.thresholds_passed { "pass" } else { "fail" };
    let status_label = if input.thresholds_passed { "PASS" } else { "FAIL" };
    let run = input.run_info;

    out.push_str(concat!(
        "<!doctype html>\n",
        "<html lang=\"en\">\n",
        "<head>\n",
        "  <meta charset=\"utf-8\" />\n",
        "  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n",
        "  <title>LabOps Run Report</title>\n",
        "  <style>\n",
        "    :root { color-scheme: light; }\n",
        "    body { font-family: \"Segoe UI\", \"Helvetica Neue\", Arial, sans-serif; margin: 24px; color: #1f2933; }\n",
        "    h1, h2 { margin-bottom: 8px; }\n",
        "    .meta { color: #52606d; margin-top: 0; }\n",
        "    .status { display: inline-block; padding: 4px 10px; border-radius: 12px; font-weight: 600; }\n",
        "    .status.pass { background: #e8f5e9; color: #1b5e20; }\n",
        "    .status.fail { background: #ffebee; color: #b71c1c; }\n",
        "    table { border-collapse: collapse; width: 100%; margin: 12px 0 20px 0; }\n",
        "    th, td { border: 1px solid #d9e2ec; padding: 8px; text-align: left; }\n",
        "    th { background: #f5f7fa; }\n",
        "    td.numeric { text-align: right; font-variant-numeric: tabular-nums; }\n",
        "    code { background: #f0f4f8; padding: 2px 4px; border-radius: 4px; }\n",
        "  </style>\n",
        "</head>\n",
        "<body>\n",
        "  <h1>LabOps Run Report</h1>\n",
        "  <p class=\"meta\">Static triage report generated by LabOps (no JavaScript required).</p>\n",
    ));
    let _ = writeln!(
        out,
        "  <p><span class=\"status {status_class}\">{status_label}</span></p>"
    );

    out.push_str("\n  <h2>Run Identity</h2>\n  <table aria-label=\"run identity\">\n    <thead><tr><th>Field</th><th>Value</th></tr></thead>\n    <tbody>\n");
    let _ = writeln!(
        out,
        "      <tr><td>run_id</td><td><code>{}</code></td></tr>",
        escape_html(&run.run_id)
    );
    let _ = writeln!(
        out,
        "      <tr><td>scenario_id</td><td><code>{}</code></td></tr>",
        escape_html(&run.config.scenario_id)
    );
    let _ = writeln!(
        out,
        "      <tr><td>backend</td><td><code>{}</code></td></tr>",
        escape_html(&run.config.backend)
    );
    let _ = writeln!(
        out,
        "      <tr><td>seed</td><td class=\"numeric\">{}</td></tr>",
        run.config.seed
    );
    let _ = writeln!(
        out,
        "      <tr><td>duration_ms</td><td class=\"numeric\">{}</td></tr>",
        run.config.duration_ms
    );
    let _ = writeln!(
        out,
        "      <tr><td>started_at_utc</td><td><code>{}</code></td></tr>",
        escape_html(&format_utc_millis(run.timestamps.started_at))
    );
    let _ = writeln!(
        out,
        "      <tr><td>finished_at_utc</td><td><code>{}</code></td></tr>",
        escape_html(&format_utc_millis(run.timestamps.finished_at))
    );
    out.push_str("    </tbody>\n  </table>\n");

    let report = input.report;
    out.push_str("\n  <h2>Key Metrics</h2>\n  <table aria-label=\"key metrics\">\n    <thead><tr><th>Metric</th><th>Value</th></tr></thead>\n    <tbody>\n");
    let metric_rows = [
        ("avg_fps", format_fixed(report.avg_fps, 3)),
        ("frames_total", report.frames_total.to_string()),
        (
            "received_frames_total",
            report.received_frames_total.to_string(),
        ),
        (
            "dropped_frames_total",
            report.dropped_frames_total.to_string(),
        ),
        (
            "drop_rate_percent",
            format_fixed(report.drop_rate_percent, 3),
        ),
        (
            "inter_frame_interval_p95_us",
            format_fixed(report.inter_frame_interval_us.p95_us, 3),
        ),
        (
            "inter_frame_jitter_p95_us",
            format_fixed(report.inter_frame_jitter_us.p95_us, 3),
        ),
    ];
    for (name, value) in metric_rows {
        let _ = writeln!(
            out,
            "      <tr><td>{name}</td><td class=\"numeric\">{value}</td></tr>"
        );
    }
    out.push_str("    </tbody>\n  </table>\n");

    out.push_str("\n  <h2>Threshold Checks</h2>\n");
    if input.thresholds_passed {
        out.push_str("  <p>All configured thresholds passed.</p>\n");
    } else {
        out.push_str("  <ul>\n");
        for failure in input.threshold_failures {
            let _ = writeln!(out, "    <li>{}</li>", escape_html(failure));
        }
        out.push_str("  </ul>\n");
    }

    out.push_str("\n  <h2>Top Anomalies</h2>\n");
    if input.top_anomalies.is_empty() {
        out.push_str("  <p>No notable anomalies detected.</p>\n");
    } else {
        out.push_str("  <ol>\n");
        for anomaly in input.top_anomalies {
            let _ = writeln!(out, "    <li>{}</li>", escape_html(anomaly));
        }
        out.push_str("  </ol>\n");
    }

    out.push_str("\n  <h2>Rolling FPS</h2>\n  <table aria-label=\"rolling fps\">\n    <thead><tr><th>window_end_ms</th><th>frames_in_window</th><th>fps</th></tr></thead>\n    <tbody>\n");
    for sample in &report.rolling_samples {
        let _ = writeln!(
            out,
            "      <tr><td class=\"numeric\">{}</td><td class=\"numeric\">{}</td><td class=\"numeric\">{}</td></tr>",
            to_epoch_millis(sample.window_end),
            sample.frames_in_window,
            format_fixed(sample.fps, 3)
        );
    }
    out.push_str("    </tbody>\n  </table>\n");

    if let Some(diff) = input.metrics_diff {
        out.push_str("\n  <h2>Metric Deltas vs Baseline</h2>\n  <table aria-label=\"metric deltas\">\n    <thead><tr><th>Metric</th><th>Baseline</th><th>Run</th><th>Delta</th><th>Delta %</th></tr></thead>\n    <tbody>\n");
        for delta in &diff.deltas {
            let delta_percent = delta
                .delta_percent
                .map_or_else(|| "n/a".to_string(), |p| format_fixed(p, 3));
            let _ = writeln!(
                out,
                "      <tr><td>{}</td><td class=\"numeric\">{}</td><td class=\"numeric\">{}</td><td class=\"numeric\">{}</td><td class=\"numeric\">{}</td></tr>",
                escape_html(&delta.metric),
                format_fixed(delta.baseline, 3),
                format_fixed(delta.run, 3),
                format_fixed(delta.delta, 3),
                delta_percent
            );
        }
        out.push_str("    </tbody>\n  </table>\n");
    }

    out.push_str("</body>\n</html>\n");
    write_text_artifact(output_dir, "report.html", &out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::from_epoch_millis;
    use crate::run::contract::{RunConfig, RunTimestamps};

    #[test]
    fn html_is_static_and_escapes_content() {
        let dir = tempfile::tempdir().unwrap();
        let ts = from_epoch_millis(0);
        let run_info = RunInfo {
            run_id: "run-<script>".into(),
            config: RunConfig {
                scenario_id: "s".into(),
                backend: "sim".into(),
                seed: 1,
                duration_ms: 100,
            },
            real_device: None,
            webcam_device: None,
            timestamps: RunTimestamps {
                created_at: ts,
                started_at: ts,
                finished_at: ts,
            },
        };
        let report = FpsReport::default();
        let path = write_html_report(
            &HtmlReportInput {
                run_info: &run_info,
                report: &report,
                thresholds_passed: true,
                threshold_failures: &[],
                top_anomalies: &[],
                metrics_diff: None,
            },
            dir.path(),
        )
        .unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.starts_with("<!doctype html>"));
        assert!(!body.contains("<script"), "report must stay script-free");
        assert!(body.contains("run-&lt;script&gt;"));
        assert!(body.contains("class=\"status pass\""));
    }
}
