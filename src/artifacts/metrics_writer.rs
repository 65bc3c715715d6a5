//! `metrics.csv` and `metrics.json` writers.
//!
//! Both forms print every numeric field at fixed six-decimal precision so
//! seeded runs produce byte-stable artifacts. Timing and jitter stats are
//! emitted as dedicated metric rows so downstream tools can compare run
//! quality without parsing event-level traces.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::artifacts::{format_fixed, write_text_artifact};
use crate::core::errors::Result;
use crate::core::time::to_epoch_millis;
use crate::metrics::fps::{FpsReport, TimingStatsUs};
use crate::metrics::diff::METRICS_CSV_HEADER;

fn push_timing_rows(out: &mut String, prefix: &str, stats: TimingStatsUs) {
    let _ = writeln!(
        out,
        "{prefix}_min_us,,,{},{}",
        stats.sample_count,
        format_fixed(stats.min_us, 6)
    );
    let _ = writeln!(
        out,
        "{prefix}_avg_us,,,{},{}",
        stats.sample_count,
        format_fixed(stats.avg_us, 6)
    );
    let _ = writeln!(
        out,
        "{prefix}_p95_us,,,{},{}",
        stats.sample_count,
        format_fixed(stats.p95_us, 6)
    );
}

/// Writes `<output_dir>/metrics.csv`.
pub fn write_metrics_csv(report: &FpsReport, output_dir: &Path) -> Result<PathBuf> {
    let mut out = String::new();
    let _ = writeln!(out, "{METRICS_CSV_HEADER}");
    let _ = writeln!(
        out,
        "avg_fps,,{},{},{}",
        report.avg_window_ms,
        report.received_frames_total,
        format_fixed(report.avg_fps, 6)
    );
    let _ = writeln!(
        out,
        "drops_total,,,{},{}",
        report.frames_total,
        format_fixed(report.dropped_frames_total as f64, 6)
    );
    let _ = writeln!(
        out,
        "drops_generic_total,,,{},{}",
        report.frames_total,
        format_fixed(report.dropped_generic_frames_total as f64, 6)
    );
    let _ = writeln!(
        out,
        "timeouts_total,,,{},{}",
        report.frames_total,
        format_fixed(report.timeout_frames_total as f64, 6)
    );
    let _ = writeln!(
        out,
        "incomplete_total,,,{},{}",
        report.frames_total,
        format_fixed(report.incomplete_frames_total as f64, 6)
    );
    let _ = writeln!(
        out,
        "drop_rate_percent,,,{},{}",
        report.frames_total,
        format_fixed(report.drop_rate_percent, 6)
    );
    let _ = writeln!(
        out,
        "generic_drop_rate_percent,,,{},{}",
        report.frames_total,
        format_fixed(report.generic_drop_rate_percent, 6)
    );
    let _ = writeln!(
        out,
        "timeout_rate_percent,,,{},{}",
        report.frames_total,
        format_fixed(report.timeout_rate_percent, 6)
    );
    let _ = writeln!(
        out,
        "incomplete_rate_percent,,,{},{}",
        report.frames_total,
        format_fixed(report.incomplete_rate_percent, 6)
    );

    for sample in &report.rolling_samples {
        let _ = writeln!(
            out,
            "rolling_fps,{},{},{},{}",
            to_epoch_millis(sample.window_end),
            report.rolling_window_ms,
            sample.frames_in_window,
            format_fixed(sample.fps, 6)
        );
    }

    push_timing_rows(&mut out, "inter_frame_interval", report.inter_frame_interval_us);
    push_timing_rows(&mut out, "inter_frame_jitter", report.inter_frame_jitter_us);

    write_text_artifact(output_dir, "metrics.csv", &out)
}

fn timing_stats_json(stats: TimingStatsUs) -> String {
    format!(
        "{{\"sample_count\":{},\"min_us\":{},\"avg_us\":{},\"p95_us\":{}}}",
        stats.sample_count,
        format_fixed(stats.min_us, 6),
        format_fixed(stats.avg_us, 6),
        format_fixed(stats.p95_us, 6)
    )
}

/// Writes `<output_dir>/metrics.json`.
pub fn write_metrics_json(report: &FpsReport, output_dir: &Path) -> Result<PathBuf> {
    let mut out = String::from("{\n");
    let _ = writeln!(out, "  \"avg_window_ms\":{},", report.avg_window_ms);
    let _ = writeln!(out, "  \"rolling_window_ms\":{},", report.rolling_window_ms);
    let _ = writeln!(out, "  \"frames_total\":{},", report.frames_total);
    let _ = writeln!(
        out,
        "  \"received_frames_total\":{},",
        report.received_frames_total
    );
    let _ = writeln!(
        out,
        "  \"dropped_frames_total\":{},",
        report.dropped_frames_total
    );
    let _ = writeln!(
        out,
        "  \"dropped_generic_frames_total\":{},",
        report.dropped_generic_frames_total
    );
    let _ = writeln!(out, "  \"timeout_frames_total\":{},", report.timeout_frames_total);
    let _ = writeln!(
        out,
        "  \"incomplete_frames_total\":{},",
        report.incomplete_frames_total
    );
    let _ = writeln!(
        out,
        "  \"drop_rate_percent\":{},",
        format_fixed(report.drop_rate_percent, 6)
    );
    let _ = writeln!(out, "  \"avg_fps\":{},", format_fixed(report.avg_fps, 6));
    let _ = writeln!(
        out,
        "  \"inter_frame_interval_us\":{},",
        timing_stats_json(report.inter_frame_interval_us)
    );
    let _ = writeln!(
        out,
        "  \"inter_frame_jitter_us\":{},",
        timing_stats_json(report.inter_frame_jitter_us)
    );

    out.push_str("  \"rolling_fps\":[");
    for (index, sample) in report.rolling_samples.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        let _ = write!(
            out,
            "{{\"window_end_ms\":{},\"frames_in_window\":{},\"fps\":{}}}",
            to_epoch_millis(sample.window_end),
            sample.frames_in_window,
            format_fixed(sample.fps, 6)
        );
    }
    out.push_str("]\n}");

    write_text_artifact(output_dir, "metrics.json", &out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{FrameOutcome, FrameSample};
    use crate::core::time::from_epoch_millis;
    use crate::metrics::fps::compute_fps_report;

    fn report() -> FpsReport {
        let frames: Vec<FrameSample> = (0..20)
            .map(|i| FrameSample {
                frame_id: i,
                timestamp: from_epoch_millis(i64::try_from(i).unwrap() * 40),
                size_bytes: 4096,
                outcome: FrameOutcome::Received,
                dropped: None,
            })
            .collect();
        compute_fps_report(&frames, 800, 1000).unwrap()
    }

    #[test]
    fn csv_round_trips_through_the_diff_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_metrics_csv(&report(), dir.path()).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.starts_with(METRICS_CSV_HEADER));
        assert!(body.contains("avg_fps,,800,20,25.000000"));
        assert!(body.ends_with('\n'));

        // The diff computer must accept our own output.
        let diff =
            crate::metrics::diff::compute_metrics_diff_from_csv(&path, &path).unwrap();
        assert!(diff.deltas.iter().all(|d| d.delta.abs() < 1e-12));
    }

    #[test]
    fn json_is_valid_and_fixed_precision() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_metrics_json(&report(), dir.path()).unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["frames_total"], 20);
        assert!(body.contains("\"avg_fps\":25.000000"));
        assert_eq!(parsed["rolling_fps"].as_array().unwrap().len(), 20);
    }
}
