//! Baseline vs. run metric diffing from `metrics.csv` files.
//!
//! Both files must carry the fixed metrics header; every non-rolling row is
//! treated as a scalar summary metric. Deltas are reported for the metric
//! intersection, preferred triage metrics first, remaining keys in
//! lexicographic order.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{LabOpsError, Result};

/// Fixed metrics CSV header shared by the writer and this reader.
pub const METRICS_CSV_HEADER: &str = "metric,window_end_ms,window_ms,frames,fps";

const NEAR_ZERO: f64 = 1e-12;

/// One per-metric delta between a baseline and a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDelta {
    pub metric: String,
    pub baseline: f64,
    pub run: f64,
    pub delta: f64,
    /// Absent when the baseline is near zero and the run is not; zero when
    /// both sides are near zero.
    pub delta_percent: Option<f64>,
}

/// Full diff report between two metrics files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsDiffReport {
    pub baseline_metrics_csv_path: PathBuf,
    pub run_metrics_csv_path: PathBuf,
    pub deltas: Vec<MetricDelta>,
}

impl MetricsDiffReport {
    /// Counts of increased / decreased / unchanged metrics.
    #[must_use]
    pub fn change_summary(&self) -> (usize, usize, usize) {
        let mut increased = 0;
        let mut decreased = 0;
        let mut unchanged = 0;
        for delta in &self.deltas {
            if delta.delta > NEAR_ZERO {
                increased += 1;
            } else if delta.delta < -NEAR_ZERO {
                decreased += 1;
            } else {
                unchanged += 1;
            }
        }
        (increased, decreased, unchanged)
    }
}

const PREFERRED_METRIC_ORDER: &[&str] = &[
    "avg_fps",
    "drops_total",
    "drops_generic_total",
    "timeouts_total",
    "incomplete_total",
    "drop_rate_percent",
    "generic_drop_rate_percent",
    "timeout_rate_percent",
    "incomplete_rate_percent",
    "inter_frame_interval_min_us",
    "inter_frame_interval_avg_us",
    "inter_frame_interval_p95_us",
    "inter_frame_jitter_min_us",
    "inter_frame_jitter_avg_us",
    "inter_frame_jitter_p95_us",
];

fn load_summary_metrics(path: &Path) -> Result<BTreeMap<String, f64>> {
    let text = fs::read_to_string(path).map_err(|e| LabOpsError::io(path, e))?;
    let mut lines = text.lines();

    let header = lines.next().ok_or_else(|| LabOpsError::Parse {
        context: "metrics csv",
        details: format!("metrics csv is empty: {}", path.display()),
    })?;
    if header.trim_end_matches('\r') != METRICS_CSV_HEADER {
        return Err(LabOpsError::Parse {
            context: "metrics csv",
            details: format!("metrics csv header mismatch for file: {}", path.display()),
        });
    }

    let mut metric_values = BTreeMap::new();
    for (line_number, raw_line) in lines.enumerate() {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        // The metrics CSV never quotes commas; a strict split catches
        // contract drift early.
        let columns: Vec<&str> = line.split(',').collect();
        if columns.len() != 5 {
            return Err(LabOpsError::Parse {
                context: "metrics csv",
                details: format!(
                    "invalid metrics csv row at line {} in file: {}",
                    line_number + 2,
                    path.display()
                ),
            });
        }
        let metric_name = columns[0];
        if metric_name.is_empty() {
            return Err(LabOpsError::Parse {
                context: "metrics csv",
                details: format!(
                    "empty metric name at line {} in file: {}",
                    line_number + 2,
                    path.display()
                ),
            });
        }
        if metric_name == "rolling_fps" {
            continue;
        }
        let value: f64 = columns[4].parse().map_err(|_| LabOpsError::Parse {
            context: "metrics csv",
            details: format!(
                "invalid metric value at line {} in file: {}",
                line_number + 2,
                path.display()
            ),
        })?;
        if metric_values.insert(metric_name.to_string(), value).is_some() {
            return Err(LabOpsError::Parse {
                context: "metrics csv",
                details: format!(
                    "duplicate summary metric row for '{}' in file: {}",
                    metric_name,
                    path.display()
                ),
            });
        }
    }

    if metric_values.is_empty() {
        return Err(LabOpsError::Parse {
            context: "metrics csv",
            details: format!("no summary metrics found in file: {}", path.display()),
        });
    }
    Ok(metric_values)
}

fn build_delta(metric: &str, baseline: f64, run: f64) -> MetricDelta {
    let delta = run - baseline;
    let delta_percent = if baseline.abs() <= NEAR_ZERO {
        if run.abs() <= NEAR_ZERO { Some(0.0) } else { None }
    } else {
        Some(delta / baseline * 100.0)
    };
    MetricDelta {
        metric: metric.to_string(),
        baseline,
        run,
        delta,
        delta_percent,
    }
}

/// Computes the per-metric diff between two metrics CSV files.
///
/// At least one overlapping summary metric is required; an empty
/// intersection is an error.
pub fn compute_metrics_diff_from_csv(
    baseline_metrics_csv_path: &Path,
    run_metrics_csv_path: &Path,
) -> Result<MetricsDiffReport> {
    let baseline_values = load_summary_metrics(baseline_metrics_csv_path)?;
    let run_values = load_summary_metrics(run_metrics_csv_path)?;

    let mut remaining: Vec<&String> = baseline_values
        .keys()
        .filter(|metric| run_values.contains_key(*metric))
        .collect();

    let mut report = MetricsDiffReport {
        baseline_metrics_csv_path: baseline_metrics_csv_path.to_path_buf(),
        run_metrics_csv_path: run_metrics_csv_path.to_path_buf(),
        deltas: Vec::new(),
    };

    for metric in PREFERRED_METRIC_ORDER {
        if let Some(position) = remaining.iter().position(|name| name.as_str() == *metric) {
            let name = remaining.remove(position);
            report
                .deltas
                .push(build_delta(name, baseline_values[name], run_values[name]));
        }
    }
    // `remaining` came from a BTreeMap walk, so leftovers are already
    // lexicographic.
    for name in remaining {
        report
            .deltas
            .push(build_delta(name, baseline_values[name], run_values[name]));
    }

    if report.deltas.is_empty() {
        return Err(LabOpsError::Parse {
            context: "metrics diff",
            details: "no overlapping summary metrics to compare".into(),
        });
    }
    Ok(report)
}
