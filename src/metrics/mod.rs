//! Run metrics: FPS report computation and baseline/run diffing.

pub mod diff;
pub mod fps;

pub use diff::{MetricDelta, MetricsDiffReport, compute_metrics_diff_from_csv};
pub use fps::{FpsReport, RollingFpsSample, TimingStatsUs, compute_fps_report};
