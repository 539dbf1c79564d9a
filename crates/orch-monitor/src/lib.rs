//! Performance Monitor (C10): ring-buffered metric series, task lifecycle
//! tracking, system sampling and threshold-driven alerting.

mod monitor;
mod ring;
pub mod types;

pub use monitor::{MonitorConfig, PerformanceMonitor};
pub use types::{
    AlertSeverity, MetricStats, PerfMetricType, PerformanceAlert, PerformanceSample,
    PerformanceThreshold, SystemSample, TaskRun, TaskRunStatus,
};
