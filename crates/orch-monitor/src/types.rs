//! Data model for the Performance Monitor: metric samples, task runs,
//! system samples, thresholds and alerts.

use chrono::{DateTime, Utc};
use orch_core::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerfMetricType {
    ResponseTime,
    TaskDuration,
    CpuUsage,
    MemoryUsage,
    NetworkIo,
    DiskIo,
    TaskSuccessRate,
    TaskFailureRate,
    Throughput,
    QueueLength,
    ErrorRate,
    AgentUtilization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunStatus {
    Started,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl TaskRunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskRunStatus::Started)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub metric_type: PerfMetricType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub agent_id: Option<AgentId>,
    pub task_id: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub task_id: String,
    pub agent_id: AgentId,
    pub task_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: TaskRunStatus,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_mb: f64,
    pub disk_io_read_mb: f64,
    pub disk_io_write_mb: f64,
    pub network_io_sent_mb: f64,
    pub network_io_recv_mb: f64,
    pub active_agents: u32,
    pub active_tasks: u32,
    pub queue_length: u32,
}

/// A threshold rule watched by the alert engine. `consecutive_breaches`
/// governs only the WARNING tier — a single sample at or above
/// `critical_threshold` alerts immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceThreshold {
    pub metric_type: PerfMetricType,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub duration_secs: i64,
    pub consecutive_breaches: u32,
}

impl PerformanceThreshold {
    pub fn new(metric_type: PerfMetricType, warning_threshold: f64, critical_threshold: f64) -> Self {
        Self {
            metric_type,
            warning_threshold,
            critical_threshold,
            duration_secs: 60,
            consecutive_breaches: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub alert_id: String,
    pub severity: AlertSeverity,
    pub metric_type: PerfMetricType,
    pub message: String,
    pub current_value: f64,
    pub threshold_value: f64,
    pub timestamp: DateTime<Utc>,
    pub agent_id: Option<AgentId>,
    pub acknowledged: bool,
    pub resolved: bool,
}

/// On-demand summary over a metric's recent samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricStats {
    pub metric_type: PerfMetricType,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p95: f64,
}
