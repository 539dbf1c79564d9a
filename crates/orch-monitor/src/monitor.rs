//! The `PerformanceMonitor` engine: records samples and task lifecycle
//! events, checks them against thresholds, and raises deduplicated alerts.

use crate::ring::BoundedSeries;
use crate::types::{
    AlertSeverity, MetricStats, PerfMetricType, PerformanceAlert, PerformanceSample,
    PerformanceThreshold, SystemSample, TaskRun, TaskRunStatus,
};
use chrono::{Duration as ChronoDuration, Utc};
use orch_core::{AgentId, OrchError, OrchResult};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub global_capacity: usize,
    pub per_agent_capacity: usize,
    pub completed_tasks_capacity: usize,
    pub alert_history_capacity: usize,
    pub system_history_capacity: usize,
    pub stats_cache_ttl_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            global_capacity: 10_000,
            per_agent_capacity: 1_000,
            completed_tasks_capacity: 10_000,
            alert_history_capacity: 1_000,
            system_history_capacity: 10_000,
            stats_cache_ttl_secs: 5,
        }
    }
}

pub struct PerformanceMonitor {
    config: MonitorConfig,
    global_series: RwLock<HashMap<PerfMetricType, BoundedSeries<PerformanceSample>>>,
    agent_series: RwLock<HashMap<(AgentId, PerfMetricType), BoundedSeries<PerformanceSample>>>,
    active_tasks: RwLock<HashMap<String, TaskRun>>,
    completed_tasks: RwLock<BoundedSeries<TaskRun>>,
    system_history: RwLock<BoundedSeries<SystemSample>>,
    thresholds: RwLock<Vec<PerformanceThreshold>>,
    breach_counters: RwLock<HashMap<String, u32>>,
    active_alerts: RwLock<HashMap<String, PerformanceAlert>>,
    alert_history: RwLock<BoundedSeries<PerformanceAlert>>,
    stats_cache: RwLock<HashMap<PerfMetricType, (Instant, MetricStats)>>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            completed_tasks: RwLock::new(BoundedSeries::new(config.completed_tasks_capacity)),
            system_history: RwLock::new(BoundedSeries::new(config.system_history_capacity)),
            alert_history: RwLock::new(BoundedSeries::new(config.alert_history_capacity)),
            global_series: RwLock::new(HashMap::new()),
            agent_series: RwLock::new(HashMap::new()),
            active_tasks: RwLock::new(HashMap::new()),
            thresholds: RwLock::new(Vec::new()),
            breach_counters: RwLock::new(HashMap::new()),
            active_alerts: RwLock::new(HashMap::new()),
            stats_cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub async fn register_threshold(&self, threshold: PerformanceThreshold) {
        let mut thresholds = self.thresholds.write().await;
        thresholds.retain(|t| t.metric_type != threshold.metric_type);
        thresholds.push(threshold);
    }

    pub async fn record_metric(
        &self,
        metric_type: PerfMetricType,
        value: f64,
        agent_id: Option<AgentId>,
        task_id: Option<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> OrchResult<()> {
        let sample = PerformanceSample {
            metric_type,
            value,
            timestamp: Utc::now(),
            agent_id: agent_id.clone(),
            task_id,
            metadata,
        };

        {
            let mut global = self.global_series.write().await;
            global
                .entry(metric_type)
                .or_insert_with(|| BoundedSeries::new(self.config.global_capacity))
                .push(sample.clone());
        }
        if let Some(agent) = agent_id {
            let mut per_agent = self.agent_series.write().await;
            per_agent
                .entry((agent, metric_type))
                .or_insert_with(|| BoundedSeries::new(self.config.per_agent_capacity))
                .push(sample);
        }

        self.stats_cache.write().await.remove(&metric_type);
        self.check_thresholds(metric_type).await;
        Ok(())
    }

    pub async fn start_task(
        &self,
        task_id: impl Into<String>,
        agent_id: AgentId,
        task_type: impl Into<String>,
    ) -> OrchResult<()> {
        let task_id = task_id.into();
        let run = TaskRun {
            task_id: task_id.clone(),
            agent_id,
            task_type: task_type.into(),
            start_time: Utc::now(),
            end_time: None,
            status: TaskRunStatus::Started,
            duration_ms: None,
        };
        self.active_tasks.write().await.insert(task_id, run);
        Ok(())
    }

    pub async fn end_task(&self, task_id: &str, status: TaskRunStatus) -> OrchResult<TaskRun> {
        if !status.is_terminal() {
            return Err(OrchError::invalid_argument(
                "end_task requires a terminal status",
            ));
        }
        let mut run = self
            .active_tasks
            .write()
            .await
            .remove(task_id)
            .ok_or_else(|| OrchError::not_found(format!("no active task '{task_id}'")))?;

        let end = Utc::now();
        run.duration_ms = Some((end - run.start_time).num_milliseconds());
        run.end_time = Some(end);
        run.status = status;

        self.completed_tasks.write().await.push(run.clone());

        let agent_id = run.agent_id.clone();
        self.record_metric(
            PerfMetricType::TaskDuration,
            run.duration_ms.unwrap_or(0) as f64,
            Some(agent_id.clone()),
            Some(run.task_id.clone()),
            HashMap::new(),
        )
        .await?;

        let success_metric = if status == TaskRunStatus::Completed {
            PerfMetricType::TaskSuccessRate
        } else {
            PerfMetricType::TaskFailureRate
        };
        self.record_metric(
            success_metric,
            1.0,
            Some(agent_id),
            Some(run.task_id.clone()),
            HashMap::new(),
        )
        .await?;

        Ok(run)
    }

    pub async fn record_system_sample(&self, sample: SystemSample) -> OrchResult<()> {
        self.system_history.write().await.push(sample.clone());
        self.record_metric(PerfMetricType::CpuUsage, sample.cpu_percent, None, None, HashMap::new())
            .await?;
        self.record_metric(
            PerfMetricType::MemoryUsage,
            sample.memory_percent,
            None,
            None,
            HashMap::new(),
        )
        .await?;
        self.record_metric(
            PerfMetricType::QueueLength,
            sample.queue_length as f64,
            None,
            None,
            HashMap::new(),
        )
        .await?;
        Ok(())
    }

    async fn recent_samples(&self, metric_type: PerfMetricType, duration_secs: i64) -> Vec<PerformanceSample> {
        let cutoff = Utc::now() - ChronoDuration::seconds(duration_secs);
        let series = self.global_series.read().await;
        series
            .get(&metric_type)
            .map(|s| s.iter().filter(|m| m.timestamp >= cutoff).cloned().collect())
            .unwrap_or_default()
    }

    /// Mirrors the suppression rule of the reference alert engine: a
    /// CRITICAL breach alerts on the first sample; a WARNING breach must
    /// repeat `consecutive_breaches` times running before it alerts, and
    /// the counter resets the moment the metric falls back under the
    /// warning line or an alert fires.
    async fn check_thresholds(&self, metric_type: PerfMetricType) {
        let threshold = {
            let thresholds = self.thresholds.read().await;
            match thresholds.iter().find(|t| t.metric_type == metric_type) {
                Some(t) => t.clone(),
                None => return,
            }
        };

        let recent = self.recent_samples(metric_type, threshold.duration_secs).await;
        if recent.is_empty() {
            return;
        }
        let avg = recent.iter().map(|s| s.value).sum::<f64>() / recent.len() as f64;
        let breach_key = format!("{metric_type:?}_warning");

        if avg >= threshold.critical_threshold {
            self.generate_alert(AlertSeverity::Critical, metric_type, avg, threshold.critical_threshold)
                .await;
            self.breach_counters.write().await.insert(breach_key, 0);
        } else if avg >= threshold.warning_threshold {
            let count = {
                let mut counters = self.breach_counters.write().await;
                let counter = counters.entry(breach_key.clone()).or_insert(0);
                *counter += 1;
                *counter
            };
            if count >= threshold.consecutive_breaches {
                self.generate_alert(AlertSeverity::Warning, metric_type, avg, threshold.warning_threshold)
                    .await;
                self.breach_counters.write().await.insert(breach_key, 0);
            }
        } else {
            self.breach_counters.write().await.insert(breach_key, 0);
        }
    }

    /// Skips raising a new alert if an unresolved alert of the same
    /// metric type and severity is already active — flapping just updates
    /// the existing one's timestamp instead of paging twice.
    async fn generate_alert(
        &self,
        severity: AlertSeverity,
        metric_type: PerfMetricType,
        current_value: f64,
        threshold_value: f64,
    ) {
        let mut active = self.active_alerts.write().await;
        if let Some(existing) = active
            .values_mut()
            .find(|a| a.metric_type == metric_type && a.severity == severity && !a.resolved)
        {
            existing.current_value = current_value;
            existing.timestamp = Utc::now();
            return;
        }

        let alert_id = format!("{metric_type:?}_{severity:?}_{}", Utc::now().timestamp_millis());
        let alert = PerformanceAlert {
            alert_id: alert_id.clone(),
            severity,
            metric_type,
            message: format!(
                "{metric_type:?} averaged {current_value:.2}, {severity:?} threshold is {threshold_value:.2}"
            ),
            current_value,
            threshold_value,
            timestamp: Utc::now(),
            agent_id: None,
            acknowledged: false,
            resolved: false,
        };
        tracing::warn!(alert_id = %alert_id, ?metric_type, ?severity, current_value, "performance alert raised");
        active.insert(alert_id, alert.clone());
        drop(active);
        self.alert_history.write().await.push(alert);
    }

    pub async fn acknowledge_alert(&self, alert_id: &str) -> OrchResult<()> {
        let mut alerts = self.active_alerts.write().await;
        let alert = alerts
            .get_mut(alert_id)
            .ok_or_else(|| OrchError::not_found(format!("no alert '{alert_id}'")))?;
        alert.acknowledged = true;
        Ok(())
    }

    pub async fn resolve_alert(&self, alert_id: &str) -> OrchResult<()> {
        let mut alerts = self.active_alerts.write().await;
        let alert = alerts
            .get_mut(alert_id)
            .ok_or_else(|| OrchError::not_found(format!("no alert '{alert_id}'")))?;
        alert.resolved = true;
        Ok(())
    }

    pub async fn active_alerts(&self) -> Vec<PerformanceAlert> {
        self.active_alerts.read().await.values().cloned().collect()
    }

    pub async fn alert_history(&self) -> Vec<PerformanceAlert> {
        self.alert_history.read().await.iter().cloned().collect()
    }

    pub async fn completed_tasks(&self) -> Vec<TaskRun> {
        self.completed_tasks.read().await.iter().cloned().collect()
    }

    pub async fn system_history(&self) -> Vec<SystemSample> {
        self.system_history.read().await.iter().cloned().collect()
    }

    /// Computed on demand and cached for `stats_cache_ttl_secs` so a burst
    /// of callers polling the same metric doesn't re-sort its whole series
    /// on every call.
    pub async fn stats(&self, metric_type: PerfMetricType) -> OrchResult<MetricStats> {
        if let Some((computed_at, cached)) = self.stats_cache.read().await.get(&metric_type) {
            if computed_at.elapsed() < Duration::from_secs(self.config.stats_cache_ttl_secs) {
                return Ok(cached.clone());
            }
        }

        let mut values: Vec<f64> = {
            let series = self.global_series.read().await;
            series
                .get(&metric_type)
                .map(|s| s.iter().map(|m| m.value).collect())
                .unwrap_or_default()
        };
        if values.is_empty() {
            return Err(OrchError::not_found(format!(
                "no samples recorded for {metric_type:?}"
            )));
        }
        values.sort_by(|a, b| a.partial_cmp(b).expect("metric values are never NaN"));

        let count = values.len();
        let min = values[0];
        let max = values[count - 1];
        let avg = values.iter().sum::<f64>() / count as f64;
        let p95_index = (((count as f64) * 0.95).ceil() as usize).saturating_sub(1).min(count - 1);
        let p95 = values[p95_index];

        let stats = MetricStats {
            metric_type,
            count,
            min,
            max,
            avg,
            p95,
        };
        self.stats_cache
            .write()
            .await
            .insert(metric_type, (Instant::now(), stats.clone()));
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> AgentId {
        AgentId::new()
    }

    #[tokio::test]
    async fn critical_breach_alerts_on_first_sample() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default());
        monitor
            .register_threshold(PerformanceThreshold::new(PerfMetricType::CpuUsage, 70.0, 90.0))
            .await;
        monitor
            .record_metric(PerfMetricType::CpuUsage, 95.0, None, None, HashMap::new())
            .await
            .unwrap();

        let alerts = monitor.active_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn warning_breach_needs_consecutive_samples() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default());
        monitor
            .register_threshold(PerformanceThreshold::new(PerfMetricType::CpuUsage, 70.0, 95.0))
            .await;

        for _ in 0..2 {
            monitor
                .record_metric(PerfMetricType::CpuUsage, 80.0, None, None, HashMap::new())
                .await
                .unwrap();
        }
        assert!(monitor.active_alerts().await.is_empty());

        monitor
            .record_metric(PerfMetricType::CpuUsage, 80.0, None, None, HashMap::new())
            .await
            .unwrap();
        assert_eq!(monitor.active_alerts().await.len(), 1);
    }

    #[tokio::test]
    async fn repeated_breaches_do_not_duplicate_active_alert() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default());
        monitor
            .register_threshold(PerformanceThreshold::new(PerfMetricType::ErrorRate, 1.0, 2.0))
            .await;
        for _ in 0..5 {
            monitor
                .record_metric(PerfMetricType::ErrorRate, 5.0, None, None, HashMap::new())
                .await
                .unwrap();
        }
        assert_eq!(monitor.active_alerts().await.len(), 1);
    }

    #[tokio::test]
    async fn task_lifecycle_records_duration_and_success_metric() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default());
        let agent_id = agent();
        monitor.start_task("t1", agent_id.clone(), "build").await.unwrap();
        let run = monitor.end_task("t1", TaskRunStatus::Completed).await.unwrap();
        assert!(run.duration_ms.unwrap() >= 0);

        let stats = monitor.stats(PerfMetricType::TaskSuccessRate).await.unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(monitor.completed_tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn ending_unknown_task_is_not_found() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default());
        let err = monitor.end_task("missing", TaskRunStatus::Completed).await.unwrap_err();
        assert_eq!(err.kind, orch_core::ErrorKind::NotFound);
    }
}
