//! Agile Metrics (C8): velocity, cycle/lead time, throughput, defect and
//! rework rates, and a velocity forecast with a confidence score.

use chrono::{DateTime, Utc};
use orch_core::{Confidence, MetricSample, SprintVelocitySample, TaskPerformanceSample, TrendDirection, VelocityPrediction};
use orch_storage::SnapshotStore;
use orch_core::OrchResult;
use serde::{Deserialize, Serialize};

/// Exponential smoothing factor applied to the sprint-velocity history.
const EWMA_ALPHA: f64 = 0.3;
/// Multiplier covering current-vs-historical team size, applied to the
/// smoothed velocity before the trend adjustment.
const DEFAULT_CAPACITY_FACTOR: f64 = 1.0;
/// Rolling window of past predict/actual pairs kept per team for the
/// accuracy component of the confidence score.
const PREDICTION_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AgileState {
    pub samples: Vec<MetricSample>,
    pub sprints: Vec<SprintVelocitySample>,
    pub tasks: Vec<TaskPerformanceSample>,
    /// Team id -> most recent `predict_velocity` call awaiting the next
    /// recorded sprint to score against.
    pub pending_predictions: std::collections::HashMap<String, f64>,
    /// Team id -> rolling relative errors of past predictions, oldest
    /// first, bounded to `PREDICTION_HISTORY_LIMIT`.
    pub prediction_errors: std::collections::HashMap<String, Vec<f64>>,
}

pub struct AgileMetricsTracker {
    store: SnapshotStore<AgileState>,
}

impl AgileMetricsTracker {
    pub async fn open(path: impl Into<std::path::PathBuf>) -> OrchResult<Self> {
        Ok(Self {
            store: SnapshotStore::open(path).await?,
        })
    }

    pub async fn persist(&self) -> OrchResult<()> {
        self.store.persist().await
    }

    pub async fn record_sample(&self, sample: MetricSample) -> OrchResult<()> {
        self.store.write_state().await.samples.push(sample);
        Ok(())
    }

    /// Scores any pending prediction for this team against the actual
    /// outcome before recording it, feeding the rolling accuracy tracker.
    pub async fn record_sprint(&self, sample: SprintVelocitySample) -> OrchResult<()> {
        let mut state = self.store.write_state().await;
        if let Some(predicted) = state.pending_predictions.remove(&sample.team_id) {
            let actual = sample.completed_points;
            let error = if actual > 0.0 {
                ((predicted - actual).abs() / actual).min(1.0)
            } else {
                0.0
            };
            let errors = state.prediction_errors.entry(sample.team_id.clone()).or_default();
            errors.push(error);
            if errors.len() > PREDICTION_HISTORY_LIMIT {
                errors.remove(0);
            }
        }
        state.sprints.push(sample);
        Ok(())
    }

    pub async fn record_task(&self, sample: TaskPerformanceSample) -> OrchResult<()> {
        self.store.write_state().await.tasks.push(sample);
        Ok(())
    }

    async fn team_sprints(&self, team_id: &str) -> Vec<SprintVelocitySample> {
        self.store
            .read_state()
            .await
            .sprints
            .iter()
            .filter(|s| s.team_id == team_id)
            .cloned()
            .collect()
    }

    async fn team_tasks(&self, team_id: &str) -> Vec<TaskPerformanceSample> {
        self.store
            .read_state()
            .await
            .tasks
            .iter()
            .filter(|t| t.team_id == team_id)
            .cloned()
            .collect()
    }

    /// Average completed story points per sprint.
    pub async fn velocity(&self, team_id: &str) -> f64 {
        let sprints = self.team_sprints(team_id).await;
        average(sprints.iter().map(|s| s.completed_points))
    }

    /// Average wall-clock time from `start` to `end` for completed tasks.
    pub async fn cycle_time_hours(&self, team_id: &str) -> f64 {
        let tasks = self.team_tasks(team_id).await;
        average(tasks.iter().filter_map(|t| {
            t.end.map(|end| (end - t.start).num_seconds() as f64 / 3600.0)
        }))
    }

    /// Average wall-clock time from `created` to `end`. Always >= cycle
    /// time, since a task is created no later than it starts.
    pub async fn lead_time_hours(&self, team_id: &str) -> f64 {
        let tasks = self.team_tasks(team_id).await;
        average(tasks.iter().filter_map(|t| {
            t.end.map(|end| (end - t.created).num_seconds() as f64 / 3600.0)
        }))
    }

    /// Completed task count within `[since, now]`.
    pub async fn throughput(&self, team_id: &str, since: DateTime<Utc>) -> usize {
        self.team_tasks(team_id)
            .await
            .iter()
            .filter(|t| t.end.map(|e| e >= since).unwrap_or(false))
            .count()
    }

    /// Two-point ideal/actual series: `(sprint_start, committed)` and
    /// `(sprint_end, committed - completed)`.
    pub async fn burndown(&self, sprint_id: &str) -> Option<Vec<(DateTime<Utc>, f64)>> {
        let state = self.store.read_state().await;
        let sprint = state.sprints.iter().find(|s| s.sprint_id == sprint_id)?;
        Some(vec![
            (sprint.start, sprint.committed_points),
            (sprint.end, sprint.committed_points - sprint.completed_points),
        ])
    }

    /// Two-point cumulative-completed series: `(start, 0)`, `(end, completed)`.
    pub async fn burnup(&self, sprint_id: &str) -> Option<Vec<(DateTime<Utc>, f64)>> {
        let state = self.store.read_state().await;
        let sprint = state.sprints.iter().find(|s| s.sprint_id == sprint_id)?;
        Some(vec![(sprint.start, 0.0), (sprint.end, sprint.completed_points)])
    }

    /// Defects per completed story point.
    pub async fn defect_rate(&self, team_id: &str) -> f64 {
        let tasks = self.team_tasks(team_id).await;
        let points: f64 = tasks.iter().map(|t| t.points).sum();
        if points <= 0.0 {
            return 0.0;
        }
        tasks.iter().map(|t| t.defects as f64).sum::<f64>() / points
    }

    /// Fraction of tasks that required rework.
    pub async fn rework_rate(&self, team_id: &str) -> f64 {
        let tasks = self.team_tasks(team_id).await;
        if tasks.is_empty() {
            return 0.0;
        }
        tasks.iter().filter(|t| t.required_rework).count() as f64 / tasks.len() as f64
    }

    /// Average `completed_points / committed_points` across sprints.
    pub async fn commitment_reliability(&self, team_id: &str) -> f64 {
        let sprints = self.team_sprints(team_id).await;
        average(sprints.iter().filter(|s| s.committed_points > 0.0).map(|s| {
            s.completed_points / s.committed_points
        }))
    }

    /// Linear-regression trend over a velocity history. Fewer than three
    /// points cannot establish a slope.
    pub async fn velocity_trend(&self, team_id: &str) -> TrendDirection {
        let sprints = self.team_sprints(team_id).await;
        if sprints.len() < 3 {
            return TrendDirection::InsufficientData;
        }
        let values: Vec<f64> = sprints.iter().map(|s| s.completed_points).collect();
        let slope = linear_regression_slope(&values);
        let epsilon = 0.05 * average(values.iter().copied()).max(1.0);
        if slope > epsilon {
            TrendDirection::Improving
        } else if slope < -epsilon {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        }
    }

    /// Mean relative error of past predictions scored against the sprint
    /// that followed them, folded into `[0, 1]` (1.0 = perfect track
    /// record). Teams with no scored predictions yet get a neutral prior.
    async fn accuracy_score(&self, team_id: &str) -> f64 {
        let state = self.store.read_state().await;
        match state.prediction_errors.get(team_id) {
            Some(errors) if !errors.is_empty() => {
                let mean_error = errors.iter().sum::<f64>() / errors.len() as f64;
                (1.0 - mean_error).clamp(0.0, 1.0)
            }
            _ => 0.7,
        }
    }

    /// Weighted-moving-average velocity forecast, adjusted additively by
    /// trend and then multiplicatively by capacity, with a 95% confidence
    /// interval and a tiered confidence score.
    pub async fn predict_velocity(
        &self,
        team_id: &str,
        future_sprint_count: u32,
        capacity_factor: Option<f64>,
    ) -> VelocityPrediction {
        let sprints = self.team_sprints(team_id).await;
        let values: Vec<f64> = sprints.iter().map(|s| s.completed_points).collect();
        let trend = self.velocity_trend(team_id).await;

        if values.is_empty() {
            return VelocityPrediction {
                predicted_velocity: 0.0,
                lower_bound: 0.0,
                upper_bound: 0.0,
                confidence: Confidence::VeryLow,
                trend: TrendDirection::InsufficientData,
                recommendation: "record at least one completed sprint before forecasting".to_string(),
            };
        }

        let weighted = weighted_moving_average(&values, EWMA_ALPHA);
        let slope = linear_regression_slope(&values);
        let capacity = capacity_factor.unwrap_or(DEFAULT_CAPACITY_FACTOR);
        let predicted = (weighted + slope * future_sprint_count as f64) * capacity;

        let std_dev = standard_deviation(&values);
        let n = values.len() as f64;
        let margin = 1.96 * std_dev / n.sqrt();

        let data_points_component = (values.len() as f64 / 8.0).min(1.0) * 0.3;
        let mean = average(values.iter().copied());
        let coefficient_of_variation = if mean > 0.0 { std_dev / mean } else { 1.0 };
        let stability_component = (1.0 - coefficient_of_variation).clamp(0.0, 1.0) * 0.5;
        let accuracy_component = self.accuracy_score(team_id).await * 0.2;
        let confidence_score = (data_points_component + stability_component + accuracy_component) * 100.0;

        let confidence = if confidence_score > 80.0 {
            Confidence::High
        } else if confidence_score > 60.0 {
            Confidence::Medium
        } else if confidence_score > 40.0 {
            Confidence::Low
        } else {
            Confidence::VeryLow
        };

        let recommendation = match trend {
            TrendDirection::Declining => "velocity is trending down; investigate blockers before committing more points".to_string(),
            TrendDirection::InsufficientData => "forecast is based on fewer than three sprints; treat it as provisional".to_string(),
            _ => format!("plan for roughly {predicted:.1} points next sprint"),
        };

        self.store
            .write_state()
            .await
            .pending_predictions
            .insert(team_id.to_string(), predicted);

        VelocityPrediction {
            predicted_velocity: predicted,
            lower_bound: (predicted - margin).max(0.0),
            upper_bound: predicted + margin,
            confidence,
            trend,
            recommendation,
        }
    }
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn standard_deviation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = average(values.iter().copied());
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Weighted moving average with exponential weights `w_i = (1-alpha)^(n-i-1)`,
/// most recent sample weighted highest, normalized over the full history.
fn weighted_moving_average(values: &[f64], alpha: f64) -> f64 {
    let n = values.len();
    let mut weight_sum = 0.0;
    let mut weighted_sum = 0.0;
    for (i, value) in values.iter().enumerate() {
        let weight = (1.0 - alpha).powi((n - i - 1) as i32);
        weight_sum += weight;
        weighted_sum += weight * value;
    }
    weighted_sum / weight_sum
}

/// Ordinary least squares slope against index 0..n.
fn linear_regression_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let xs: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    let x_mean = average(xs.iter().copied());
    let y_mean = average(values.iter().copied());

    let numerator: f64 = xs.iter().zip(values).map(|(x, y)| (x - x_mean) * (y - y_mean)).sum();
    let denominator: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    if denominator == 0.0 || n == 0.0 {
        return 0.0;
    }
    numerator / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn tracker() -> AgileMetricsTracker {
        let dir = tempfile::tempdir().unwrap();
        AgileMetricsTracker::open(dir.path().join("agile.blob")).await.unwrap()
    }

    fn sprint(team: &str, id: &str, committed: f64, completed: f64, start: DateTime<Utc>) -> SprintVelocitySample {
        SprintVelocitySample {
            sprint_id: id.to_string(),
            team_id: team.to_string(),
            committed_points: committed,
            completed_points: completed,
            start,
            end: start + Duration::days(14),
        }
    }

    #[tokio::test]
    async fn fewer_than_three_sprints_is_insufficient_data() {
        let tracker = tracker().await;
        let now = Utc::now();
        tracker.record_sprint(sprint("team-a", "s1", 20.0, 18.0, now)).await.unwrap();
        tracker.record_sprint(sprint("team-a", "s2", 20.0, 19.0, now)).await.unwrap();

        assert_eq!(tracker.velocity_trend("team-a").await, TrendDirection::InsufficientData);
    }

    #[tokio::test]
    async fn improving_trend_detected_over_rising_velocity() {
        let tracker = tracker().await;
        let now = Utc::now();
        for (i, completed) in [10.0, 14.0, 18.0, 22.0].into_iter().enumerate() {
            tracker
                .record_sprint(sprint("team-b", &format!("s{i}"), 20.0, completed, now))
                .await
                .unwrap();
        }

        assert_eq!(tracker.velocity_trend("team-b").await, TrendDirection::Improving);
        let prediction = tracker.predict_velocity("team-b", 1, None).await;
        assert!(prediction.predicted_velocity > 0.0);
    }

    #[tokio::test]
    async fn rising_velocity_predicts_above_last_observed_two_sprints_out() {
        let tracker = tracker().await;
        let now = Utc::now();
        for (i, completed) in [40.0, 42.0, 45.0, 48.0, 50.0].into_iter().enumerate() {
            tracker
                .record_sprint(sprint("team-d", &format!("s{i}"), 45.0, completed, now))
                .await
                .unwrap();
        }

        assert_eq!(tracker.velocity_trend("team-d").await, TrendDirection::Improving);

        let prediction = tracker.predict_velocity("team-d", 2, None).await;
        assert!(prediction.predicted_velocity > 50.0);
        assert!(prediction.upper_bound > prediction.lower_bound);
    }

    #[tokio::test]
    async fn scored_predictions_raise_the_accuracy_component() {
        let tracker = tracker().await;
        let now = Utc::now();
        for (i, completed) in [20.0, 20.0, 20.0].into_iter().enumerate() {
            tracker
                .record_sprint(sprint("team-e", &format!("s{i}"), 20.0, completed, now))
                .await
                .unwrap();
        }

        assert_eq!(tracker.accuracy_score("team-e").await, 0.7);

        let prediction = tracker.predict_velocity("team-e", 1, None).await;
        tracker
            .record_sprint(sprint("team-e", "s3", 20.0, prediction.predicted_velocity, now))
            .await
            .unwrap();

        assert!(tracker.accuracy_score("team-e").await > 0.9);
    }

    #[tokio::test]
    async fn lead_time_is_at_least_cycle_time() {
        let tracker = tracker().await;
        let created = Utc::now();
        let start = created + Duration::hours(2);
        let end = start + Duration::hours(5);
        tracker
            .record_task(TaskPerformanceSample {
                story_id: "S-1".to_string(),
                team_id: "team-c".to_string(),
                start,
                end: Some(end),
                created,
                points: 3.0,
                defects: 0,
                required_rework: false,
                status: "done".to_string(),
            })
            .await
            .unwrap();

        let cycle = tracker.cycle_time_hours("team-c").await;
        let lead = tracker.lead_time_hours("team-c").await;
        assert!(lead >= cycle);
    }
}
