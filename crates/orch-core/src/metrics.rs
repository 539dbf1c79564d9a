//! Agile metrics data model (C8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Velocity,
    CycleTime,
    LeadTime,
    Throughput,
    DefectRate,
    ReworkRate,
    CommitmentReliability,
    TaskPerformance,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric_type: MetricType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub team_id: Option<String>,
    pub sprint_id: Option<String>,
    pub agent_id: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintVelocitySample {
    pub sprint_id: String,
    pub team_id: String,
    pub committed_points: f64,
    pub completed_points: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPerformanceSample {
    pub story_id: String,
    pub team_id: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub points: f64,
    pub defects: u32,
    pub required_rework: bool,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
    VeryLow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityPrediction {
    pub predicted_velocity: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence: Confidence,
    pub trend: TrendDirection,
    pub recommendation: String,
}
