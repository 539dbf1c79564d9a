//! Quality gate types (C7).

use crate::ids::GateId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Story,
    Sprint,
    Release,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Functional,
    Performance,
    Security,
    Usability,
    Documentation,
    Testing,
    Architecture,
    Compliance,
    TechnicalDebt,
    Accessibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waiver {
    pub reason: String,
    pub actor: String,
    pub waived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub category: IssueCategory,
    pub finding: String,
    pub expected: String,
    pub impact: String,
    pub suggested_action: String,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub waiver: Option<Waiver>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateThresholds {
    pub min_coverage: f64,
    pub min_test_coverage: f64,
    pub max_critical_issues: u32,
    pub max_high_issues: u32,
    pub min_security_score: f64,
    pub min_performance_score: f64,
    pub min_overall_score: f64,
}

impl GateThresholds {
    /// The source's "default" preset.
    pub fn default_preset() -> Self {
        Self {
            min_coverage: 0.75,
            min_test_coverage: 0.75,
            max_critical_issues: 0,
            max_high_issues: 3,
            min_security_score: 75.0,
            min_performance_score: 70.0,
            min_overall_score: 75.0,
        }
    }

    /// Looser gating appropriate for story-level checks.
    pub fn looser_preset() -> Self {
        Self {
            min_coverage: 0.70,
            min_test_coverage: 0.70,
            max_critical_issues: 0,
            max_high_issues: 5,
            min_security_score: 80.0,
            min_performance_score: 75.0,
            min_overall_score: 80.0,
        }
    }

    /// Stricter gating appropriate for release-level checks.
    pub fn stricter_preset() -> Self {
        Self {
            min_coverage: 0.85,
            min_test_coverage: 0.85,
            max_critical_issues: 0,
            max_high_issues: 1,
            min_security_score: 90.0,
            min_performance_score: 85.0,
            min_overall_score: 85.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateCriterion {
    pub predicate_id: String,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGate {
    pub id: GateId,
    pub name: String,
    pub kind: GateKind,
    pub thresholds: GateThresholds,
    pub criteria: Vec<GateCriterion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Pass,
    Concerns,
    Fail,
    Waived,
    Pending,
    Blocked,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub coverage: f64,
    pub security_score: f64,
    pub performance_score: f64,
    pub maintainability_score: f64,
    pub documentation_score: f64,
    pub test_score: f64,
    pub compliance_score: f64,
    pub overall_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    pub id: GateId,
    pub gate_name: String,
    pub target: String,
    pub decision: GateDecision,
    pub original_decision: Option<GateDecision>,
    pub metrics: MetricsSnapshot,
    pub passed_criteria: Vec<String>,
    pub failed_criteria: Vec<String>,
    pub waived_criteria: Vec<String>,
    pub recommendations: Vec<String>,
    pub issues: Vec<QualityIssue>,
    pub evaluated_at: DateTime<Utc>,
    pub waiver: Option<Waiver>,
}
