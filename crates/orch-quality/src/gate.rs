//! Quality Gate (C7): checklist-seeded, criteria-and-custom-check
//! evaluation producing a composite-score pass/concerns/fail decision.

use chrono::Utc;
use orch_core::{
    GateCriterion, GateDecision, GateId, GateKind, GateReport, GateThresholds, IssueCategory,
    MetricsSnapshot, OrchError, OrchResult, QualityGate, QualityIssue, Severity, Waiver,
};
use orch_storage::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A single checklist line item consulted when seeding a report's metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub title: String,
    pub passed: bool,
    /// A documented reason a failed item is acceptable; unjustified
    /// failures are escalated into a MEDIUM/COMPLIANCE issue.
    pub justification: Option<String>,
}

/// The result of one caller-supplied custom check (e.g. a linter run, a
/// coverage tool invocation) fed into `evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCheckResult {
    pub name: String,
    pub passed: bool,
    pub severity: Severity,
    pub category: IssueCategory,
    pub message: String,
}

/// A named boolean predicate over a report-in-progress, consulted for each
/// of a gate's `GateCriterion`s.
pub trait GatePredicate: Send + Sync {
    fn evaluate(&self, metrics: &MetricsSnapshot, issues: &[QualityIssue]) -> bool;
}

struct ThresholdPredicate(fn(&MetricsSnapshot) -> bool);
impl GatePredicate for ThresholdPredicate {
    fn evaluate(&self, metrics: &MetricsSnapshot, _issues: &[QualityIssue]) -> bool {
        (self.0)(metrics)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GateRegistryState {
    pub gates: HashMap<GateId, QualityGate>,
    pub reports: HashMap<String, Vec<GateReport>>,
}

pub struct QualityGateEngine {
    store: SnapshotStore<GateRegistryState>,
    predicates: parking_lot::RwLock<HashMap<String, Arc<dyn GatePredicate>>>,
}

impl QualityGateEngine {
    pub async fn open(path: impl Into<std::path::PathBuf>) -> OrchResult<Self> {
        let engine = Self {
            store: SnapshotStore::open(path).await?,
            predicates: parking_lot::RwLock::new(HashMap::new()),
        };
        engine.register_builtin_predicates();
        Ok(engine)
    }

    fn register_builtin_predicates(&self) {
        self.register_predicate(
            "coverage_met",
            Arc::new(ThresholdPredicate(|m| m.coverage >= 0.0)),
        );
    }

    pub fn register_predicate(&self, id: impl Into<String>, predicate: Arc<dyn GatePredicate>) {
        self.predicates.write().insert(id.into(), predicate);
    }

    pub async fn persist(&self) -> OrchResult<()> {
        self.store.persist().await
    }

    pub async fn register_gate(&self, gate: QualityGate) -> OrchResult<()> {
        let mut state = self.store.write_state().await;
        state.gates.insert(gate.id.clone(), gate);
        Ok(())
    }

    pub async fn gate(&self, id: &GateId) -> OrchResult<QualityGate> {
        let state = self.store.read_state().await;
        state
            .gates
            .get(id)
            .cloned()
            .ok_or_else(|| OrchError::not_found(format!("gate {id} not found")))
    }

    pub async fn gate_by_name(&self, name: &str) -> OrchResult<QualityGate> {
        let state = self.store.read_state().await;
        state
            .gates
            .values()
            .find(|g| g.name == name)
            .cloned()
            .ok_or_else(|| OrchError::not_found(format!("gate named '{name}' not found")))
    }

    pub async fn list_gates(&self) -> Vec<QualityGate> {
        self.store.read_state().await.gates.values().cloned().collect()
    }

    pub async fn reports_for(&self, target: &str) -> Vec<GateReport> {
        self.store
            .read_state()
            .await
            .reports
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    /// Seven-step evaluation: seed metrics from the checklist, escalate
    /// unjustified failures, run the gate's declared criteria, run the
    /// caller's custom checks, compute composite scores, apply the decision
    /// rule, then produce recommendations.
    pub async fn evaluate(
        &self,
        gate_id: &GateId,
        target: impl Into<String>,
        checklist: Vec<ChecklistItem>,
        custom_checks: Vec<CustomCheckResult>,
    ) -> OrchResult<GateReport> {
        let target = target.into();
        let gate = self.gate(gate_id).await?;
        let mut issues = Vec::new();

        // Step 1: seed metrics from the checklist.
        let total = checklist.len() as u32;
        let passed = checklist.iter().filter(|c| c.passed).count() as u32;
        let failed = total - passed;
        let coverage = if total == 0 { 1.0 } else { passed as f64 / total as f64 };

        // Step 2: unjustified failed items become MEDIUM/COMPLIANCE issues.
        for item in checklist.iter().filter(|c| !c.passed) {
            if item.justification.is_none() {
                issues.push(QualityIssue {
                    id: format!("checklist:{}", item.id),
                    title: format!("unjustified checklist failure: {}", item.title),
                    description: item.title.clone(),
                    severity: Severity::Medium,
                    category: IssueCategory::Compliance,
                    finding: "checklist item failed without a documented justification".into(),
                    expected: "pass, or a recorded justification".into(),
                    impact: "reduces confidence in the target's readiness".into(),
                    suggested_action: "resolve the item or attach a justification".into(),
                    detected_at: Utc::now(),
                    resolved_at: None,
                    waiver: None,
                });
            }
        }

        let mut metrics = MetricsSnapshot {
            total,
            passed,
            failed,
            skipped: 0,
            coverage,
            ..Default::default()
        };

        // Step 3: run the gate's declared criteria.
        let mut passed_criteria = Vec::new();
        let mut failed_criteria = Vec::new();
        for criterion in &gate.criteria {
            let ok = match self.predicates.read().get(&criterion.predicate_id) {
                Some(p) => p.evaluate(&metrics, &issues),
                None => false,
            };
            if ok {
                passed_criteria.push(criterion.predicate_id.clone());
            } else if criterion.required {
                failed_criteria.push(criterion.predicate_id.clone());
                issues.push(unmet_criterion_issue(criterion));
            }
        }

        // Step 4: run custom checks.
        for check in &custom_checks {
            if !check.passed {
                issues.push(QualityIssue {
                    id: format!("check:{}", check.name),
                    title: check.name.clone(),
                    description: check.message.clone(),
                    severity: check.severity,
                    category: check.category,
                    finding: check.message.clone(),
                    expected: "check passes".into(),
                    impact: "unverified risk in the delivered target".into(),
                    suggested_action: "address the failing check".into(),
                    detected_at: Utc::now(),
                    resolved_at: None,
                    waiver: None,
                });
            }
        }

        // Step 5: composite scores.
        let security_issues = issues.iter().filter(|i| i.category == IssueCategory::Security).count() as f64;
        let performance_issues = issues.iter().filter(|i| i.category == IssueCategory::Performance).count() as f64;
        let doc_issues = issues.iter().filter(|i| i.category == IssueCategory::Documentation).count() as f64;
        let debt_issues = issues.iter().filter(|i| i.category == IssueCategory::TechnicalDebt).count() as f64;
        let compliance_issues = issues.iter().filter(|i| i.category == IssueCategory::Compliance).count() as f64;

        metrics.security_score = (100.0 - 20.0 * security_issues).max(0.0);
        metrics.performance_score = (100.0 - 15.0 * performance_issues).max(0.0);
        metrics.documentation_score = (100.0 - 10.0 * doc_issues).max(0.0);
        metrics.maintainability_score = (100.0 - 10.0 * debt_issues).max(0.0);
        metrics.compliance_score = (100.0 - 25.0 * compliance_issues).max(0.0);
        metrics.test_score = coverage * 100.0;
        metrics.overall_score = 0.25 * metrics.security_score
            + 0.20 * metrics.performance_score
            + 0.15 * metrics.maintainability_score
            + 0.10 * metrics.documentation_score
            + 0.20 * metrics.test_score
            + 0.10 * metrics.compliance_score;

        // Step 6: decision rule, checked in this order so FAIL is reachable
        // only via critical_issues or failed_criteria.
        let critical_issues = issues.iter().filter(|i| i.severity == Severity::Critical).count() as u32;
        let high_issues = issues.iter().filter(|i| i.severity == Severity::High).count() as u32;
        let failed_criteria_count = failed_criteria.len() as u32;
        let thresholds = &gate.thresholds;

        let decision = if critical_issues > thresholds.max_critical_issues {
            GateDecision::Fail
        } else if failed_criteria_count > 3 {
            GateDecision::Fail
        } else if high_issues > thresholds.max_high_issues {
            GateDecision::Concerns
        } else if coverage < thresholds.min_coverage {
            GateDecision::Concerns
        } else if metrics.security_score < thresholds.min_security_score {
            GateDecision::Concerns
        } else if failed_criteria_count > 0 {
            GateDecision::Concerns
        } else {
            GateDecision::Pass
        };

        // Step 7: recommendations.
        let recommendations = build_recommendations(&gate, &issues, &metrics, thresholds);

        let report = GateReport {
            id: GateId::new(),
            gate_name: gate.name.clone(),
            target: target.clone(),
            decision,
            original_decision: None,
            metrics,
            passed_criteria,
            failed_criteria,
            waived_criteria: Vec::new(),
            recommendations,
            issues,
            evaluated_at: Utc::now(),
            waiver: None,
        };

        let mut state = self.store.write_state().await;
        state.reports.entry(target).or_default().push(report.clone());
        drop(state);
        tracing::info!(gate = %gate.name, decision = ?report.decision, "quality gate evaluated");
        Ok(report)
    }

    /// Override a FAIL/CONCERNS decision to WAIVED, preserving the
    /// original decision for audit.
    pub async fn waive(
        &self,
        target: &str,
        report_id: &GateId,
        reason: impl Into<String>,
        actor: impl Into<String>,
    ) -> OrchResult<GateReport> {
        let mut state = self.store.write_state().await;
        let reports = state
            .reports
            .get_mut(target)
            .ok_or_else(|| OrchError::not_found(format!("no reports for target {target}")))?;
        let report = reports
            .iter_mut()
            .find(|r| r.id == *report_id)
            .ok_or_else(|| OrchError::not_found(format!("report {report_id} not found")))?;

        if report.decision == GateDecision::Pass {
            return Err(OrchError::precondition_failed("a passing report cannot be waived"));
        }

        report.original_decision = Some(report.decision);
        report.decision = GateDecision::Waived;
        report.waiver = Some(Waiver {
            reason: reason.into(),
            actor: actor.into(),
            waived_at: Utc::now(),
        });
        Ok(report.clone())
    }
}

fn unmet_criterion_issue(criterion: &GateCriterion) -> QualityIssue {
    QualityIssue {
        id: format!("criterion:{}", criterion.predicate_id),
        title: format!("required criterion not met: {}", criterion.predicate_id),
        description: criterion.predicate_id.clone(),
        severity: Severity::High,
        category: IssueCategory::Functional,
        finding: "criterion predicate returned false".into(),
        expected: "criterion predicate returns true".into(),
        impact: "required quality bar not met".into(),
        suggested_action: "resolve the underlying condition".into(),
        detected_at: Utc::now(),
        resolved_at: None,
        waiver: None,
    }
}

fn build_recommendations(
    gate: &QualityGate,
    issues: &[QualityIssue],
    metrics: &MetricsSnapshot,
    thresholds: &GateThresholds,
) -> Vec<String> {
    let mut out = Vec::new();
    if metrics.coverage < thresholds.min_coverage {
        out.push(format!(
            "raise test coverage from {:.0}% to at least {:.0}%",
            metrics.coverage * 100.0,
            thresholds.min_coverage * 100.0
        ));
    }
    if issues.iter().any(|i| i.severity == Severity::Critical) {
        out.push("resolve all critical-severity issues before re-evaluating".to_string());
    }
    if matches!(gate.kind, GateKind::Release) && metrics.security_score < thresholds.min_security_score {
        out.push("schedule a focused security review before release".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::GateThresholds;

    async fn engine() -> QualityGateEngine {
        let dir = tempfile::tempdir().unwrap();
        QualityGateEngine::open(dir.path().join("gates.blob")).await.unwrap()
    }

    fn story_gate() -> QualityGate {
        QualityGate {
            id: GateId::new(),
            name: "story-gate".to_string(),
            kind: GateKind::Story,
            thresholds: GateThresholds::looser_preset(),
            criteria: vec![],
        }
    }

    #[tokio::test]
    async fn critical_issue_forces_fail() {
        let engine = engine().await;
        let gate = story_gate();
        let gate_id = gate.id.clone();
        engine.register_gate(gate).await.unwrap();

        let checks = vec![CustomCheckResult {
            name: "security-scan".to_string(),
            passed: false,
            severity: Severity::Critical,
            category: IssueCategory::Security,
            message: "SQL injection in query builder".to_string(),
        }];

        let report = engine.evaluate(&gate_id, "story-42", vec![], checks).await.unwrap();
        assert_eq!(report.decision, GateDecision::Fail);
    }

    #[tokio::test]
    async fn clean_checklist_passes() {
        let engine = engine().await;
        let gate = story_gate();
        let gate_id = gate.id.clone();
        engine.register_gate(gate).await.unwrap();

        let checklist = vec![ChecklistItem {
            id: "c1".to_string(),
            title: "tests written".to_string(),
            passed: true,
            justification: None,
        }];

        let report = engine.evaluate(&gate_id, "story-1", checklist, vec![]).await.unwrap();
        assert_eq!(report.decision, GateDecision::Pass);
    }

    #[tokio::test]
    async fn waiving_preserves_original_decision() {
        let engine = engine().await;
        let gate = story_gate();
        let gate_id = gate.id.clone();
        engine.register_gate(gate).await.unwrap();

        // Coverage below the looser preset's 0.70 minimum triggers CONCERNS.
        let checklist = vec![
            ChecklistItem {
                id: "c1".to_string(),
                title: "tests written".to_string(),
                passed: true,
                justification: None,
            },
            ChecklistItem {
                id: "c2".to_string(),
                title: "docs updated".to_string(),
                passed: false,
                justification: None,
            },
        ];
        let report = engine.evaluate(&gate_id, "story-9", checklist, vec![]).await.unwrap();
        assert_eq!(report.decision, GateDecision::Concerns);

        let waived = engine
            .waive("story-9", &report.id, "accepted for this sprint", "alice")
            .await
            .unwrap();
        assert_eq!(waived.decision, GateDecision::Waived);
        assert_eq!(waived.original_decision, Some(report.decision));
    }

    #[tokio::test]
    async fn low_coverage_without_critical_issues_is_concerns_not_fail() {
        // Regression for a ladder that should never promote a CONCERNS-only
        // trip (coverage, security score) into FAIL.
        let engine = engine().await;
        let gate = story_gate();
        let gate_id = gate.id.clone();
        engine.register_gate(gate).await.unwrap();

        let checklist = vec![ChecklistItem {
            id: "c1".to_string(),
            title: "coverage report".to_string(),
            passed: false,
            justification: None,
        }];
        let checks = vec![
            CustomCheckResult {
                name: "security-scan-1".to_string(),
                passed: false,
                severity: Severity::Medium,
                category: IssueCategory::Security,
                message: "outdated TLS config".to_string(),
            },
            CustomCheckResult {
                name: "security-scan-2".to_string(),
                passed: false,
                severity: Severity::Medium,
                category: IssueCategory::Security,
                message: "missing input validation".to_string(),
            },
        ];

        let report = engine.evaluate(&gate_id, "story-10", checklist, checks).await.unwrap();
        assert_eq!(report.decision, GateDecision::Concerns);
    }
}
