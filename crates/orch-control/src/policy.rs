//! Class-based `PolicyGate`, modeled on a platform-trust policy: actions
//! are classified, then the classification is looked up in block/approve/
//! allow lists.

use async_trait::async_trait;
use orch_core::{OrchResult, PendingDecision, PolicyGate, PolicyVerdict};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    Read,
    Write,
    Delete,
    Dangerous,
}

/// Classifies a `PendingDecision.action` string into an `ActionClass`.
/// Unrecognized actions default to `Dangerous` — fail secure rather than
/// silently allow an action nobody classified.
pub fn classify(action: &str) -> ActionClass {
    match action {
        "form_team" | "create_document" | "create_handoff" | "start_workflow" => ActionClass::Write,
        "dissolve_team" | "archive_document" | "cancel_workflow" => ActionClass::Delete,
        "status" | "search" | "list_teams" | "get_team" | "fetch_document" => ActionClass::Read,
        _ => ActionClass::Dangerous,
    }
}

/// A gate with three class buckets: block outright, require human
/// approval (denied synchronously, since nothing here can route to a
/// human and wait), or allow.
pub struct RulePolicyGate {
    blocked: HashSet<ActionClass>,
    approval_required: HashSet<ActionClass>,
    allowed: HashSet<ActionClass>,
}

impl RulePolicyGate {
    pub fn new(blocked: Vec<ActionClass>, approval_required: Vec<ActionClass>, allowed: Vec<ActionClass>) -> Self {
        Self {
            blocked: blocked.into_iter().collect(),
            approval_required: approval_required.into_iter().collect(),
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn permissive() -> Self {
        Self::new(vec![], vec![], vec![ActionClass::Read, ActionClass::Write, ActionClass::Delete, ActionClass::Dangerous])
    }

    pub fn require_approval_for_writes() -> Self {
        Self::new(
            vec![ActionClass::Dangerous],
            vec![ActionClass::Write, ActionClass::Delete],
            vec![ActionClass::Read],
        )
    }

    pub fn read_only() -> Self {
        Self::new(
            vec![ActionClass::Write, ActionClass::Delete, ActionClass::Dangerous],
            vec![],
            vec![ActionClass::Read],
        )
    }
}

#[async_trait]
impl PolicyGate for RulePolicyGate {
    async fn validate(&self, decision: &PendingDecision) -> OrchResult<PolicyVerdict> {
        let class = classify(&decision.action);

        if self.blocked.contains(&class) {
            return Ok(PolicyVerdict::deny(format!(
                "{:?} actions are blocked ('{}')",
                class, decision.action
            )));
        }
        if self.approval_required.contains(&class) {
            return Ok(PolicyVerdict::deny(format!(
                "{:?} actions require human approval ('{}')",
                class, decision.action
            )));
        }
        if self.allowed.contains(&class) {
            return Ok(PolicyVerdict::allow());
        }
        Ok(PolicyVerdict::deny(format!(
            "{:?} actions are not explicitly allowed ('{}')",
            class, decision.action
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(action: &str) -> PendingDecision {
        PendingDecision {
            action: action.to_string(),
            actor: "tester".to_string(),
            context: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn read_only_blocks_team_formation() {
        let gate = RulePolicyGate::read_only();
        let verdict = gate.validate(&decision("form_team")).await.unwrap();
        assert!(!verdict.approved);
    }

    #[tokio::test]
    async fn permissive_allows_everything_classified() {
        let gate = RulePolicyGate::permissive();
        assert!(gate.validate(&decision("form_team")).await.unwrap().approved);
        assert!(gate.validate(&decision("dissolve_team")).await.unwrap().approved);
    }
}
