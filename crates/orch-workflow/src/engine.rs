//! Workflow instance execution: type-resolved input matching, parallel
//! execution of independent steps, and quality-gate-gated progression.

use chrono::Utc;
use orch_core::{
    AgentId, DocumentId, DocumentType, ExpectedAction, GateId, OrchError, OrchResult, Priority,
    StepStatus, TeamId, WorkflowDefinition, WorkflowId, WorkflowInstance, WorkflowInstanceId,
    WorkflowStatus, WorkflowStep,
};
use orch_quality::QualityGateEngine;
use orch_registry::{DocumentRegistry, HandoffProtocol};
use orch_storage::SnapshotStore;
use orch_teams::TeamOrchestrator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EngineState {
    pub definitions: HashMap<WorkflowId, WorkflowDefinition>,
    pub instances: HashMap<WorkflowInstanceId, WorkflowInstance>,
}

pub struct WorkflowEngine {
    store: SnapshotStore<EngineState>,
    registry: Arc<DocumentRegistry>,
    handoffs: Arc<HandoffProtocol>,
    gates: Arc<QualityGateEngine>,
    teams: Arc<TeamOrchestrator>,
}

impl WorkflowEngine {
    pub async fn open(
        path: impl Into<std::path::PathBuf>,
        registry: Arc<DocumentRegistry>,
        handoffs: Arc<HandoffProtocol>,
        gates: Arc<QualityGateEngine>,
        teams: Arc<TeamOrchestrator>,
    ) -> OrchResult<Self> {
        Ok(Self {
            store: SnapshotStore::open(path).await?,
            registry,
            handoffs,
            gates,
            teams,
        })
    }

    pub async fn persist(&self) -> OrchResult<()> {
        self.store.persist().await
    }

    pub async fn register_workflow(&self, def: WorkflowDefinition) -> OrchResult<()> {
        let mut state = self.store.write_state().await;
        state.definitions.insert(def.id.clone(), def);
        Ok(())
    }

    pub async fn status(&self, instance_id: &WorkflowInstanceId) -> OrchResult<WorkflowInstance> {
        self.store
            .read_state()
            .await
            .instances
            .get(instance_id)
            .cloned()
            .ok_or_else(|| OrchError::not_found(format!("workflow instance {instance_id} not found")))
    }

    pub async fn start_workflow(
        &self,
        workflow_id: &WorkflowId,
        team_id: TeamId,
        initial_documents: HashMap<DocumentType, DocumentId>,
    ) -> OrchResult<WorkflowInstance> {
        let def = {
            let state = self.store.read_state().await;
            state
                .definitions
                .get(workflow_id)
                .cloned()
                .ok_or_else(|| OrchError::not_found(format!("workflow {workflow_id} not found")))?
        };

        let mut instance = WorkflowInstance::new(workflow_id.clone(), team_id, &def);
        instance.status = WorkflowStatus::Running;
        for (doc_type, doc_id) in initial_documents {
            instance
                .produced_documents
                .insert(external_key(doc_type), doc_id);
        }

        {
            let mut state = self.store.write_state().await;
            state.instances.insert(instance.id.clone(), instance.clone());
        }

        tracing::info!(instance_id = %instance.id, workflow_id = %workflow_id, "workflow started");
        self.advance(&instance.id).await
    }

    /// Execute every step whose inputs are currently satisfied, in
    /// parallel, then recurse until a pass makes no further progress.
    pub async fn advance(&self, instance_id: &WorkflowInstanceId) -> OrchResult<WorkflowInstance> {
        loop {
            let (def, instance) = {
                let state = self.store.read_state().await;
                let instance = state
                    .instances
                    .get(instance_id)
                    .cloned()
                    .ok_or_else(|| OrchError::not_found(format!("workflow instance {instance_id} not found")))?;
                let def = state.definitions.get(&instance.workflow_id).cloned().unwrap();
                (def, instance)
            };

            if instance.status != WorkflowStatus::Running {
                return Ok(instance);
            }

            let ready: Vec<WorkflowStep> = def
                .steps
                .iter()
                .filter(|s| instance.step_status.get(&s.name) == Some(&StepStatus::Pending))
                .filter(|s| step_inputs_satisfied(s, &def, &instance))
                .cloned()
                .collect();

            if ready.is_empty() {
                let finished = instance.step_status.values().all(|s| {
                    matches!(s, StepStatus::Completed | StepStatus::Skipped | StepStatus::Failed)
                });
                if finished {
                    self.finalize(instance_id).await?;
                }
                return self.status(instance_id).await;
            }

            let results: Vec<OrchResult<StepOutcome>> = futures::future::join_all(
                ready.iter().map(|step| self.execute_step(instance_id, &def, step)),
            )
            .await;

            for (step, result) in ready.iter().zip(results) {
                self.apply_outcome(instance_id, step, result).await?;
            }

            let instance = self.status(instance_id).await?;
            if instance.status != WorkflowStatus::Running {
                return Ok(instance);
            }
        }
    }

    async fn execute_step(
        &self,
        instance_id: &WorkflowInstanceId,
        def: &WorkflowDefinition,
        step: &WorkflowStep,
    ) -> OrchResult<StepOutcome> {
        let instance = self.status(instance_id).await?;
        let team = self.teams.get_team(&instance.team_id).await?;
        let assignee = role_matched_member(&team, &step.role)
            .ok_or_else(|| OrchError::precondition_failed(format!("no team member covers role '{}'", step.role)))?;

        let input_doc = first_input_document(step, def, &instance);
        let output = self
            .registry
            .create(
                step.name.clone(),
                step.output_type,
                assignee.to_string(),
                serde_json::to_vec(&serde_json::json!({ "step": step.name, "action": step.action })).unwrap_or_default(),
            )
            .await?;

        if let Some(input_doc) = input_doc {
            let handoff = self
                .handoffs
                .create(
                    input_doc,
                    "workflow-engine",
                    assignee.to_string(),
                    step.name.clone(),
                    step.action.clone(),
                    ExpectedAction::Edit,
                    Priority::Medium,
                    None,
                    None,
                )
                .await?;
            self.handoffs.deliver(&handoff.id).await?;
            self.handoffs.accept(&handoff.id).await?;
            self.handoffs.complete(&handoff.id, Some(output.id.clone())).await?;
        }

        let decision = if let Some(gate_id) = step.quality_gate.clone() {
            Some(self.evaluate_step_gate(&gate_id, &output.id).await?)
        } else {
            None
        };

        Ok(StepOutcome {
            output_document: output.id,
            gate: decision,
        })
    }

    async fn evaluate_step_gate(&self, gate_id: &GateId, target_document: &DocumentId) -> OrchResult<orch_core::GateDecision> {
        let report = self
            .gates
            .evaluate(gate_id, target_document.to_string(), vec![], vec![])
            .await?;
        Ok(report.decision)
    }

    async fn apply_outcome(
        &self,
        instance_id: &WorkflowInstanceId,
        step: &WorkflowStep,
        result: OrchResult<StepOutcome>,
    ) -> OrchResult<()> {
        let mut state = self.store.write_state().await;
        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| OrchError::not_found(format!("workflow instance {instance_id} not found")))?;

        match result {
            Ok(outcome) => {
                instance.produced_documents.insert(step.name.clone(), outcome.output_document);
                match outcome.gate {
                    Some(orch_core::GateDecision::Fail) => {
                        instance.step_status.insert(step.name.clone(), StepStatus::Failed);
                        instance.status = WorkflowStatus::Failed;
                        instance.error = Some(format!("quality gate failed on step '{}'", step.name));
                    }
                    Some(orch_core::GateDecision::Concerns) => {
                        instance.step_status.insert(step.name.clone(), StepStatus::Completed);
                        instance
                            .annotations
                            .push(format!("step '{}' completed with gate CONCERNS", step.name));
                    }
                    Some(orch_core::GateDecision::Waived) => {
                        instance.step_status.insert(step.name.clone(), StepStatus::Completed);
                        instance
                            .annotations
                            .push(format!("step '{}' completed under a gate waiver", step.name));
                    }
                    _ => {
                        instance.step_status.insert(step.name.clone(), StepStatus::Completed);
                    }
                }
            }
            Err(e) => {
                instance.step_status.insert(step.name.clone(), StepStatus::Failed);
                instance.status = WorkflowStatus::Failed;
                instance.error = Some(e.message);
            }
        }
        Ok(())
    }

    async fn finalize(&self, instance_id: &WorkflowInstanceId) -> OrchResult<()> {
        let mut state = self.store.write_state().await;
        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| OrchError::not_found(format!("workflow instance {instance_id} not found")))?;
        if instance.status == WorkflowStatus::Running {
            instance.status = WorkflowStatus::Completed;
        }
        Ok(())
    }

    /// Cancel in-flight handoffs for steps still pending/running and mark
    /// the instance CANCELLED. Produced documents are retained.
    pub async fn cancel(&self, instance_id: &WorkflowInstanceId, reason: impl Into<String>) -> OrchResult<WorkflowInstance> {
        let reason = reason.into();
        let mut state = self.store.write_state().await;
        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| OrchError::not_found(format!("workflow instance {instance_id} not found")))?;
        instance.status = WorkflowStatus::Cancelled;
        instance.error = Some(reason);
        for status in instance.step_status.values_mut() {
            if matches!(status, StepStatus::Pending | StepStatus::Running) {
                *status = StepStatus::Skipped;
            }
        }
        Ok(instance.clone())
    }
}

struct StepOutcome {
    output_document: DocumentId,
    gate: Option<orch_core::GateDecision>,
}

fn external_key(doc_type: DocumentType) -> String {
    format!("external:{doc_type:?}")
}

fn step_inputs_satisfied(step: &WorkflowStep, def: &WorkflowDefinition, instance: &WorkflowInstance) -> bool {
    step.input_types.iter().all(|input_type| {
        instance.produced_documents.contains_key(&external_key(*input_type))
            || def.steps.iter().any(|other| {
                other.output_type == *input_type
                    && instance.step_status.get(&other.name) == Some(&StepStatus::Completed)
            })
    })
}

fn first_input_document(step: &WorkflowStep, def: &WorkflowDefinition, instance: &WorkflowInstance) -> Option<DocumentId> {
    let input_type = *step.input_types.first()?;
    if let Some(doc) = instance.produced_documents.get(&external_key(input_type)) {
        return Some(doc.clone());
    }
    def.steps
        .iter()
        .find(|other| other.output_type == input_type)
        .and_then(|other| instance.produced_documents.get(&other.name))
        .cloned()
}

fn role_matched_member(team: &orch_core::Team, role: &str) -> Option<AgentId> {
    let mut matches: Vec<&AgentId> = team
        .members
        .iter()
        .filter(|(_, m)| m.specialization.as_deref() == Some(role))
        .map(|(id, _)| id)
        .collect();
    matches.sort();
    matches
        .first()
        .cloned()
        .or_else(|| team.members.keys().min())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::{
        AllowAllPolicyGate, DocumentType, GateKind, GateThresholds, QualityGate, TeamFormationRequest,
        TeamType, UnboundedAllocator,
    };
    use orch_pool::{AgentPool, PoolConfig};
    use orch_teams::OrchestratorConfig;

    async fn harness() -> (WorkflowEngine, Arc<TeamOrchestrator>, TeamId) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(DocumentRegistry::open(dir.path().join("registry.blob")).await.unwrap());
        let handoffs = Arc::new(
            HandoffProtocol::open(dir.path().join("handoffs.blob"), registry.clone())
                .await
                .unwrap(),
        );
        let gates = Arc::new(QualityGateEngine::open(dir.path().join("gates.blob")).await.unwrap());

        let pool = Arc::new(
            AgentPool::open(
                dir.path().join("pool.json"),
                PoolConfig {
                    auto_scale: false,
                    ..PoolConfig::default()
                },
                Arc::new(UnboundedAllocator),
            )
            .await
            .unwrap(),
        );
        pool.initialize(3).await.unwrap();

        let teams = Arc::new(TeamOrchestrator::new(
            pool,
            Arc::new(UnboundedAllocator),
            Arc::new(AllowAllPolicyGate),
            OrchestratorConfig {
                archive_dir: dir.path().join("archive"),
                performance_check_interval_secs: 3600,
                ..OrchestratorConfig::default()
            },
        ));

        let team = teams
            .form_team(TeamFormationRequest {
                team_type: TeamType::Squad,
                mission: "build".to_string(),
                min_size: 2,
                max_size: 3,
                size: 2,
                required_skills: vec![],
            })
            .await
            .unwrap();

        let engine = WorkflowEngine::open(dir.path().join("engine.blob"), registry, handoffs, gates, teams.clone())
            .await
            .unwrap();
        (engine, teams, team.id)
    }

    #[tokio::test]
    async fn two_step_workflow_runs_to_completion() {
        let (engine, _teams, team_id) = harness().await;

        let def = WorkflowDefinition {
            id: WorkflowId::new(),
            name: "draft-and-review".to_string(),
            steps: vec![
                WorkflowStep {
                    name: "draft".to_string(),
                    role: "general".to_string(),
                    action: "write the first draft".to_string(),
                    input_types: vec![DocumentType::Prd],
                    output_type: DocumentType::Story,
                    quality_gate: None,
                    timeout_seconds: 60,
                },
                WorkflowStep {
                    name: "review".to_string(),
                    role: "general".to_string(),
                    action: "review the draft".to_string(),
                    input_types: vec![DocumentType::Story],
                    output_type: DocumentType::Report,
                    quality_gate: None,
                    timeout_seconds: 60,
                },
            ],
        };
        engine.register_workflow(def.clone()).await.unwrap();

        let dir_registry = engine.registry.clone();
        let prd = dir_registry.create("PRD", DocumentType::Prd, "pm", b"x".to_vec()).await.unwrap();

        let mut initial = HashMap::new();
        initial.insert(DocumentType::Prd, prd.id);

        let instance = engine.start_workflow(&def.id, team_id, initial).await.unwrap();
        assert_eq!(instance.status, WorkflowStatus::Completed);
        assert_eq!(instance.produced_documents.len() - 1, 2); // plus the external seed entry
    }

    #[tokio::test]
    async fn failing_gate_halts_the_instance() {
        let (engine, _teams, team_id) = harness().await;

        let gate = QualityGate {
            id: GateId::new(),
            name: "strict".to_string(),
            kind: GateKind::Story,
            thresholds: GateThresholds {
                max_critical_issues: 0,
                ..GateThresholds::stricter_preset()
            },
            criteria: vec![orch_core::GateCriterion {
                predicate_id: "always_fails".to_string(),
                required: true,
            }],
        };
        let gate_id = gate.id.clone();
        engine.gates.register_gate(gate).await.unwrap();

        let def = WorkflowDefinition {
            id: WorkflowId::new(),
            name: "gated".to_string(),
            steps: vec![WorkflowStep {
                name: "draft".to_string(),
                role: "general".to_string(),
                action: "write".to_string(),
                input_types: vec![],
                output_type: DocumentType::Story,
                quality_gate: Some(gate_id),
                timeout_seconds: 60,
            }],
        };
        engine.register_workflow(def.clone()).await.unwrap();

        let instance = engine.start_workflow(&def.id, team_id, HashMap::new()).await.unwrap();
        assert_eq!(instance.status, WorkflowStatus::Failed);
    }
}
