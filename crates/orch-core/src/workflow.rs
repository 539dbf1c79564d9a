//! Workflow definition and instance state (C6).

use crate::document::DocumentType;
use crate::ids::{DocumentId, GateId, TeamId, WorkflowId, WorkflowInstanceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    pub role: String,
    pub action: String,
    pub input_types: Vec<DocumentType>,
    pub output_type: DocumentType,
    pub quality_gate: Option<GateId>,
    pub timeout_seconds: u64,
}

/// A declarative sequence/graph of document-producing steps executed by a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    pub steps: Vec<WorkflowStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: WorkflowInstanceId,
    pub workflow_id: WorkflowId,
    pub team_id: TeamId,
    pub step_status: HashMap<String, StepStatus>,
    pub produced_documents: HashMap<String, DocumentId>,
    pub status: WorkflowStatus,
    pub error: Option<String>,
    /// Notes attached when a step's quality gate returns CONCERNS or
    /// WAIVED; the instance proceeds but the annotation records why.
    pub annotations: Vec<String>,
}

impl WorkflowInstance {
    pub fn new(workflow_id: WorkflowId, team_id: TeamId, def: &WorkflowDefinition) -> Self {
        let mut step_status = HashMap::new();
        for step in &def.steps {
            step_status.insert(step.name.clone(), StepStatus::Pending);
        }
        Self {
            id: WorkflowInstanceId::new(),
            workflow_id,
            team_id,
            step_status,
            produced_documents: HashMap::new(),
            status: WorkflowStatus::Pending,
            error: None,
            annotations: Vec::new(),
        }
    }
}
