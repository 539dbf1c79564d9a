//! Team identity, membership and lifecycle state.

use crate::ids::{AgentId, TeamId, WorkflowInstanceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamType {
    CrossFunctional,
    SelfManaging,
    FlowToWork,
    Squad,
    TaskForce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamState {
    Forming,
    Storming,
    Norming,
    Performing,
    Adjourning,
    Dissolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Leader,
    Coordinator,
    Specialist,
    Reviewer,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub role: TeamRole,
    pub specialization: Option<String>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceBudget {
    pub cores: f64,
    pub memory_mb: f64,
    pub storage_mb: f64,
    pub bandwidth_mbps: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TeamMetrics {
    pub velocity: f64,
    pub quality: f64,
    pub efficiency: f64,
    pub collaboration: f64,
}

impl TeamMetrics {
    pub fn performing_ready(&self) -> bool {
        self.quality >= 0.7 && self.efficiency >= 0.7 && self.collaboration >= 0.7
    }
}

/// A time-bounded grouping of agents with a mission, budget, and lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub team_type: TeamType,
    pub mission: String,
    pub state: TeamState,
    pub members: HashMap<AgentId, TeamMember>,
    pub budget: ResourceBudget,
    pub budget_used: ResourceBudget,
    pub workflow_instance: Option<WorkflowInstanceId>,
    pub active_tasks: Vec<String>,
    pub completed_tasks: Vec<String>,
    pub metrics: TeamMetrics,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Team {
    pub fn leader(&self) -> Option<&AgentId> {
        self.members
            .iter()
            .find(|(_, m)| matches!(m.role, TeamRole::Leader))
            .map(|(id, _)| id)
    }

    pub fn leader_count(&self) -> usize {
        self.members
            .values()
            .filter(|m| matches!(m.role, TeamRole::Leader))
            .count()
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active_tasks.is_empty() && self.workflow_instance.is_none()
    }

    pub fn hours_since_creation(&self) -> f64 {
        (Utc::now() - self.created_at).num_seconds() as f64 / 3600.0
    }
}

/// A request to form a new team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamFormationRequest {
    pub team_type: TeamType,
    pub mission: String,
    pub min_size: usize,
    pub max_size: usize,
    pub size: usize,
    pub required_skills: Vec<String>,
}

/// Advisory recommendation produced by the orchestrator's rule engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRecommendation {
    pub team_id: TeamId,
    pub reason: String,
    pub action: String,
}
