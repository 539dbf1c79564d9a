//! Agent identity and lifecycle state.
//!
//! An agent is a unit of allocatable capacity tracked by the pool (C3) and
//! bound to at most one team (C4) at a time.

use crate::ids::{AgentId, TeamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Available,
    Allocated,
    Busy,
    Maintenance,
    Error,
    Terminating,
}

/// An autonomous unit of execution with skills and a performance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub profile: String,
    pub skills: HashSet<String>,
    pub state: AgentState,
    /// Running quality-of-allocation score in [0, 1].
    pub performance_score: f64,
    pub total_allocations: u64,
    pub last_health_check: DateTime<Utc>,
    pub team_id: Option<TeamId>,
}

impl Agent {
    pub fn new(profile: impl Into<String>, skills: impl IntoIterator<Item = String>) -> Self {
        Self {
            id: AgentId::new(),
            profile: profile.into(),
            skills: skills.into_iter().collect(),
            state: AgentState::Available,
            performance_score: 0.75,
            total_allocations: 0,
            last_health_check: Utc::now(),
            team_id: None,
        }
    }

    pub fn has_all_skills(&self, required: &HashSet<String>) -> bool {
        required.is_subset(&self.skills)
    }

    pub fn is_bound_to_team(&self) -> bool {
        self.team_id.is_some()
    }
}

/// A request to the pool for a batch of agents with a shared skill profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub team_id: TeamId,
    pub required_skills: HashSet<String>,
    pub optional_skills: HashSet<String>,
    pub preferred_profiles: HashSet<String>,
    pub count: usize,
}
