//! Team Orchestrator (C4): formation, role assignment, lifecycle FSM and
//! per-team monitoring.

use chrono::Utc;
use orch_core::{
    AdmissionPriority, Agent, AgentId, OrchError, OrchResult, PendingDecision, PolicyGate,
    ResourceAllocator, ResourceBudget, Team, TeamFormationRequest, TeamId, TeamMember,
    TeamMetrics, TeamRecommendation, TeamRole, TeamState,
};
use orch_pool::{AgentPool, AllocationOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Skills consulted, in priority order, when deriving a member's
/// specialization tag and when assigning the SPECIALIST/REVIEWER roles.
const SPECIALIZATION_PRIORITY: &[&str] = &[
    "architecture",
    "security",
    "testing",
    "coding",
    "design",
    "general",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub max_teams: usize,
    pub leader_threshold: usize,
    pub performance_check_interval_secs: u64,
    pub auto_dissolve_idle_secs: i64,
    pub base_resources: ResourceBudget,
    pub per_member_resources: ResourceBudget,
    pub archive_dir: std::path::PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_teams: 50,
            leader_threshold: 3,
            performance_check_interval_secs: 60,
            auto_dissolve_idle_secs: 3600,
            base_resources: ResourceBudget {
                cores: 1.0,
                memory_mb: 512.0,
                storage_mb: 500.0,
                bandwidth_mbps: 20.0,
            },
            per_member_resources: ResourceBudget {
                cores: 0.25,
                memory_mb: 128.0,
                storage_mb: 50.0,
                bandwidth_mbps: 5.0,
            },
            archive_dir: std::path::PathBuf::from("teams/archive"),
        }
    }
}

pub struct TeamOrchestrator {
    teams: RwLock<HashMap<TeamId, Team>>,
    pool: Arc<AgentPool>,
    allocator: Arc<dyn ResourceAllocator>,
    policy: Arc<dyn PolicyGate>,
    config: OrchestratorConfig,
    monitors: RwLock<HashMap<TeamId, JoinHandle<()>>>,
}

impl TeamOrchestrator {
    pub fn new(
        pool: Arc<AgentPool>,
        allocator: Arc<dyn ResourceAllocator>,
        policy: Arc<dyn PolicyGate>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            teams: RwLock::new(HashMap::new()),
            pool,
            allocator,
            policy,
            config,
            monitors: RwLock::new(HashMap::new()),
        }
    }

    pub async fn form_team(self: &Arc<Self>, request: TeamFormationRequest) -> OrchResult<Team> {
        if request.size < request.min_size || request.size > request.max_size {
            return Err(OrchError::invalid_argument(format!(
                "team size {} outside [{}, {}]",
                request.size, request.min_size, request.max_size
            )));
        }

        {
            let teams = self.teams.read().await;
            let active = teams.values().filter(|t| t.state != TeamState::Dissolved).count();
            if active >= self.config.max_teams {
                return Err(OrchError::resource_exhausted("max team count reached"));
            }
        }

        let mut context = serde_json::Map::new();
        context.insert("mission".to_string(), serde_json::Value::String(request.mission.clone()));
        context.insert("size".to_string(), serde_json::Value::from(request.size));
        let decision = PendingDecision {
            action: "form_team".to_string(),
            actor: "orchestrator".to_string(),
            context,
        };
        let verdict = self.policy.validate(&decision).await?;
        if !verdict.approved {
            return Err(OrchError::policy_denied(verdict.reasons.join("; ")));
        }

        let team_id = TeamId::new();
        let resources = scale_resources(&self.config.base_resources, &self.config.per_member_resources, request.size);
        let handle = self
            .allocator
            .reserve(&team_id, resources, AdmissionPriority::High)
            .await?;

        let allocation_request = orch_core::AllocationRequest {
            team_id: team_id.clone(),
            required_skills: request.required_skills.iter().cloned().collect(),
            optional_skills: Default::default(),
            preferred_profiles: Default::default(),
            count: request.size,
        };

        let agents = match self.pool.allocate(allocation_request).await {
            Ok(AllocationOutcome::Allocated(agents)) => agents,
            Ok(AllocationOutcome::Queued) | Err(_) => {
                self.allocator.release(&handle).await.ok();
                return Err(OrchError::resource_exhausted(
                    "insufficient agents to form team; no partial teams",
                ));
            }
        };

        let members = assign_roles(&agents, self.config.leader_threshold);
        let now = Utc::now();
        let team = Team {
            id: team_id.clone(),
            team_type: request.team_type,
            mission: request.mission.clone(),
            state: TeamState::Storming,
            members,
            budget: resources,
            budget_used: ResourceBudget::default(),
            workflow_instance: None,
            active_tasks: Vec::new(),
            completed_tasks: Vec::new(),
            metrics: TeamMetrics::default(),
            created_at: now,
            last_activity: now,
        };

        if team.leader_count() > 1 {
            return Err(OrchError::fatal("role assignment produced more than one leader"));
        }

        self.teams.write().await.insert(team_id.clone(), team.clone());
        self.spawn_monitor(team_id.clone()).await;
        tracing::info!(team_id = %team_id, size = team.size(), "team formed");
        Ok(team)
    }

    pub async fn dissolve_team(&self, team_id: &TeamId, reason: impl Into<String>) -> OrchResult<()> {
        let reason = reason.into();
        if let Some(handle) = self.monitors.write().await.remove(team_id) {
            handle.abort();
        }

        let mut teams = self.teams.write().await;
        let team = teams
            .get_mut(team_id)
            .ok_or_else(|| OrchError::not_found(format!("team {team_id} not found")))?;
        team.state = TeamState::Dissolved;
        let snapshot = team.clone();
        drop(teams);

        // Best-effort release: errors during release do not block dissolution.
        if let Err(e) = self.pool.release(team_id, None).await {
            tracing::warn!(team_id = %team_id, error = %e.message, "agent release failed during dissolution");
        }

        let archive_path = self.config.archive_dir.join(format!("{team_id}.json"));
        if let Err(e) = orch_core::snapshot::save(&archive_path, &snapshot).await {
            tracing::warn!(team_id = %team_id, error = %e.message, "team archive snapshot failed");
        }

        tracing::info!(team_id = %team_id, reason, "team dissolved");
        Ok(())
    }

    pub async fn assign_task(&self, team_id: &TeamId, task_id: impl Into<String>) -> OrchResult<()> {
        let mut teams = self.teams.write().await;
        let team = teams
            .get_mut(team_id)
            .ok_or_else(|| OrchError::not_found(format!("team {team_id} not found")))?;
        team.active_tasks.push(task_id.into());
        team.last_activity = Utc::now();
        Ok(())
    }

    /// Completing the first task transitions STORMING -> NORMING. Quality
    /// and efficiency use the source's rolling `(old + new) / 2` update
    /// (preserved as-is, see SPEC_FULL.md Open Question 1).
    pub async fn complete_task(
        &self,
        team_id: &TeamId,
        task_id: &str,
        quality_sample: f64,
        efficiency_sample: f64,
    ) -> OrchResult<Team> {
        let mut teams = self.teams.write().await;
        let team = teams
            .get_mut(team_id)
            .ok_or_else(|| OrchError::not_found(format!("team {team_id} not found")))?;

        team.active_tasks.retain(|t| t != task_id);
        team.completed_tasks.push(task_id.to_string());
        team.metrics.quality = (team.metrics.quality + quality_sample) / 2.0;
        team.metrics.efficiency = (team.metrics.efficiency + efficiency_sample) / 2.0;

        let hours = team.hours_since_creation().max(1.0 / 3600.0);
        team.metrics.velocity = team.completed_tasks.len() as f64 / hours;
        team.last_activity = Utc::now();

        if team.state == TeamState::Storming {
            team.state = TeamState::Norming;
        }

        Ok(team.clone())
    }

    pub async fn update_status(&self, team_id: &TeamId, new_state: TeamState) -> OrchResult<Team> {
        let mut teams = self.teams.write().await;
        let team = teams
            .get_mut(team_id)
            .ok_or_else(|| OrchError::not_found(format!("team {team_id} not found")))?;
        team.state = new_state;
        Ok(team.clone())
    }

    pub async fn get_team(&self, team_id: &TeamId) -> OrchResult<Team> {
        self.teams
            .read()
            .await
            .get(team_id)
            .cloned()
            .ok_or_else(|| OrchError::not_found(format!("team {team_id} not found")))
    }

    pub async fn list_teams(&self) -> Vec<Team> {
        self.teams.read().await.values().cloned().collect()
    }

    /// Deterministic, advisory-only rule engine.
    pub async fn recommendations(&self, team_id: &TeamId) -> OrchResult<Vec<TeamRecommendation>> {
        let team = self.get_team(team_id).await?;
        let mut out = Vec::new();

        if team.size() < 3 {
            out.push(TeamRecommendation {
                team_id: team_id.clone(),
                reason: "team is undersized for sustained delivery".to_string(),
                action: "add members".to_string(),
            });
        }
        if team.metrics.quality < 0.5 {
            out.push(TeamRecommendation {
                team_id: team_id.clone(),
                reason: "quality score below acceptable floor".to_string(),
                action: "quality training".to_string(),
            });
        }
        let has_testing = team
            .members
            .values()
            .any(|m| m.specialization.as_deref() == Some("testing"));
        if !has_testing {
            out.push(TeamRecommendation {
                team_id: team_id.clone(),
                reason: "no member covers testing".to_string(),
                action: "add QA".to_string(),
            });
        }

        Ok(out)
    }

    /// Rehydrates the in-memory team map from a caller-supplied snapshot
    /// (e.g. a CLI process reloading the teams it formed in a prior
    /// invocation) and re-arms a monitor task for every non-terminal team.
    pub async fn restore(self: &Arc<Self>, teams: Vec<Team>) {
        let mut active = Vec::new();
        {
            let mut guard = self.teams.write().await;
            for team in teams {
                if team.state != TeamState::Dissolved {
                    active.push(team.id.clone());
                }
                guard.insert(team.id.clone(), team);
            }
        }
        for team_id in active {
            self.spawn_monitor(team_id).await;
        }
    }

    pub async fn shutdown(&self) -> OrchResult<()> {
        let mut monitors = self.monitors.write().await;
        for (_, handle) in monitors.drain() {
            handle.abort();
        }
        Ok(())
    }

    async fn spawn_monitor(self: &Arc<Self>, team_id: TeamId) {
        let orchestrator = Arc::clone(self);
        let interval = std::time::Duration::from_secs(
            self.config.performance_check_interval_secs.max(1),
        );
        let idle_timeout = self.config.auto_dissolve_idle_secs;
        let monitor_team_id = team_id.clone();
        let handle = tokio::spawn(async move {
            let team_id = monitor_team_id;
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let mut should_dissolve = false;
                {
                    let mut teams = orchestrator.teams.write().await;
                    let Some(team) = teams.get_mut(&team_id) else {
                        break;
                    };
                    if team.state == TeamState::Dissolved {
                        break;
                    }
                    if team.state == TeamState::Norming && team.metrics.performing_ready() {
                        team.state = TeamState::Performing;
                    }
                    let idle_seconds = (Utc::now() - team.last_activity).num_seconds();
                    if team.is_idle() && idle_seconds >= idle_timeout {
                        team.state = TeamState::Adjourning;
                        should_dissolve = true;
                    }
                }
                if should_dissolve {
                    let _ = orchestrator.dissolve_team(&team_id, "idle timeout").await;
                    break;
                }
            }
        });
        self.monitors.write().await.insert(team_id, handle);
    }
}

fn scale_resources(base: &ResourceBudget, per_member: &ResourceBudget, size: usize) -> ResourceBudget {
    let n = size as f64;
    ResourceBudget {
        cores: base.cores + per_member.cores * n,
        memory_mb: base.memory_mb + per_member.memory_mb * n,
        storage_mb: base.storage_mb + per_member.storage_mb * n,
        bandwidth_mbps: base.bandwidth_mbps + per_member.bandwidth_mbps * n,
    }
}

fn strongest_skill(agent: &Agent) -> Option<String> {
    SPECIALIZATION_PRIORITY
        .iter()
        .find(|s| agent.skills.contains(**s))
        .map(|s| s.to_string())
        .or_else(|| agent.skills.iter().next().cloned())
}

fn assign_roles(agents: &[Agent], leader_threshold: usize) -> HashMap<AgentId, TeamMember> {
    let mut ranked: Vec<&Agent> = agents.iter().collect();
    ranked.sort_by(|a, b| b.performance_score.partial_cmp(&a.performance_score).unwrap());

    let mut members = HashMap::new();
    let third = (ranked.len() / 3).max(1);
    let now = Utc::now();

    for (idx, agent) in ranked.iter().enumerate() {
        let role = if idx == 0 && ranked.len() >= leader_threshold {
            TeamRole::Leader
        } else if agent.skills.contains("architecture") {
            TeamRole::Specialist
        } else if idx < third && agent.skills.contains("testing") {
            TeamRole::Reviewer
        } else if idx == 0 {
            TeamRole::Coordinator
        } else {
            TeamRole::Member
        };

        members.insert(
            agent.id.clone(),
            TeamMember {
                role,
                specialization: strongest_skill(agent),
                joined_at: now,
            },
        );
    }

    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::{AllowAllPolicyGate, UnboundedAllocator};
    use orch_pool::PoolConfig;

    async fn orchestrator_with(agents: usize) -> (Arc<TeamOrchestrator>, Arc<AgentPool>) {
        let dir = tempfile::tempdir().unwrap();
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
        pool.initialize(agents).await.unwrap();
        let orchestrator = Arc::new(TeamOrchestrator::new(
            pool.clone(),
            Arc::new(UnboundedAllocator),
            Arc::new(AllowAllPolicyGate),
            OrchestratorConfig {
                archive_dir: dir.path().join("archive"),
                performance_check_interval_secs: 3600,
                ..OrchestratorConfig::default()
            },
        ));
        (orchestrator, pool)
    }

    #[tokio::test]
    async fn formation_assigns_single_leader() {
        let (orchestrator, _pool) = orchestrator_with(5).await;
        let team = orchestrator
            .form_team(TeamFormationRequest {
                team_type: orch_core::TeamType::CrossFunctional,
                mission: "ship it".to_string(),
                min_size: 3,
                max_size: 5,
                size: 4,
                required_skills: vec![],
            })
            .await
            .unwrap();

        assert_eq!(team.leader_count(), 1);
        assert_eq!(team.state, TeamState::Storming);
    }

    #[tokio::test]
    async fn first_completed_task_moves_storming_to_norming() {
        let (orchestrator, _pool) = orchestrator_with(5).await;
        let team = orchestrator
            .form_team(TeamFormationRequest {
                team_type: orch_core::TeamType::Squad,
                mission: "m".to_string(),
                min_size: 2,
                max_size: 5,
                size: 3,
                required_skills: vec![],
            })
            .await
            .unwrap();

        let updated = orchestrator
            .complete_task(&team.id, "task-1", 0.8, 0.8)
            .await
            .unwrap();
        assert_eq!(updated.state, TeamState::Norming);
    }
}
