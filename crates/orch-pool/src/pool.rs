use chrono::{DateTime, Utc};
use orch_core::{
    Agent, AgentId, AgentState, AllocationRequest, OrchError, OrchResult, ResourceAllocator,
    ResourceBudget, TeamId,
};
use orch_core::control::AdmissionPriority;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

const MAX_ALLOCATION_HISTORY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_size: usize,
    pub auto_scale: bool,
    pub performance_threshold: f64,
    pub health_check_interval_secs: u64,
    pub per_agent_resources: ResourceBudget,
    /// Weighted distribution used to synthesize a new agent's skill set
    /// during auto-scale: `(skill, weight)` pairs.
    pub skill_distribution: Vec<(String, f64)>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            auto_scale: true,
            performance_threshold: 0.5,
            health_check_interval_secs: 30,
            per_agent_resources: ResourceBudget {
                cores: 0.5,
                memory_mb: 256.0,
                storage_mb: 100.0,
                bandwidth_mbps: 10.0,
            },
            skill_distribution: vec![("general".to_string(), 1.0)],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub request: AllocationRequest,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationHistoryRecord {
    pub team_id: TeamId,
    pub agent_ids: Vec<AgentId>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PoolState {
    pub agents: std::collections::HashMap<AgentId, Agent>,
    pub queue: VecDeque<QueuedRequest>,
    pub allocation_history: VecDeque<AllocationHistoryRecord>,
    pub config: Option<PoolConfig>,
}

pub enum AllocationOutcome {
    Allocated(Vec<Agent>),
    Queued,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub total: usize,
    pub available: usize,
    pub allocated: usize,
    pub busy: usize,
    pub maintenance: usize,
    pub error: usize,
    pub queue_length: usize,
}

/// Dynamic agent allocator. Internal serialization is a single write lock
/// over `PoolState`; background health monitoring runs on its own task.
pub struct AgentPool {
    state: Arc<RwLock<PoolState>>,
    config: PoolConfig,
    allocator: Arc<dyn ResourceAllocator>,
    path: std::path::PathBuf,
    shutdown: Arc<AtomicBool>,
    monitor: RwLock<Option<JoinHandle<()>>>,
}

impl AgentPool {
    pub async fn open(
        path: impl Into<std::path::PathBuf>,
        config: PoolConfig,
        allocator: Arc<dyn ResourceAllocator>,
    ) -> OrchResult<Self> {
        let path = path.into();
        let loaded: Option<PoolState> = orch_core::snapshot::load(&path).await?;
        let state = loaded.unwrap_or_default();
        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            config,
            allocator,
            path,
            shutdown: Arc::new(AtomicBool::new(false)),
            monitor: RwLock::new(None),
        })
    }

    pub async fn persist(&self) -> OrchResult<()> {
        let mut state = self.state.write().await;
        state.config = Some(self.config.clone());
        orch_core::snapshot::save(&self.path, &*state).await
    }

    /// Populate the pool with `size` fresh agents drawn from the
    /// configured skill distribution.
    pub async fn initialize(&self, size: usize) -> OrchResult<()> {
        let mut state = self.state.write().await;
        for _ in 0..size {
            let agent = self.synthesize_agent();
            state.agents.insert(agent.id.clone(), agent);
        }
        tracing::info!(size, "agent pool initialized");
        Ok(())
    }

    fn synthesize_agent(&self) -> Agent {
        let skill = weighted_pick(&self.config.skill_distribution).unwrap_or_else(|| "general".to_string());
        Agent::new("synthesized", [skill])
    }

    pub async fn allocate(&self, request: AllocationRequest) -> OrchResult<AllocationOutcome> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(OrchError::precondition_failed("pool is shut down"));
        }

        let handle = self
            .allocator
            .reserve(
                &request.team_id,
                scale_budget(&self.config.per_agent_resources, request.count),
                AdmissionPriority::Normal,
            )
            .await;

        let handle = match handle {
            Ok(h) => h,
            Err(_) => return self.enqueue_or_scale(request).await,
        };

        let mut state = self.state.write().await;
        let selected = select_candidates(&state.agents, &request, self.config.performance_threshold);

        if selected.len() < request.count {
            drop(state);
            self.allocator.release(&handle).await.ok();
            return self.enqueue_or_scale(request).await;
        }

        let mut allocated = Vec::with_capacity(selected.len());
        for id in selected {
            if let Some(agent) = state.agents.get_mut(&id) {
                agent.state = AgentState::Allocated;
                agent.team_id = Some(request.team_id.clone());
                agent.total_allocations += 1;
                allocated.push(agent.clone());
            }
        }
        record_allocation(&mut state, &request.team_id, &allocated);
        tracing::info!(team_id = %request.team_id, count = allocated.len(), "agents allocated");
        Ok(AllocationOutcome::Allocated(allocated))
    }

    async fn enqueue_or_scale(&self, request: AllocationRequest) -> OrchResult<AllocationOutcome> {
        let mut state = self.state.write().await;

        if self.config.auto_scale && state.agents.len() < self.config.max_size {
            let needed = request.count.saturating_sub(
                select_candidates(&state.agents, &request, self.config.performance_threshold).len(),
            );
            let room = self.config.max_size - state.agents.len();
            let to_create = needed.min(room);
            for _ in 0..to_create {
                let agent = self.synthesize_agent();
                state.agents.insert(agent.id.clone(), agent);
            }

            let selected = select_candidates(&state.agents, &request, self.config.performance_threshold);
            if selected.len() >= request.count {
                let mut allocated = Vec::with_capacity(request.count);
                for id in selected.into_iter().take(request.count) {
                    let agent = state.agents.get_mut(&id).unwrap();
                    agent.state = AgentState::Allocated;
                    agent.team_id = Some(request.team_id.clone());
                    agent.total_allocations += 1;
                    allocated.push(agent.clone());
                }
                record_allocation(&mut state, &request.team_id, &allocated);
                return Ok(AllocationOutcome::Allocated(allocated));
            }
        }

        state.queue.push_back(QueuedRequest {
            request,
            queued_at: Utc::now(),
        });
        tracing::warn!(queue_len = state.queue.len(), "insufficient agents, request queued");
        Ok(AllocationOutcome::Queued)
    }

    /// Release the given agents (or every agent bound to the team when
    /// `agent_ids` is `None`), then make a best-effort pass over the queue.
    pub async fn release(&self, team_id: &TeamId, agent_ids: Option<Vec<AgentId>>) -> OrchResult<()> {
        let mut state = self.state.write().await;
        let targets: Vec<AgentId> = match agent_ids {
            Some(ids) => ids,
            None => state
                .agents
                .values()
                .filter(|a| a.team_id.as_ref() == Some(team_id))
                .map(|a| a.id.clone())
                .collect(),
        };

        for id in &targets {
            if let Some(agent) = state.agents.get_mut(id) {
                agent.state = AgentState::Available;
                agent.team_id = None;
            }
        }
        tracing::info!(team_id = %team_id, released = targets.len(), "agents released");
        drop(state);
        self.drain_queue().await
    }

    async fn drain_queue(&self) -> OrchResult<()> {
        let mut state = self.state.write().await;
        let mut remaining = VecDeque::new();
        let pending: Vec<QueuedRequest> = state.queue.drain(..).collect();

        for queued in pending {
            let selected = select_candidates(
                &state.agents,
                &queued.request,
                self.config.performance_threshold,
            );
            if selected.len() >= queued.request.count {
                let mut allocated = Vec::with_capacity(queued.request.count);
                for id in selected.into_iter().take(queued.request.count) {
                    let agent = state.agents.get_mut(&id).unwrap();
                    agent.state = AgentState::Allocated;
                    agent.team_id = Some(queued.request.team_id.clone());
                    agent.total_allocations += 1;
                    allocated.push(agent.clone());
                }
                record_allocation(&mut state, &queued.request.team_id, &allocated);
            } else {
                remaining.push_back(queued);
            }
        }

        state.queue = remaining;
        Ok(())
    }

    /// Apply a performance delta. A score that crosses below threshold
    /// demotes an AVAILABLE agent to MAINTENANCE.
    pub async fn update_performance(&self, agent_id: &AgentId, delta: f64) -> OrchResult<Agent> {
        let mut state = self.state.write().await;
        let agent = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| OrchError::not_found(format!("agent {agent_id} not found")))?;
        agent.performance_score = (agent.performance_score + delta).clamp(0.0, 1.0);
        if agent.performance_score < self.config.performance_threshold
            && agent.state == AgentState::Available
        {
            agent.state = AgentState::Maintenance;
        }
        Ok(agent.clone())
    }

    pub async fn status(&self) -> PoolStatus {
        let state = self.state.read().await;
        let mut status = PoolStatus {
            total: state.agents.len(),
            available: 0,
            allocated: 0,
            busy: 0,
            maintenance: 0,
            error: 0,
            queue_length: state.queue.len(),
        };
        for agent in state.agents.values() {
            match agent.state {
                AgentState::Available => status.available += 1,
                AgentState::Allocated => status.allocated += 1,
                AgentState::Busy => status.busy += 1,
                AgentState::Maintenance => status.maintenance += 1,
                AgentState::Error => status.error += 1,
                AgentState::Terminating => {}
            }
        }
        status
    }

    pub async fn shutdown(&self) -> OrchResult<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.monitor.write().await.take() {
            handle.abort();
        }
        self.persist().await
    }

    /// Health monitor: on a fixed interval, stamps `last_health_check` and
    /// promotes MAINTENANCE -> AVAILABLE once the score recovers.
    pub fn spawn_health_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        let interval = std::time::Duration::from_secs(self.config.health_check_interval_secs.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if pool.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let mut state = pool.state.write().await;
                let now = Utc::now();
                for agent in state.agents.values_mut() {
                    agent.last_health_check = now;
                    if agent.state == AgentState::Maintenance
                        && agent.performance_score >= pool.config.performance_threshold
                    {
                        agent.state = AgentState::Available;
                    }
                }
                tracing::debug!("health monitor tick complete");
            }
        });
        handle
    }
}

fn scale_budget(per_agent: &ResourceBudget, count: usize) -> ResourceBudget {
    let n = count as f64;
    ResourceBudget {
        cores: per_agent.cores * n,
        memory_mb: per_agent.memory_mb * n,
        storage_mb: per_agent.storage_mb * n,
        bandwidth_mbps: per_agent.bandwidth_mbps * n,
    }
}

fn candidate_score(agent: &Agent, request: &AllocationRequest) -> f64 {
    let required_overlap = request.required_skills.intersection(&agent.skills).count() as f64;
    let optional_overlap = request.optional_skills.intersection(&agent.skills).count() as f64;
    let profile_bonus = if request.preferred_profiles.contains(&agent.profile) {
        3.0
    } else {
        0.0
    };
    let base = 1.0 + 2.0 * required_overlap + optional_overlap + profile_bonus;
    base * agent.performance_score - 0.01 * agent.total_allocations as f64
}

fn select_candidates(
    agents: &std::collections::HashMap<AgentId, Agent>,
    request: &AllocationRequest,
    performance_threshold: f64,
) -> Vec<AgentId> {
    let mut scored: Vec<(f64, u64, AgentId)> = agents
        .values()
        .filter(|a| {
            a.state == AgentState::Available
                && a.has_all_skills(&request.required_skills)
                && a.performance_score >= performance_threshold
        })
        .map(|a| (candidate_score(a, request), a.total_allocations, a.id.clone()))
        .collect();

    // Highest score first; ties by lower total_allocations, then agent id.
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    scored
        .into_iter()
        .take(request.count)
        .map(|(_, _, id)| id)
        .collect()
}

fn record_allocation(state: &mut PoolState, team_id: &TeamId, allocated: &[Agent]) {
    state.allocation_history.push_back(AllocationHistoryRecord {
        team_id: team_id.clone(),
        agent_ids: allocated.iter().map(|a| a.id.clone()).collect(),
        at: Utc::now(),
    });
    while state.allocation_history.len() > MAX_ALLOCATION_HISTORY {
        state.allocation_history.pop_front();
    }
}

fn weighted_pick(distribution: &[(String, f64)]) -> Option<String> {
    use rand::Rng;
    if distribution.is_empty() {
        return None;
    }
    let total: f64 = distribution.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return distribution.first().map(|(s, _)| s.clone());
    }
    let mut roll = rand::thread_rng().gen_range(0.0..total);
    for (skill, weight) in distribution {
        if roll < *weight {
            return Some(skill.clone());
        }
        roll -= weight;
    }
    distribution.last().map(|(s, _)| s.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::UnboundedAllocator;
    use std::collections::HashSet;

    async fn pool_with(agents: usize) -> AgentPool {
        let dir = tempfile::tempdir().unwrap();
        let config = PoolConfig {
            auto_scale: false,
            ..PoolConfig::default()
        };
        let pool = AgentPool::open(
            dir.path().join("state.json"),
            config,
            Arc::new(UnboundedAllocator),
        )
        .await
        .unwrap();
        pool.initialize(agents).await.unwrap();
        pool
    }

    fn req(count: usize, required: &[&str]) -> AllocationRequest {
        AllocationRequest {
            team_id: TeamId::new(),
            required_skills: required.iter().map(|s| s.to_string()).collect(),
            optional_skills: HashSet::new(),
            preferred_profiles: HashSet::new(),
            count,
        }
    }

    #[tokio::test]
    async fn allocate_3_of_10() {
        let pool = pool_with(0).await;
        {
            let mut state = pool.state.write().await;
            for i in 0..10 {
                let skills = if i < 4 {
                    vec!["customer_service".to_string(), "general".to_string()]
                } else {
                    vec!["general".to_string()]
                };
                let agent = Agent::new("default", skills);
                state.agents.insert(agent.id.clone(), agent);
            }
        }

        let outcome = pool
            .allocate(req(3, &["customer_service", "general"]))
            .await
            .unwrap();

        match outcome {
            AllocationOutcome::Allocated(agents) => {
                assert_eq!(agents.len(), 3);
                for a in &agents {
                    assert!(a.skills.contains("customer_service"));
                    assert!(a.skills.contains("general"));
                }
            }
            AllocationOutcome::Queued => panic!("expected allocation"),
        }

        let status = pool.status().await;
        assert_eq!(status.available, 7);
        assert_eq!(status.allocated, 3);
    }

    #[tokio::test]
    async fn starvation_queues_when_auto_scale_off() {
        let pool = pool_with(5).await;
        let outcome = pool.allocate(req(10, &[])).await.unwrap();
        assert!(matches!(outcome, AllocationOutcome::Queued));
        assert_eq!(pool.status().await.queue_length, 1);

        let team = TeamId::new();
        pool.release(&team, None).await.unwrap();
        // Still only 5 agents total versus 10 requested: remains queued.
        assert_eq!(pool.status().await.queue_length, 1);
    }
}
