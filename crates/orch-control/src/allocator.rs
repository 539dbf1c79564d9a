//! In-memory, budget-tracking `ResourceAllocator`.

use async_trait::async_trait;
use orch_core::{AdmissionPriority, AllocationHandle, OrchError, OrchResult, ResourceAllocator, ResourceBudget, TeamId};
use parking_lot::Mutex;
use std::collections::HashMap;

struct State {
    total: ResourceBudget,
    used: ResourceBudget,
    grants: HashMap<String, ResourceBudget>,
}

/// Tracks a fixed total budget and grants reservations against it.
/// `HIGH`-priority requests may borrow into a small headroom reserve that
/// `NORMAL`/`LOW` requests cannot touch, so a burst of ordinary work never
/// starves an urgent one.
pub struct BudgetAllocator {
    state: Mutex<State>,
    headroom_fraction: f64,
}

impl BudgetAllocator {
    pub fn new(total: ResourceBudget) -> Self {
        Self {
            state: Mutex::new(State {
                total,
                used: ResourceBudget::default(),
                grants: HashMap::new(),
            }),
            headroom_fraction: 0.1,
        }
    }

    fn fits(&self, state: &State, request: &ResourceBudget, priority: AdmissionPriority) -> bool {
        let headroom = if priority == AdmissionPriority::High {
            0.0
        } else {
            self.headroom_fraction
        };
        state.used.cores + request.cores <= state.total.cores * (1.0 - headroom)
            && state.used.memory_mb + request.memory_mb <= state.total.memory_mb * (1.0 - headroom)
            && state.used.storage_mb + request.storage_mb <= state.total.storage_mb * (1.0 - headroom)
            && state.used.bandwidth_mbps + request.bandwidth_mbps <= state.total.bandwidth_mbps * (1.0 - headroom)
    }
}

#[async_trait]
impl ResourceAllocator for BudgetAllocator {
    async fn reserve(
        &self,
        team_id: &TeamId,
        resources: ResourceBudget,
        priority: AdmissionPriority,
    ) -> OrchResult<AllocationHandle> {
        let mut state = self.state.lock();
        if !self.fits(&state, &resources, priority) {
            return Err(OrchError::resource_exhausted(format!(
                "insufficient capacity for team {team_id}: requested {resources:?}, used {:?} of {:?}",
                state.used, state.total
            )));
        }

        state.used.cores += resources.cores;
        state.used.memory_mb += resources.memory_mb;
        state.used.storage_mb += resources.storage_mb;
        state.used.bandwidth_mbps += resources.bandwidth_mbps;

        let id = uuid::Uuid::new_v4().to_string();
        state.grants.insert(id.clone(), resources);
        tracing::info!(team_id = %team_id, handle = %id, "resources reserved");
        Ok(AllocationHandle {
            id,
            team_id: team_id.clone(),
            resources,
        })
    }

    async fn release(&self, handle: &AllocationHandle) -> OrchResult<()> {
        let mut state = self.state.lock();
        let Some(resources) = state.grants.remove(&handle.id) else {
            return Ok(());
        };
        state.used.cores -= resources.cores;
        state.used.memory_mb -= resources.memory_mb;
        state.used.storage_mb -= resources.storage_mb;
        state.used.bandwidth_mbps -= resources.bandwidth_mbps;
        Ok(())
    }

    async fn available(&self) -> OrchResult<ResourceBudget> {
        let state = self.state.lock();
        Ok(ResourceBudget {
            cores: (state.total.cores - state.used.cores).max(0.0),
            memory_mb: (state.total.memory_mb - state.used.memory_mb).max(0.0),
            storage_mb: (state.total.storage_mb - state.used.storage_mb).max(0.0),
            bandwidth_mbps: (state.total.bandwidth_mbps - state.used.bandwidth_mbps).max(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(n: f64) -> ResourceBudget {
        ResourceBudget {
            cores: n,
            memory_mb: n * 100.0,
            storage_mb: n * 100.0,
            bandwidth_mbps: n * 10.0,
        }
    }

    #[tokio::test]
    async fn exhausted_budget_is_rejected() {
        let allocator = BudgetAllocator::new(budget(4.0));
        let team = TeamId::new();
        allocator.reserve(&team, budget(3.0), AdmissionPriority::Normal).await.unwrap();
        let err = allocator.reserve(&team, budget(3.0), AdmissionPriority::Normal).await.unwrap_err();
        assert_eq!(err.kind, orch_core::ErrorKind::ResourceExhausted);
    }

    #[tokio::test]
    async fn release_returns_capacity() {
        let allocator = BudgetAllocator::new(budget(4.0));
        let team = TeamId::new();
        let handle = allocator.reserve(&team, budget(3.0), AdmissionPriority::Normal).await.unwrap();
        allocator.release(&handle).await.unwrap();
        let available = allocator.available().await.unwrap();
        assert_eq!(available.cores, 4.0);
    }

    #[tokio::test]
    async fn high_priority_can_use_headroom_normal_cannot() {
        let allocator = BudgetAllocator::new(budget(10.0));
        let team = TeamId::new();
        // Use up to the 90% line reachable by NORMAL requests.
        allocator.reserve(&team, budget(9.0), AdmissionPriority::Normal).await.unwrap();
        assert!(allocator.reserve(&team, budget(0.5), AdmissionPriority::Normal).await.is_err());
        assert!(allocator.reserve(&team, budget(0.5), AdmissionPriority::High).await.is_ok());
    }
}
