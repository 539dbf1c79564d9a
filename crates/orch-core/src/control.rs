//! Control Plane abstractions (C9): resource admission and policy gating.
//!
//! These are interfaces, not implementations — the core depends on them
//! by construction and ships a no-op default so every other component can
//! be exercised without a real control plane wired in.

use crate::error::OrchResult;
use crate::ids::TeamId;
use crate::team::ResourceBudget;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPriority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationHandle {
    pub id: String,
    pub team_id: TeamId,
    pub resources: ResourceBudget,
}

/// Linearizable resource admission consumed by C3, C4 and C6.
///
/// Partial failure is not supported: `reserve` either grants the full
/// request or fails with `ErrorKind::ResourceExhausted`.
#[async_trait]
pub trait ResourceAllocator: Send + Sync {
    async fn reserve(
        &self,
        team_id: &TeamId,
        resources: ResourceBudget,
        priority: AdmissionPriority,
    ) -> OrchResult<AllocationHandle>;

    async fn release(&self, handle: &AllocationHandle) -> OrchResult<()>;

    async fn available(&self) -> OrchResult<ResourceBudget>;
}

/// A decision that has not yet been classified; policy gates inspect the
/// action name and associated metadata, not a fixed taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDecision {
    pub action: String,
    pub actor: String,
    pub context: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub approved: bool,
    pub reasons: Vec<String>,
}

impl PolicyVerdict {
    pub fn allow() -> Self {
        Self {
            approved: true,
            reasons: Vec::new(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reasons: vec![reason.into()],
        }
    }
}

/// Ethics/policy gate called before team formation, sensitive handoffs,
/// and resource escalations.
#[async_trait]
pub trait PolicyGate: Send + Sync {
    async fn validate(&self, decision: &PendingDecision) -> OrchResult<PolicyVerdict>;
}

/// Default no-op resource allocator: treats the pool as effectively
/// unbounded and never denies a reservation.
pub struct UnboundedAllocator;

#[async_trait]
impl ResourceAllocator for UnboundedAllocator {
    async fn reserve(
        &self,
        team_id: &TeamId,
        resources: ResourceBudget,
        _priority: AdmissionPriority,
    ) -> OrchResult<AllocationHandle> {
        Ok(AllocationHandle {
            id: uuid::Uuid::new_v4().to_string(),
            team_id: team_id.clone(),
            resources,
        })
    }

    async fn release(&self, _handle: &AllocationHandle) -> OrchResult<()> {
        Ok(())
    }

    async fn available(&self) -> OrchResult<ResourceBudget> {
        Ok(ResourceBudget {
            cores: f64::MAX,
            memory_mb: f64::MAX,
            storage_mb: f64::MAX,
            bandwidth_mbps: f64::MAX,
        })
    }
}

/// Default no-op policy gate: approves everything. Real deployments
/// inject a gate backed by whatever ethics/compliance rule set applies.
pub struct AllowAllPolicyGate;

#[async_trait]
impl PolicyGate for AllowAllPolicyGate {
    async fn validate(&self, _decision: &PendingDecision) -> OrchResult<PolicyVerdict> {
        Ok(PolicyVerdict::allow())
    }
}
