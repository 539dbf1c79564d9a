//! Core types shared by every component of the orchestration runtime.
//!
//! This crate is intentionally inert: it holds data and interfaces, never
//! background tasks or I/O. The stateful engines live in `orch-registry`,
//! `orch-pool`, `orch-teams`, `orch-workflow`, `orch-quality` and
//! `orch-monitor`; they all depend on the types defined here.

pub mod agent;
pub mod control;
pub mod document;
pub mod error;
pub mod handoff;
pub mod ids;
pub mod metrics;
pub mod quality;
pub mod team;
pub mod workflow;

pub use agent::{Agent, AgentState, AllocationRequest};
pub use control::{
    AdmissionPriority, AllocationHandle, AllowAllPolicyGate, PendingDecision, PolicyGate,
    PolicyVerdict, ResourceAllocator, UnboundedAllocator,
};
pub use document::{content_hash, AccessLevel, Document, DocumentStatus, DocumentType};
pub use error::{ErrorKind, OrchError, OrchResult};
pub use handoff::{ExpectedAction, Handoff, HandoffNotification, HandoffStatus, Priority};
pub use ids::{
    AgentId, DocumentId, GateId, HandoffId, ReportId, TeamId, WorkflowId, WorkflowInstanceId,
};
pub use metrics::{
    Confidence, MetricSample, MetricType, SprintVelocitySample, TaskPerformanceSample,
    TrendDirection, VelocityPrediction,
};
pub use quality::{
    GateCriterion, GateDecision, GateKind, GateReport, GateThresholds, IssueCategory,
    MetricsSnapshot, QualityGate, QualityIssue, Severity, Waiver,
};
pub use team::{
    ResourceBudget, Team, TeamFormationRequest, TeamMember, TeamMetrics, TeamRecommendation,
    TeamRole, TeamState, TeamType,
};
pub use workflow::{
    StepStatus, WorkflowDefinition, WorkflowInstance, WorkflowStatus, WorkflowStep,
};

/// Snapshot-and-rename helper shared by every component's persistence layer.
pub mod snapshot {
    use crate::error::{OrchError, OrchResult};
    use serde::{de::DeserializeOwned, Serialize};
    use std::path::Path;

    /// Atomically write `value` as pretty JSON to `path`: write to a sibling
    /// `.tmp` file first, then rename over the destination. A crash or
    /// concurrent reader never observes a partially written snapshot.
    pub async fn save<T: Serialize + Sync>(path: impl AsRef<Path>, value: &T) -> OrchResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| OrchError::fatal(format!("snapshot encode failed: {e}")))?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> OrchResult<Option<T>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| OrchError::fatal(format!("snapshot decode failed: {e}")))?;
        Ok(Some(value))
    }
}

/// Crate version, surfaced by the CLI's `version` command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
