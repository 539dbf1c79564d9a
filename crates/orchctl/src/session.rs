//! Wires the nine stateful engines together behind one `OrchSession`,
//! replacing the source's `get_document_registry()`/`get_handoff_protocol()`
//! module singletons with explicit construction (spec §9, "Global
//! singletons"): the process owns one instance of each component and
//! passes it down to the CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use orch_control::BudgetAllocator;
use orch_core::{OrchResult, ResourceBudget};
use orch_pool::{AgentPool, PoolConfig};
use orch_quality::QualityGateEngine;
use orch_registry::{DocumentRegistry, HandoffProtocol};
use orch_teams::{OrchestratorConfig, TeamOrchestrator};

/// Every engine's snapshot path, relative to the session's data directory,
/// mirroring the layout in spec §6.
pub struct OrchSession {
    pub data_dir: PathBuf,
    pub registry: Arc<DocumentRegistry>,
    pub handoffs: Arc<HandoffProtocol>,
    pub pool: Arc<AgentPool>,
    pub teams: Arc<TeamOrchestrator>,
    pub gates: Arc<QualityGateEngine>,
}

impl OrchSession {
    pub async fn open(data_dir: impl Into<PathBuf>) -> OrchResult<Self> {
        let data_dir = data_dir.into();

        let registry = Arc::new(DocumentRegistry::open(data_dir.join("documents/registry.blob")).await?);
        let handoffs = Arc::new(
            HandoffProtocol::open(data_dir.join("handoffs/handoffs.blob"), registry.clone()).await?,
        );

        let pool_allocator: Arc<dyn orch_core::ResourceAllocator> =
            Arc::new(BudgetAllocator::new(ResourceBudget {
                cores: 64.0,
                memory_mb: 131_072.0,
                storage_mb: 1_048_576.0,
                bandwidth_mbps: 10_000.0,
            }));
        let pool = Arc::new(
            AgentPool::open(
                data_dir.join("agent_pool/state.json"),
                PoolConfig::default(),
                pool_allocator,
            )
            .await?,
        );

        let team_allocator: Arc<dyn orch_core::ResourceAllocator> =
            Arc::new(BudgetAllocator::new(ResourceBudget {
                cores: 256.0,
                memory_mb: 1_048_576.0,
                storage_mb: 4_194_304.0,
                bandwidth_mbps: 40_000.0,
            }));
        let policy: Arc<dyn orch_core::PolicyGate> = Arc::new(orch_core::AllowAllPolicyGate);
        let mut team_config = OrchestratorConfig::default();
        team_config.archive_dir = data_dir.join("teams/archive");
        let teams = Arc::new(TeamOrchestrator::new(
            pool.clone(),
            team_allocator,
            policy,
            team_config,
        ));
        let teams_snapshot_path = data_dir.join("teams/teams.blob");
        if let Some(saved) = orch_core::snapshot::load::<Vec<orch_core::Team>>(&teams_snapshot_path).await? {
            teams.restore(saved).await;
        }

        let gates = Arc::new(QualityGateEngine::open(data_dir.join("quality/gates.blob")).await?);

        Ok(Self {
            data_dir,
            registry,
            handoffs,
            pool,
            teams,
            gates,
        })
    }

    pub async fn persist(&self) -> OrchResult<()> {
        self.registry.persist().await?;
        self.handoffs.persist().await?;
        self.pool.persist().await?;
        self.gates.persist().await?;
        let teams = self.teams.list_teams().await;
        orch_core::snapshot::save(self.data_dir.join("teams/teams.blob"), &teams).await?;
        Ok(())
    }
}

/// Default data directory: `$ORCHCTL_DATA_DIR`, the platform's local-data
/// directory joined with `orchctl`, or `./.orch` if neither resolves.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ORCHCTL_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_local_dir()
        .map(|d| d.join("orchctl"))
        .unwrap_or_else(|| Path::new(".orch").to_path_buf())
}
