//! `orchctl gate ...` - C7 Quality Gate surface (spec §6).

use clap::Subcommand;
use orch_core::{GateCriterion, GateId, GateKind, GateThresholds, QualityGate};
use orch_quality::ChecklistItem;

use crate::output;
use crate::session::OrchSession;

#[derive(Subcommand, Debug)]
pub enum GateCommands {
    /// Register a named gate with a threshold preset.
    Register {
        name: String,
        #[arg(long, value_enum, default_value = "story")]
        kind: CliGateKind,
        #[arg(long, value_enum, default_value = "default")]
        preset: CliPreset,
        /// Criterion predicate ids, evaluated in the order given.
        #[arg(long, value_delimiter = ',')]
        criteria: Vec<String>,
    },
    /// Evaluate a gate (`gate evaluate <gate-name> --target <id>`).
    Evaluate {
        gate_name: String,
        #[arg(long)]
        target: String,
        /// Path to a JSON array of `{id, title, passed, justification?}`.
        #[arg(long)]
        checklist: Option<String>,
    },
    /// Waive a report's decision.
    Waive {
        target: String,
        report_id: String,
        #[arg(long)]
        reason: String,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    List,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliGateKind {
    Story,
    Sprint,
    Release,
    Custom,
}

impl From<CliGateKind> for GateKind {
    fn from(k: CliGateKind) -> Self {
        match k {
            CliGateKind::Story => GateKind::Story,
            CliGateKind::Sprint => GateKind::Sprint,
            CliGateKind::Release => GateKind::Release,
            CliGateKind::Custom => GateKind::Custom,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliPreset {
    Looser,
    Default,
    Stricter,
}

impl From<CliPreset> for GateThresholds {
    fn from(p: CliPreset) -> Self {
        match p {
            CliPreset::Looser => GateThresholds::looser_preset(),
            CliPreset::Default => GateThresholds::default_preset(),
            CliPreset::Stricter => GateThresholds::stricter_preset(),
        }
    }
}

pub async fn execute(session: &OrchSession, command: GateCommands) -> anyhow::Result<()> {
    match command {
        GateCommands::Register {
            name,
            kind,
            preset,
            criteria,
        } => {
            let gate = QualityGate {
                id: GateId::new(),
                name: name.clone(),
                kind: kind.into(),
                thresholds: preset.into(),
                criteria: criteria
                    .into_iter()
                    .map(|predicate_id| GateCriterion {
                        predicate_id,
                        required: true,
                    })
                    .collect(),
            };
            session.gates.register_gate(gate).await?;
            output::print_success(format!("gate '{name}' registered"));
            Ok(())
        }
        GateCommands::Evaluate {
            gate_name,
            target,
            checklist,
        } => {
            let gate = session.gates.gate_by_name(&gate_name).await?;
            let items: Vec<ChecklistItem> = match checklist {
                Some(path) => {
                    let bytes = std::fs::read(&path)
                        .map_err(|e| anyhow::anyhow!("failed to read checklist {path}: {e}"))?;
                    serde_json::from_slice(&bytes)?
                }
                None => Vec::new(),
            };
            let report = session.gates.evaluate(&gate.id, target, items, Vec::new()).await?;
            println!(
                "{}",
                output::kv_table(&[
                    ("gate", report.gate_name.clone()),
                    ("target", report.target.clone()),
                    ("decision", format!("{:?}", report.decision)),
                    ("overall_score", format!("{:.1}", report.metrics.overall_score)),
                    ("coverage", format!("{:.2}", report.metrics.coverage)),
                    ("issues", report.issues.len().to_string()),
                ])
            );
            for rec in &report.recommendations {
                println!("  - {rec}");
            }
            Ok(())
        }
        GateCommands::Waive {
            target,
            report_id,
            reason,
            actor,
        } => {
            let report = session
                .gates
                .waive(&target, &report_id.into(), reason, actor)
                .await?;
            output::print_success(format!("report {} waived", report.id));
            Ok(())
        }
        GateCommands::List => {
            let gates = session.gates.list_gates().await;
            let rows = gates
                .iter()
                .map(|g| vec![g.id.to_string(), g.name.clone(), format!("{:?}", g.kind)])
                .collect();
            println!("{}", output::list_table(&["id", "name", "kind"], rows));
            Ok(())
        }
    }
}
