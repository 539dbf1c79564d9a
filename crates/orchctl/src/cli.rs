use clap::{Parser, Subcommand};

use crate::commands;
use crate::session::{default_data_dir, OrchSession};

/// orchctl - kubectl-style control surface for the agent orchestration core.
#[derive(Parser, Debug)]
#[command(name = "orchctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding every component's snapshot (spec §6 layout).
    #[arg(long, global = true, env = "ORCHCTL_DATA_DIR")]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage teams: form, dissolve, list, describe.
    Team {
        #[command(subcommand)]
        command: commands::team::TeamCommands,
    },
    /// Manage documents: create, list versions, fetch.
    Doc {
        #[command(subcommand)]
        command: commands::doc::DocCommands,
    },
    /// Manage handoffs: create, accept, complete.
    Handoff {
        #[command(subcommand)]
        command: commands::handoff::HandoffCommands,
    },
    /// Evaluate and manage quality gates.
    Gate {
        #[command(subcommand)]
        command: commands::gate::GateCommands,
    },
    /// Manage the agent pool: initialize, inspect status.
    Pool {
        #[command(subcommand)]
        command: commands::pool::PoolCommands,
    },
    /// Generate shell completion scripts.
    Completion {
        #[arg(value_enum)]
        shell: commands::completion::Shell,
    },
    /// Show version information.
    Version,
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<()> {
        if matches!(self.command, Commands::Completion { .. } | Commands::Version) {
            return match self.command {
                Commands::Completion { shell } => commands::completion::execute(shell),
                Commands::Version => commands::version::execute(),
                _ => unreachable!(),
            };
        }

        let data_dir = self.data_dir.unwrap_or_else(|| default_data_dir().to_string_lossy().into_owned());
        let session = OrchSession::open(&data_dir).await?;

        let result = match self.command {
            Commands::Team { command } => commands::team::execute(&session, command).await,
            Commands::Doc { command } => commands::doc::execute(&session, command).await,
            Commands::Handoff { command } => commands::handoff::execute(&session, command).await,
            Commands::Gate { command } => commands::gate::execute(&session, command).await,
            Commands::Pool { command } => commands::pool::execute(&session, command).await,
            Commands::Completion { .. } | Commands::Version => unreachable!(),
        };

        // Persist regardless of outcome: a failed operation may still have
        // produced partial, valid state worth keeping (e.g. a queued
        // allocation request).
        session.persist().await?;
        result
    }
}
