//! `orchctl pool ...` - C3 Agent Pool surface (spec §6).

use clap::Subcommand;

use crate::output;
use crate::session::OrchSession;

#[derive(Subcommand, Debug)]
pub enum PoolCommands {
    /// Populate the pool with `size` fresh agents.
    Init {
        #[arg(long, default_value_t = 10)]
        size: usize,
    },
    /// Show current pool status (available/allocated/busy/maintenance counts).
    Status,
}

pub async fn execute(session: &OrchSession, command: PoolCommands) -> anyhow::Result<()> {
    match command {
        PoolCommands::Init { size } => {
            session.pool.initialize(size).await?;
            output::print_success(format!("pool initialized with {size} agents"));
            Ok(())
        }
        PoolCommands::Status => {
            let status = session.pool.status().await;
            println!(
                "{}",
                output::kv_table(&[
                    ("total", status.total.to_string()),
                    ("available", status.available.to_string()),
                    ("allocated", status.allocated.to_string()),
                    ("busy", status.busy.to_string()),
                    ("maintenance", status.maintenance.to_string()),
                    ("error", status.error.to_string()),
                    ("queue_length", status.queue_length.to_string()),
                ])
            );
            Ok(())
        }
    }
}
