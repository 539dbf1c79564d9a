//! `orchctl handoff ...` - C2 Handoff Protocol surface (spec §6).

use chrono::{DateTime, Utc};
use clap::Subcommand;
use orch_core::{DocumentId, ExpectedAction, Priority};

use crate::output;
use crate::session::OrchSession;

#[derive(Subcommand, Debug)]
pub enum HandoffCommands {
    /// Create a handoff (`handoff create <doc> --to <agent> --reason <r> [...]`).
    Create {
        doc: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "cli")]
        from: String,
        #[arg(long)]
        reason: String,
        #[arg(long, default_value = "")]
        instructions: String,
        #[arg(long, value_enum, default_value = "review")]
        action: CliExpectedAction,
        #[arg(long, value_enum, default_value = "medium")]
        priority: CliPriority,
        /// RFC 3339 deadline timestamp.
        #[arg(long)]
        deadline: Option<String>,
        #[arg(long)]
        validator: Option<String>,
    },
    /// Mark a handoff delivered.
    Deliver { id: String },
    /// Accept a delivered handoff.
    Accept { id: String },
    /// Reject a handoff.
    Reject {
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Complete an accepted handoff, optionally naming a result document.
    Complete {
        id: String,
        #[arg(long)]
        result_doc: Option<String>,
    },
    /// List overdue active handoffs.
    Overdue,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliExpectedAction {
    Review,
    Edit,
    Update,
    Approve,
    Complete,
    Modify,
}

impl From<CliExpectedAction> for ExpectedAction {
    fn from(a: CliExpectedAction) -> Self {
        match a {
            CliExpectedAction::Review => ExpectedAction::Review,
            CliExpectedAction::Edit => ExpectedAction::Edit,
            CliExpectedAction::Update => ExpectedAction::Update,
            CliExpectedAction::Approve => ExpectedAction::Approve,
            CliExpectedAction::Complete => ExpectedAction::Complete,
            CliExpectedAction::Modify => ExpectedAction::Modify,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl From<CliPriority> for Priority {
    fn from(p: CliPriority) -> Self {
        match p {
            CliPriority::Low => Priority::Low,
            CliPriority::Medium => Priority::Medium,
            CliPriority::High => Priority::High,
            CliPriority::Critical => Priority::Critical,
        }
    }
}

pub async fn execute(session: &OrchSession, command: HandoffCommands) -> anyhow::Result<()> {
    match command {
        HandoffCommands::Create {
            doc,
            to,
            from,
            reason,
            instructions,
            action,
            priority,
            deadline,
            validator,
        } => {
            let deadline: Option<DateTime<Utc>> = deadline
                .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
                .transpose()
                .map_err(|e| anyhow::anyhow!("invalid --deadline: {e}"))?;
            let doc_id: DocumentId = doc.into();
            let handoff = session
                .handoffs
                .create(
                    doc_id,
                    from,
                    to,
                    reason,
                    instructions,
                    action.into(),
                    priority.into(),
                    deadline,
                    validator,
                )
                .await?;
            output::print_success(format!("handoff created: {}", handoff.id));
            println!(
                "{}",
                output::kv_table(&[
                    ("id", handoff.id.to_string()),
                    ("to", handoff.to_agent.clone()),
                    ("status", format!("{:?}", handoff.status)),
                    ("priority", format!("{:?}", handoff.priority)),
                ])
            );
            Ok(())
        }
        HandoffCommands::Deliver { id } => {
            let h = session.handoffs.deliver(&id.into()).await?;
            output::print_success(format!("handoff {} delivered", h.id));
            Ok(())
        }
        HandoffCommands::Accept { id } => {
            let h = session.handoffs.accept(&id.into()).await?;
            output::print_success(format!("handoff {} accepted", h.id));
            Ok(())
        }
        HandoffCommands::Reject { id, reason } => {
            let h = session.handoffs.reject(&id.into(), reason).await?;
            output::print_success(format!("handoff {} rejected", h.id));
            Ok(())
        }
        HandoffCommands::Complete { id, result_doc } => {
            let result_id: Option<DocumentId> = result_doc.map(Into::into);
            let h = session.handoffs.complete(&id.into(), result_id).await?;
            output::print_success(format!("handoff {} -> {:?}", h.id, h.status));
            Ok(())
        }
        HandoffCommands::Overdue => {
            let overdue = session.handoffs.check_deadlines().await?;
            let rows = overdue
                .iter()
                .map(|h| {
                    vec![
                        h.id.to_string(),
                        h.to_agent.clone(),
                        format!("{:?}", h.status),
                        h.deadline.map(|d| d.to_rfc3339()).unwrap_or_default(),
                    ]
                })
                .collect();
            println!("{}", output::list_table(&["id", "to", "status", "deadline"], rows));
            Ok(())
        }
    }
}
