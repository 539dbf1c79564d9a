//! `orchctl team ...` - C4 Team Orchestrator surface (spec §6).

use clap::Subcommand;
use orch_core::{TeamFormationRequest, TeamType};

use crate::output;
use crate::session::OrchSession;

#[derive(Subcommand, Debug)]
pub enum TeamCommands {
    /// Form a new team (`team form --mission <m> --size <n> --skills <s,...>`).
    Form {
        #[arg(long)]
        mission: String,
        #[arg(long, default_value_t = 4)]
        size: usize,
        #[arg(long, value_delimiter = ',')]
        skills: Vec<String>,
        #[arg(long, value_enum, default_value = "cross-functional")]
        team_type: CliTeamType,
        #[arg(long, default_value_t = 2)]
        min_size: usize,
        #[arg(long, default_value_t = 10)]
        max_size: usize,
    },
    /// Dissolve a team (`team dissolve <id> [--reason <r>]`).
    Dissolve {
        id: String,
        #[arg(long, default_value = "requested")]
        reason: String,
    },
    /// List all known teams.
    List {
        #[arg(short, long, default_value = "text")]
        output: String,
    },
    /// Show advisory recommendations for a team's current state.
    Recommend { id: String },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliTeamType {
    CrossFunctional,
    SelfManaging,
    FlowToWork,
    Squad,
    TaskForce,
}

impl From<CliTeamType> for TeamType {
    fn from(t: CliTeamType) -> Self {
        match t {
            CliTeamType::CrossFunctional => TeamType::CrossFunctional,
            CliTeamType::SelfManaging => TeamType::SelfManaging,
            CliTeamType::FlowToWork => TeamType::FlowToWork,
            CliTeamType::Squad => TeamType::Squad,
            CliTeamType::TaskForce => TeamType::TaskForce,
        }
    }
}

pub async fn execute(session: &OrchSession, command: TeamCommands) -> anyhow::Result<()> {
    match command {
        TeamCommands::Form {
            mission,
            size,
            skills,
            team_type,
            min_size,
            max_size,
        } => {
            let request = TeamFormationRequest {
                team_type: team_type.into(),
                mission,
                min_size,
                max_size,
                size,
                required_skills: skills,
            };
            let team = session.teams.form_team(request).await?;
            output::print_success(format!("team formed: {}", team.id));
            println!(
                "{}",
                output::kv_table(&[
                    ("id", team.id.to_string()),
                    ("mission", team.mission.clone()),
                    ("state", format!("{:?}", team.state)),
                    ("members", team.size().to_string()),
                ])
            );
            Ok(())
        }
        TeamCommands::Dissolve { id, reason } => {
            session.teams.dissolve_team(&id.into(), reason).await?;
            output::print_success("team dissolved");
            Ok(())
        }
        TeamCommands::List { output: fmt } => {
            let teams = session.teams.list_teams().await;
            if fmt == "text" {
                let rows = teams
                    .iter()
                    .map(|t| {
                        vec![
                            t.id.to_string(),
                            format!("{:?}", t.team_type),
                            format!("{:?}", t.state),
                            t.size().to_string(),
                            format!("{:.2}", t.metrics.velocity),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    output::list_table(&["id", "type", "state", "members", "velocity"], rows)
                );
            } else {
                println!("{}", output::render(&teams, &fmt)?);
            }
            Ok(())
        }
        TeamCommands::Recommend { id } => {
            let recs = session.teams.recommendations(&id.into()).await?;
            for rec in recs {
                println!("- [{}] {}", rec.action, rec.reason);
            }
            Ok(())
        }
    }
}
