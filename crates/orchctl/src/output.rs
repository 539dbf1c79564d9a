//! Terminal output helpers: colored status lines, tables, and the
//! `OrchError` -> process exit code mapping (spec §6).

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use orch_core::{ErrorKind, OrchError};

/// Maps an error's stable `kind` to the CLI exit code spec'd in §6.
pub fn exit_code_for(err: &OrchError) -> i32 {
    match err.kind {
        ErrorKind::InvalidArgument => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::PolicyDenied => 4,
        ErrorKind::ResourceExhausted => 5,
        ErrorKind::PermissionDenied
        | ErrorKind::PreconditionFailed
        | ErrorKind::Timeout
        | ErrorKind::ValidationFailed
        | ErrorKind::Fatal => 1,
    }
}

pub fn print_error(err: &OrchError) {
    eprintln!("{} {:?}: {}", "error:".red().bold(), err.kind, err.message);
}

pub fn print_success(message: impl AsRef<str>) {
    println!("{} {}", "\u{2713}".green().bold(), message.as_ref());
}

pub fn print_info(message: impl AsRef<str>) {
    println!("{} {}", "\u{2139}".cyan(), message.as_ref());
}

/// A single-row key/value table, used by the `describe`-style detail views.
pub fn kv_table(rows: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("field").fg(Color::Cyan),
            Cell::new("value").fg(Color::Cyan),
        ]);
    for (k, v) in rows {
        table.add_row(vec![(*k).to_string(), v.clone()]);
    }
    table
}

pub fn list_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(*h).fg(Color::Cyan)));
    for row in rows {
        table.add_row(row);
    }
    table
}

/// Render a value as JSON or YAML depending on `--output`.
pub fn render(value: &impl serde::Serialize, format: &str) -> anyhow::Result<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(value)?),
        "yaml" => Ok(serde_yaml::to_string(value)?),
        other => anyhow::bail!("unsupported output format '{other}' (use json|yaml)"),
    }
}
