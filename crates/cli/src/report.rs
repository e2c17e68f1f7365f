//! Rendering of migration outcomes
//!
//! One row per attempted migration, followed by the error lines captured
//! from failing migrations.

use clap::ValueEnum;
use console::style;
use serde::Serialize;
use sqlmig::{MigrationFailure, MigrationOutcome};

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    success: bool,
    attempted: usize,
    outcomes: &'a [MigrationOutcome],
}

/// True when any outcome failed; the process exit code follows this
pub fn has_failures(outcomes: &[MigrationOutcome]) -> bool {
    outcomes.iter().any(MigrationOutcome::is_failure)
}

pub fn render(outcomes: &[MigrationOutcome], format: ReportFormat) -> serde_json::Result<String> {
    match format {
        ReportFormat::Table => Ok(render_table(outcomes)),
        ReportFormat::Json => serde_json::to_string_pretty(&JsonReport {
            success: !has_failures(outcomes),
            attempted: outcomes.len(),
            outcomes,
        }),
    }
}

fn render_table(outcomes: &[MigrationOutcome]) -> String {
    if outcomes.is_empty() {
        return "Nothing to migrate, database is up to date.\n".to_string();
    }

    const HEADER: (&str, &str) = ("Migration", "Result");

    let width = outcomes
        .iter()
        .map(|o| o.migration().identifier().chars().count())
        .chain(std::iter::once(HEADER.0.len()))
        .max()
        .unwrap_or(HEADER.0.len());

    let mut out = String::new();
    out.push_str(&format!("{:<width$}  {}\n", HEADER.0, HEADER.1, width = width));
    out.push_str(&format!("{}  {}\n", "-".repeat(width), "-".repeat(HEADER.1.len())));

    for outcome in outcomes {
        let label = if outcome.is_failure() {
            style("FAILED").red().to_string()
        } else {
            style("OK").green().to_string()
        };
        out.push_str(&format!(
            "{:<width$}  {}\n",
            outcome.migration().identifier(),
            label,
            width = width
        ));
    }

    let diagnostics = error_lines(outcomes);
    if !diagnostics.is_empty() {
        out.push('\n');
        for line in diagnostics {
            out.push_str(&format!("{}\n", style(line).red()));
        }
    }

    out
}

/// Lines worth showing for failed migrations: captured client output that
/// mentions an error, or the failure itself when nothing was executed.
pub fn error_lines(outcomes: &[MigrationOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .flat_map(MigrationOutcome::errors)
        .flat_map(|failure| match failure {
            MigrationFailure::MissingTransactionControl { .. } => vec![failure.to_string()],
            MigrationFailure::MigrationCommandFailed { output, .. } => {
                let matching: Vec<String> = output
                    .iter()
                    .filter(|line| line.to_lowercase().contains("error"))
                    .cloned()
                    .collect();
                if matching.is_empty() {
                    vec![failure.to_string()]
                } else {
                    matching
                }
            }
        })
        .collect()
}
