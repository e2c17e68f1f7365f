use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use sqlmig::{config::parse_timeout, DatabaseConfig, MigrationConfig, MigrationManager};

use crate::report::{self, ReportFormat};

/// Settings shared by every migration command
#[derive(Debug, Args)]
pub struct MigrationArgs {
    /// Directory containing the numbered .sql scripts
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub migrations: MigrationArgs,

    /// Database URL (defaults to DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// psql binary used to execute scripts
    #[arg(long)]
    pub psql: Option<String>,

    /// Seconds a single script may run before it counts as failed
    #[arg(long)]
    pub timeout: Option<String>,

    /// Schema holding the version ledger
    #[arg(long)]
    pub ledger_schema: Option<String>,

    /// Version ledger table name
    #[arg(long)]
    pub ledger_table: Option<String>,

    /// Report format
    #[arg(long, value_enum, default_value = "table")]
    pub format: ReportFormat,
}

fn migration_config(args: &MigrationArgs) -> anyhow::Result<MigrationConfig> {
    let mut config = MigrationConfig::from_env().context("Invalid SQLMIG_* configuration")?;
    if let Some(dir) = &args.dir {
        config.migrations_dir = dir.clone();
    }
    Ok(config)
}

/// Apply pending migrations. Returns whether every attempted migration succeeded.
pub async fn apply(args: ApplyArgs) -> anyhow::Result<bool> {
    let mut config = migration_config(&args.migrations)?;
    if let Some(psql) = args.psql {
        config.psql_path = psql;
    }
    if let Some(timeout) = args.timeout.as_deref() {
        config.command_timeout = Some(parse_timeout(timeout)?);
    }
    if let Some(schema) = args.ledger_schema {
        config.ledger.schema = schema;
    }
    if let Some(table) = args.ledger_table {
        config.ledger.table = table;
    }

    let database = match args.database_url.as_deref() {
        Some(url) => DatabaseConfig::from_url(url)?,
        None => DatabaseConfig::from_env()?,
    };

    tracing::info!(
        "Applying migrations from {} to {}:{}/{}",
        config.migrations_dir.display(),
        database.host,
        database.port,
        database.database
    );

    let runner = sqlmig::connect(&database, &config)
        .await
        .context("Failed to prepare migration runner")?;
    let outcomes = runner
        .run_migrations()
        .await
        .context("Migration run aborted")?;

    print!("{}", report::render(&outcomes, args.format)?);

    Ok(!report::has_failures(&outcomes))
}

/// Create a new, empty migration script
pub fn create(name: &str, args: &MigrationArgs) -> anyhow::Result<()> {
    let config = migration_config(args)?;
    let manager = MigrationManager::new(config.migrations_dir);

    let path = manager
        .create_migration(name)
        .context("Failed to create migration")?;

    println!("Created migration: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_writes_enveloped_script() {
        let dir = TempDir::new().unwrap();
        let args = MigrationArgs {
            dir: Some(dir.path().join("migrations")),
        };

        create("add users", &args).unwrap();
        create("add orders", &args).unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path().join("migrations"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["0001_add_users.sql", "0002_add_orders.sql"]);
    }
}
