//! # sqlmig: ordered, exactly-once SQL migrations
//!
//! Applies numbered `.sql` scripts to a PostgreSQL database in ascending
//! order. Each script must be a single `begin; ... commit;` transaction; the
//! runner appends the ledger insert inside that transaction so a migration
//! and its record commit together. A run stops at the first failing script
//! and the next run resumes from it.

pub mod config;
pub mod error;
pub mod migrations;

pub use config::{ConfigError, DatabaseConfig, LedgerTable, MigrationConfig};
pub use error::{MigrationFailure, SqlMigError, SqlMigResult};
pub use migrations::*;

/// Runner wired to PostgreSQL and `psql`
pub type PgMigrationRunner = MigrationRunner<PgLedger, PsqlExecutor>;

/// Build a [`PgMigrationRunner`] from validated configuration
pub async fn connect(
    database: &DatabaseConfig,
    config: &MigrationConfig,
) -> SqlMigResult<PgMigrationRunner> {
    config.validate()?;

    let ledger = PgLedger::connect(database, config.ledger.clone()).await?;
    let executor = PsqlExecutor::new(config.psql_path.clone(), database.clone())
        .with_timeout(config.command_timeout);

    Ok(MigrationRunner::new(
        MigrationManager::new(&config.migrations_dir),
        ledger,
        executor,
        config.ledger.clone(),
    ))
}
