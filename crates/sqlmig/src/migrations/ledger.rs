//! Version ledger - the persisted record of applied migrations
//!
//! Rows are written by the rewritten migration scripts themselves (see
//! [`super::envelope`]); this module only creates the storage and reads the
//! latest entry back.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::definitions::{AppliedRecord, Migration};
use crate::config::{DatabaseConfig, LedgerTable};
use crate::error::{SqlMigError, SqlMigResult};

/// Read access to the version ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Create the ledger namespace and table when missing
    async fn ensure_storage_exists(&self) -> SqlMigResult<()>;

    /// Most recently applied migration, `None` for an empty ledger
    async fn find_latest(&self) -> SqlMigResult<Option<Migration>>;
}

/// PostgreSQL-backed ledger
pub struct PgLedger {
    pool: PgPool,
    table: LedgerTable,
}

impl PgLedger {
    /// Create a ledger over an existing pool
    pub fn new(pool: PgPool, table: LedgerTable) -> Self {
        Self { pool, table }
    }

    /// Open a single-connection pool for the duration of one run
    pub async fn connect(database: &DatabaseConfig, table: LedgerTable) -> SqlMigResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(database.connect_options())
            .await
            .map_err(SqlMigError::ledger("connect"))?;

        tracing::debug!(
            "Ledger connection established to {}:{}/{}",
            database.host,
            database.port,
            database.database
        );
        Ok(Self::new(pool, table))
    }

    /// Get the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the ledger table location
    pub fn table(&self) -> &LedgerTable {
        &self.table
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn ensure_storage_exists(&self) -> SqlMigResult<()> {
        sqlx::query(&create_schema_sql(&self.table))
            .execute(&self.pool)
            .await
            .map_err(SqlMigError::ledger("create schema"))?;

        sqlx::query(&create_table_sql(&self.table))
            .execute(&self.pool)
            .await
            .map_err(SqlMigError::ledger("create table"))?;

        Ok(())
    }

    async fn find_latest(&self) -> SqlMigResult<Option<Migration>> {
        let row = sqlx::query(&latest_sql(&self.table))
            .fetch_optional(&self.pool)
            .await
            .map_err(SqlMigError::ledger("query latest migration"))?;

        row.map(|row| migration_from_row(&row))
            .transpose()
            .map_err(SqlMigError::ledger("decode latest migration"))
    }
}

fn migration_from_row(row: &PgRow) -> Result<Migration, sqlx::Error> {
    Ok(Migration::from_ledger(
        row.try_get("version")?,
        row.try_get::<String, _>("migration_script")?,
        row.try_get::<String, _>("migration_content")?,
        AppliedRecord {
            ledger_id: row.try_get("id")?,
            applied_at: row.try_get("created_at")?,
        },
    ))
}

/// SQL to create the ledger namespace
pub fn create_schema_sql(table: &LedgerTable) -> String {
    format!("create schema if not exists {}", table.quoted_schema())
}

/// SQL to create the ledger table
pub fn create_table_sql(table: &LedgerTable) -> String {
    format!(
        "create table if not exists {} (\n    \
            id                bigint generated always as identity,\n    \
            created_at        timestamp with time zone not null default now(),\n    \
            version           bigint not null,\n    \
            migration_script  text not null,\n    \
            migration_content text not null,\n    \
            primary key (id),\n    \
            unique (version)\n\
        )",
        table.qualified()
    )
}

/// SQL to read the most recently applied migration
pub fn latest_sql(table: &LedgerTable) -> String {
    format!(
        "select id::bigint as id, created_at, version::bigint as version, \
         migration_script, migration_content \
         from {} order by created_at desc, version desc limit 1",
        table.qualified()
    )
}
