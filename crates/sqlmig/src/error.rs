//! Error types for the migration runner
//!
//! Two layers: [`SqlMigError`] aborts a whole run (nothing to report per
//! migration), while [`MigrationFailure`] is captured into a single
//! migration's outcome and never propagates past the runner.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::ConfigError;

/// Result type alias for whole-run operations
pub type SqlMigResult<T> = Result<T, SqlMigError>;

/// Errors that abort a migration run
#[derive(Debug, thiserror::Error)]
pub enum SqlMigError {
    #[error("Failed to read migrations from {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write migration file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration file '{file}' does not start with a numeric ordinal")]
    InvalidOrdinal { file: String },

    #[error("Migrations '{first}' and '{second}' share ordinal {ordinal}")]
    DuplicateOrdinal {
        ordinal: i64,
        first: String,
        second: String,
    },

    #[error("Ledger unavailable ({context}): {source}")]
    LedgerUnavailable {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SqlMigError {
    pub(crate) fn ledger(context: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| SqlMigError::LedgerUnavailable { context, source }
    }
}

/// Failure attributed to a single migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationFailure {
    #[error("Migration script {migration} is missing transaction control")]
    MissingTransactionControl { migration: String },

    #[error("Migration script {migration} failed to execute{}", exit_suffix(.exit_code))]
    MigrationCommandFailed {
        migration: String,
        exit_code: Option<i32>,
        output: Vec<String>,
    },
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {})", code),
        None => String::new(),
    }
}

impl MigrationFailure {
    /// Identifier of the migration this failure belongs to
    pub fn migration(&self) -> &str {
        match self {
            MigrationFailure::MissingTransactionControl { migration }
            | MigrationFailure::MigrationCommandFailed { migration, .. } => migration,
        }
    }

    /// Captured output of the database client, empty when nothing ran
    pub fn output(&self) -> &[String] {
        match self {
            MigrationFailure::MissingTransactionControl { .. } => &[],
            MigrationFailure::MigrationCommandFailed { output, .. } => output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_messages() {
        let missing = MigrationFailure::MissingTransactionControl {
            migration: "0003_users.sql".to_string(),
        };
        assert_eq!(
            missing.to_string(),
            "Migration script 0003_users.sql is missing transaction control"
        );
        assert!(missing.output().is_empty());

        let failed = MigrationFailure::MigrationCommandFailed {
            migration: "0004_orders.sql".to_string(),
            exit_code: Some(3),
            output: vec!["ERROR:  relation \"orders\" already exists".to_string()],
        };
        assert_eq!(
            failed.to_string(),
            "Migration script 0004_orders.sql failed to execute (exit code 3)"
        );
        assert_eq!(failed.migration(), "0004_orders.sql");
        assert_eq!(failed.output().len(), 1);
    }

    #[test]
    fn test_failure_serializes_with_kind_tag() {
        let failed = MigrationFailure::MigrationCommandFailed {
            migration: "0001_init.sql".to_string(),
            exit_code: None,
            output: vec![],
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["kind"], "migration_command_failed");
        assert_eq!(json["migration"], "0001_init.sql");
    }
}
