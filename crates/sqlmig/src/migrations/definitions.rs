//! Migration Definitions - Core types shared by discovery, ledger and runner
//!
//! A [`Migration`] is built either from a script on disk or from a ledger
//! row, never mutated afterwards. A [`MigrationOutcome`] records what
//! happened when the runner attempted one migration.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::MigrationFailure;

/// Ledger metadata of an applied migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedRecord {
    /// Surrogate key assigned by the ledger
    pub ledger_id: i64,
    /// When the ledger row was written
    pub applied_at: DateTime<Utc>,
}

/// A single versioned migration script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Migration {
    ordinal: i64,
    identifier: String,
    #[serde(skip)]
    script: String,
    applied: Option<AppliedRecord>,
}

impl Migration {
    /// Migration discovered on disk, not yet applied
    pub fn from_script(
        ordinal: i64,
        identifier: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            ordinal,
            identifier: identifier.into(),
            script: script.into(),
            applied: None,
        }
    }

    /// Migration read back from the ledger
    pub fn from_ledger(
        ordinal: i64,
        identifier: impl Into<String>,
        script: impl Into<String>,
        applied: AppliedRecord,
    ) -> Self {
        Self {
            ordinal,
            identifier: identifier.into(),
            script: script.into(),
            applied: Some(applied),
        }
    }

    /// Numeric position taken from the file name
    pub fn ordinal(&self) -> i64 {
        self.ordinal
    }

    /// File name the migration was discovered under
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Raw, unmodified script text
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Ledger metadata, present only for migrations read from the ledger
    pub fn applied(&self) -> Option<&AppliedRecord> {
        self.applied.as_ref()
    }

    /// Get the time the ledger row was written
    pub fn applied_at(&self) -> Option<DateTime<Utc>> {
        self.applied.as_ref().map(|record| record.applied_at)
    }

    /// Get the ledger surrogate key
    pub fn ledger_id(&self) -> Option<i64> {
        self.applied.as_ref().map(|record| record.ledger_id)
    }
}

/// Whether a migration attempt succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Result of attempting to apply one migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    status: OutcomeStatus,
    migration: Migration,
    errors: Vec<MigrationFailure>,
}

impl MigrationOutcome {
    /// Outcome of a migration that committed
    pub fn success(migration: Migration) -> Self {
        Self {
            status: OutcomeStatus::Success,
            migration,
            errors: Vec::new(),
        }
    }

    /// Outcome of a migration that did not commit
    pub fn failure(migration: Migration, error: MigrationFailure) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            migration,
            errors: vec![error],
        }
    }

    /// Get the outcome status
    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    /// Whether the attempt failed
    pub fn is_failure(&self) -> bool {
        self.status == OutcomeStatus::Failure
    }

    /// Get the attempted migration
    pub fn migration(&self) -> &Migration {
        &self.migration
    }

    /// Get the failures recorded for this attempt
    pub fn errors(&self) -> &[MigrationFailure] {
        &self.errors
    }
}
