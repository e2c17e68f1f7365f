//! Migration System
//!
//! Discovery, envelope rewriting, the version ledger and the runner that
//! ties them together.

pub mod definitions;
pub mod envelope;
pub mod executor;
pub mod ledger;
pub mod manager;
pub mod runner;

pub use definitions::{AppliedRecord, Migration, MigrationOutcome, OutcomeStatus};
pub use executor::{PsqlExecutor, ScriptExecutor, ScriptOutput};
pub use ledger::{Ledger, PgLedger};
pub use manager::MigrationManager;
pub use runner::MigrationRunner;
