//! Migration Runner - Applies pending migrations in order
//!
//! A run prepares the ledger, resolves the pending set against the latest
//! ledger entry, then applies each pending migration until the first
//! failure. Per-migration failures end up in the returned outcomes; only
//! discovery and ledger errors abort the run.

use super::definitions::{Migration, MigrationOutcome};
use super::envelope;
use super::executor::ScriptExecutor;
use super::ledger::Ledger;
use super::manager::MigrationManager;
use crate::config::LedgerTable;
use crate::error::{MigrationFailure, SqlMigResult};

/// Migration runner that executes migrations against a database
pub struct MigrationRunner<L, E> {
    manager: MigrationManager,
    ledger: L,
    executor: E,
    table: LedgerTable,
}

impl<L, E> MigrationRunner<L, E>
where
    L: Ledger,
    E: ScriptExecutor,
{
    /// Create a runner from its discovery, ledger and execution parts
    pub fn new(manager: MigrationManager, ledger: L, executor: E, table: LedgerTable) -> Self {
        Self {
            manager,
            ledger,
            executor,
            table,
        }
    }

    /// Get the migration manager
    pub fn manager(&self) -> &MigrationManager {
        &self.manager
    }

    /// Get the ledger
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Get the script executor
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Discovered migrations newer than the ledger's latest entry, ascending
    pub async fn pending_migrations(&self) -> SqlMigResult<Vec<Migration>> {
        let latest = self.ledger.find_latest().await?;
        let discovered = self.manager.load_migrations()?;

        let pending = select_pending(discovered, latest.as_ref().map(Migration::ordinal));

        match &latest {
            Some(latest) => tracing::info!(
                "Latest applied migration is {} ({}), {} pending",
                latest.ordinal(),
                latest.identifier(),
                pending.len()
            ),
            None => tracing::info!("Ledger is empty, {} pending", pending.len()),
        }

        Ok(pending)
    }

    /// Apply every pending migration, halting at the first failure
    pub async fn run_migrations(&self) -> SqlMigResult<Vec<MigrationOutcome>> {
        let start_time = std::time::Instant::now();

        self.ledger.ensure_storage_exists().await?;
        let pending = self.pending_migrations().await?;

        let mut outcomes = Vec::with_capacity(pending.len());

        for migration in pending {
            let outcome = self.apply_migration(migration).await;
            let halt = outcome.is_failure();
            outcomes.push(outcome);

            if halt {
                tracing::warn!(
                    "Halting after failed migration, {} applied this run",
                    outcomes.len() - 1
                );
                break;
            }
        }

        tracing::info!(
            "Migration run finished: {} attempted in {}ms",
            outcomes.len(),
            start_time.elapsed().as_millis()
        );
        Ok(outcomes)
    }

    async fn apply_migration(&self, migration: Migration) -> MigrationOutcome {
        tracing::info!("Applying migration {}", migration.identifier());

        let script = match envelope::rewrite(&migration, &self.table) {
            Ok(script) => script,
            Err(failure) => {
                tracing::error!("{}", failure);
                return MigrationOutcome::failure(migration, failure);
            }
        };
        tracing::debug!("Rewritten script for {}:\n{}", migration.identifier(), script);

        let failure = match self.executor.execute(&script).await {
            Ok(output) if output.success() => {
                tracing::info!("Applied migration {}", migration.identifier());
                return MigrationOutcome::success(migration);
            }
            Ok(output) => MigrationFailure::MigrationCommandFailed {
                migration: migration.identifier().to_string(),
                exit_code: output.exit_code,
                output: output.lines,
            },
            Err(e) => MigrationFailure::MigrationCommandFailed {
                migration: migration.identifier().to_string(),
                exit_code: None,
                output: vec![format!("error: failed to run database client: {}", e)],
            },
        };

        tracing::error!("{}", failure);
        MigrationOutcome::failure(migration, failure)
    }
}

/// Keep migrations with an ordinal above `latest`, sorted ascending
pub fn select_pending(discovered: Vec<Migration>, latest: Option<i64>) -> Vec<Migration> {
    let mut pending: Vec<Migration> = discovered
        .into_iter()
        .filter(|migration| latest.map_or(true, |latest| migration.ordinal() > latest))
        .collect();
    pending.sort_by_key(Migration::ordinal);
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlMigError;
    use crate::migrations::definitions::AppliedRecord;
    use crate::migrations::executor::ScriptOutput;
    use async_trait::async_trait;
    use std::fs;
    use std::io;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory ledger with a fixed latest entry
    #[derive(Default)]
    struct FakeLedger {
        latest: Mutex<Option<Migration>>,
        storage_calls: Mutex<usize>,
        unavailable: bool,
    }

    impl FakeLedger {
        fn at(ordinal: i64) -> Self {
            let ledger = Self::default();
            *ledger.latest.lock().unwrap() = Some(Migration::from_ledger(
                ordinal,
                format!("{:04}_applied.sql", ordinal),
                "begin; commit;",
                AppliedRecord {
                    ledger_id: ordinal,
                    applied_at: chrono::Utc::now(),
                },
            ));
            ledger
        }
    }

    #[async_trait]
    impl Ledger for FakeLedger {
        async fn ensure_storage_exists(&self) -> SqlMigResult<()> {
            if self.unavailable {
                return Err(SqlMigError::LedgerUnavailable {
                    context: "create schema",
                    source: sqlx::Error::PoolClosed,
                });
            }
            *self.storage_calls.lock().unwrap() += 1;
            Ok(())
        }

        async fn find_latest(&self) -> SqlMigResult<Option<Migration>> {
            Ok(self.latest.lock().unwrap().clone())
        }
    }

    /// Records every script; fails those containing a marker
    #[derive(Default)]
    struct FakeExecutor {
        scripts: Mutex<Vec<String>>,
        fail_marker: Option<&'static str>,
    }

    #[async_trait]
    impl ScriptExecutor for FakeExecutor {
        async fn execute(&self, script: &str) -> io::Result<ScriptOutput> {
            self.scripts.lock().unwrap().push(script.to_string());
            let failed = self.fail_marker.map_or(false, |marker| script.contains(marker));
            Ok(ScriptOutput {
                exit_code: Some(if failed { 3 } else { 0 }),
                lines: if failed {
                    vec![
                        "BEGIN".to_string(),
                        "psql:<stdin>:2: ERROR:  boom".to_string(),
                    ]
                } else {
                    vec![]
                },
            })
        }
    }

    fn migrations_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    fn runner(
        dir: &TempDir,
        ledger: FakeLedger,
        executor: FakeExecutor,
    ) -> MigrationRunner<FakeLedger, FakeExecutor> {
        MigrationRunner::new(
            MigrationManager::new(dir.path()),
            ledger,
            executor,
            LedgerTable::default(),
        )
    }

    #[test]
    fn test_select_pending_filters_and_sorts() {
        let discovered = vec![
            Migration::from_script(30, "30.sql", ""),
            Migration::from_script(5, "5.sql", ""),
            Migration::from_script(12, "12.sql", ""),
            Migration::from_script(7, "7.sql", ""),
        ];

        let all: Vec<i64> = select_pending(discovered.clone(), None)
            .iter()
            .map(Migration::ordinal)
            .collect();
        assert_eq!(all, vec![5, 7, 12, 30]);

        let after: Vec<i64> = select_pending(discovered.clone(), Some(7))
            .iter()
            .map(Migration::ordinal)
            .collect();
        assert_eq!(after, vec![12, 30]);

        assert!(select_pending(discovered, Some(30)).is_empty());
    }

    #[tokio::test]
    async fn test_empty_ledger_applies_everything_in_order() {
        let dir = migrations_dir(&[
            ("0002_b.sql", "begin; select 2; commit;"),
            ("0001_a.sql", "begin; select 1; commit;"),
            ("0010_c.sql", "begin; select 10; commit;"),
        ]);
        let runner = runner(&dir, FakeLedger::default(), FakeExecutor::default());

        let outcomes = runner.run_migrations().await.unwrap();

        let applied: Vec<&str> = outcomes.iter().map(|o| o.migration().identifier()).collect();
        assert_eq!(applied, vec!["0001_a.sql", "0002_b.sql", "0010_c.sql"]);
        assert!(outcomes.iter().all(|o| !o.is_failure()));
        assert_eq!(*runner.ledger().storage_calls.lock().unwrap(), 1);

        let scripts = runner.executor().scripts.lock().unwrap();
        assert!(scripts[0].contains("values (1, '0001_a.sql'"));
        assert!(scripts[2].contains("values (10, '0010_c.sql'"));
    }

    #[tokio::test]
    async fn test_skips_migrations_already_in_ledger() {
        let dir = migrations_dir(&[
            ("0001_a.sql", "begin; select 1; commit;"),
            ("0002_b.sql", "begin; select 2; commit;"),
            ("0003_c.sql", "begin; select 3; commit;"),
        ]);
        let runner = runner(&dir, FakeLedger::at(2), FakeExecutor::default());

        let outcomes = runner.run_migrations().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].migration().ordinal(), 3);
    }

    #[tokio::test]
    async fn test_command_failure_halts_the_run() {
        let dir = migrations_dir(&[
            ("0001_a.sql", "begin; select 1; commit;"),
            ("0002_b.sql", "begin; select 'explode'; commit;"),
            ("0003_c.sql", "begin; select 3; commit;"),
        ]);
        let executor = FakeExecutor {
            fail_marker: Some("explode"),
            ..Default::default()
        };
        let runner = runner(&dir, FakeLedger::default(), executor);

        let outcomes = runner.run_migrations().await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].is_failure());
        assert!(outcomes[1].is_failure());
        match &outcomes[1].errors()[0] {
            MigrationFailure::MigrationCommandFailed {
                migration,
                exit_code,
                output,
            } => {
                assert_eq!(migration, "0002_b.sql");
                assert_eq!(*exit_code, Some(3));
                assert!(output.iter().any(|line| line.contains("ERROR")));
            }
            other => panic!("unexpected failure {:?}", other),
        }
        assert_eq!(runner.executor().scripts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_envelope_halts_without_executing() {
        let dir = migrations_dir(&[
            ("0001_a.sql", "begin; select 1; commit;"),
            ("0002_b.sql", "select 2;"),
            ("0003_c.sql", "begin; select 3; commit;"),
        ]);
        let runner = runner(&dir, FakeLedger::default(), FakeExecutor::default());

        let outcomes = runner.run_migrations().await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes[1].errors(),
            &[MigrationFailure::MissingTransactionControl {
                migration: "0002_b.sql".to_string()
            }]
        );
        assert_eq!(runner.executor().scripts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_failure_aborts_the_run() {
        let dir = migrations_dir(&[("0001_a.sql", "begin; select 1; commit;")]);
        let ledger = FakeLedger {
            unavailable: true,
            ..Default::default()
        };
        let runner = runner(&dir, ledger, FakeExecutor::default());

        let err = runner.run_migrations().await.unwrap_err();
        assert!(matches!(err, SqlMigError::LedgerUnavailable { .. }));
        assert!(runner.executor().scripts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_failure_aborts_the_run() {
        let dir = migrations_dir(&[
            ("0001_a.sql", "begin; select 1; commit;"),
            ("notes.sql", "begin; commit;"),
        ]);
        let runner = runner(&dir, FakeLedger::default(), FakeExecutor::default());

        let err = runner.run_migrations().await.unwrap_err();
        assert!(matches!(err, SqlMigError::InvalidOrdinal { .. }));
    }
}
