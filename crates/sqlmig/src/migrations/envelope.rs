//! Transaction envelope checks and ledger-insert rewriting
//!
//! Every migration must be a single `begin; ... commit;` block. Before it is
//! executed, the closing `commit;` is replaced by an insert into the ledger
//! followed by `commit;`, so the script's effects and its ledger row commit
//! or roll back together.

use once_cell::sync::Lazy;
use regex::Regex;

use super::definitions::Migration;
use crate::config::LedgerTable;
use crate::error::MigrationFailure;

static ENVELOPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\Abegin;.*commit;\z").expect("envelope pattern is valid"));

static TRAILING_COMMIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)commit;\z").expect("commit pattern is valid"));

/// Whether the whole (trimmed) script is wrapped in `begin; ... commit;`
pub fn has_transaction_control(script: &str) -> bool {
    ENVELOPE.is_match(script.trim())
}

/// Produce the executable script for `migration`: its own statements plus
/// the ledger insert, inside the original transaction.
pub fn rewrite(migration: &Migration, ledger: &LedgerTable) -> Result<String, MigrationFailure> {
    let original = migration.script();
    let trimmed = original.trim();

    if !has_transaction_control(trimmed) {
        return Err(MigrationFailure::MissingTransactionControl {
            migration: migration.identifier().to_string(),
        });
    }

    let open = TRAILING_COMMIT.replace(trimmed, "");
    let tag = dollar_tag(original);

    Ok(format!(
        "{open}\n\n\
         insert into {table} (version, migration_script, migration_content)\n\
         values ({ordinal}, {identifier}, {tag}{content}{tag});\n\n\
         commit;\n",
        open = open.trim_end(),
        table = ledger.qualified(),
        ordinal = migration.ordinal(),
        identifier = string_literal(migration.identifier()),
        tag = tag,
        content = original,
    ))
}

/// A dollar-quote tag that does not occur in `content`
fn dollar_tag(content: &str) -> String {
    let mut tag = "$sqlmig$".to_string();
    let mut counter = 0u32;
    while content.contains(&tag) {
        counter += 1;
        tag = format!("$sqlmig_{}$", counter);
    }
    tag
}

fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
