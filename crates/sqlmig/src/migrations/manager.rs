//! Migration Manager - File system operations for migrations
//!
//! Discovers `.sql` scripts, derives their ordinal from the leading digits
//! of the file name, and creates new enveloped script files.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::definitions::Migration;
use crate::error::{SqlMigError, SqlMigResult};

/// Migration manager for creating and loading migrations
pub struct MigrationManager {
    migrations_dir: PathBuf,
}

impl MigrationManager {
    /// Create a manager for the given directory
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Directory scanned for migration scripts
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Load every migration script in the directory, in no particular order
    pub fn load_migrations(&self) -> SqlMigResult<Vec<Migration>> {
        if !self.migrations_dir.exists() {
            tracing::warn!(
                "Migrations directory {} does not exist, nothing to discover",
                self.migrations_dir.display()
            );
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.migrations_dir).map_err(|source| {
            SqlMigError::Discovery {
                path: self.migrations_dir.clone(),
                source,
            }
        })?;

        let mut migrations = Vec::new();
        let mut seen: HashMap<i64, String> = HashMap::new();

        for entry in entries {
            let entry = entry.map_err(|source| SqlMigError::Discovery {
                path: self.migrations_dir.clone(),
                source,
            })?;

            let path = entry.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "sql") {
                continue;
            }

            let migration = self.parse_migration_file(&path)?;
            let previous = seen.insert(migration.ordinal(), migration.identifier().to_string());
            if let Some(first) = previous {
                return Err(SqlMigError::DuplicateOrdinal {
                    ordinal: migration.ordinal(),
                    first,
                    second: migration.identifier().to_string(),
                });
            }
            migrations.push(migration);
        }

        tracing::debug!(
            "Discovered {} migration script(s) in {}",
            migrations.len(),
            self.migrations_dir.display()
        );
        Ok(migrations)
    }

    fn parse_migration_file(&self, path: &Path) -> SqlMigResult<Migration> {
        let identifier = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let ordinal = parse_ordinal(&identifier)
            .ok_or_else(|| SqlMigError::InvalidOrdinal { file: identifier.clone() })?;

        let script = fs::read_to_string(path).map_err(|source| SqlMigError::Discovery {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Migration::from_script(ordinal, identifier, script))
    }

    /// Create a new migration file with the next free ordinal
    pub fn create_migration(&self, name: &str) -> SqlMigResult<PathBuf> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(crate::config::ConfigError::InvalidValue {
                field: "name".to_string(),
                value: name.to_string(),
                expected: "a name containing letters or digits".to_string(),
            }
            .into());
        }

        fs::create_dir_all(&self.migrations_dir).map_err(|source| SqlMigError::Write {
            path: self.migrations_dir.clone(),
            source,
        })?;

        let next = self
            .load_migrations()?
            .iter()
            .map(Migration::ordinal)
            .max()
            .map_or(1, |latest| latest + 1);

        let filename = format!("{:04}_{}.sql", next, slug);
        let filepath = self.migrations_dir.join(&filename);

        fs::write(&filepath, migration_template(name)).map_err(|source| SqlMigError::Write {
            path: filepath.clone(),
            source,
        })?;

        tracing::info!("Created migration {}", filepath.display());
        Ok(filepath)
    }
}

/// Leading run of ASCII digits in a file name. `None` when there are none
/// or the value does not fit an `i64`.
pub fn parse_ordinal(filename: &str) -> Option<i64> {
    let end = filename
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(filename.len());
    let digits = &filename[..end];

    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn migration_template(name: &str) -> String {
    format!(
        "begin;\n\n\
         -- Migration: {}\n\
         -- Add your schema changes here\n\n\
         commit;\n",
        name.trim()
    )
}
