//! Database connection and migration configuration.
//!
//! Defines the YAML-serializable configuration that selects a backend and
//! points at the migration scripts.
//!
//! # Example YAML
//!
//! ```yaml
//! backend:
//!   kind: sqlite
//!   path: app.db
//!   busy_timeout_ms: 5000
//!   foreign_keys: true
//! migrations: migrations/
//! statement_timeout_ms: 30000
//! ```
//!
//! or, for a server:
//!
//! ```yaml
//! backend:
//!   kind: postgres
//!   url: postgres://app@localhost/app
//! migrations: migrations.yml
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_foreign_keys() -> bool {
    true
}

/// Which engine to connect to, and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Embedded SQLite database file.
    Sqlite {
        /// Database file, created if missing. `:memory:` opens a private
        /// in-memory database.
        path: PathBuf,
        /// How long a statement waits on another connection's lock.
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,
        /// Enforce `FOREIGN KEY` constraints.
        #[serde(default = "default_foreign_keys")]
        foreign_keys: bool,
    },
    /// PostgreSQL server.
    Postgres {
        /// Connection URL or key/value string.
        url: String,
    },
}

/// Top-level configuration.
///
/// # Examples
///
/// ```
/// use simplesql_db::{BackendConfig, DatabaseConfig};
///
/// let yaml = "backend: { kind: postgres, url: 'postgres://localhost/app' }\nmigrations: db/\n";
/// let config: DatabaseConfig = serde_yaml::from_str(yaml).unwrap();
/// assert!(matches!(config.backend, BackendConfig::Postgres { .. }));
/// assert_eq!(config.statement_timeout(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: BackendConfig,
    /// A directory of `<version>_<name>.up.sql` / `.down.sql` files, or a
    /// YAML bundle listing the migrations.
    pub migrations: PathBuf,
    /// Upper bound on a single statement; unset means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_timeout_ms: Option<u64>,
}

impl DatabaseConfig {
    /// Configuration for a SQLite file with default settings.
    pub fn sqlite(path: impl Into<PathBuf>, migrations: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Sqlite {
                path: path.into(),
                busy_timeout_ms: default_busy_timeout_ms(),
                foreign_keys: default_foreign_keys(),
            },
            migrations: migrations.into(),
            statement_timeout_ms: None,
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be read, or [`YamlError`](crate::DatabaseError::YamlError) if parsing
    /// fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be written, or [`YamlError`](crate::DatabaseError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    /// Resolves a relative migrations path against `base`, normally the
    /// directory holding the configuration file.
    pub fn migrations_path(&self, base: &Path) -> PathBuf {
        if self.migrations.is_absolute() {
            self.migrations.clone()
        } else {
            base.join(&self.migrations)
        }
    }
}
