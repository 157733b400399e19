//! Configuration, backend selection and migration loading for simplesql.
//!
//! This crate wires the storage layer to the outside world: a YAML
//! [`DatabaseConfig`] names the backend and the migration source,
//! [`connect`] opens the configured engine as an [`AnyBackend`], and
//! [`MigrationSet`] reads migration scripts from disk.
//!
//! # Quick start
//!
//! ```no_run
//! use simplesql_core::{Context, Database};
//! use simplesql_db::{DatabaseConfig, MigrationSet, connect};
//!
//! let config = DatabaseConfig::load("simplesql.yml").unwrap();
//! let migrations = MigrationSet::load(&config.migrations).unwrap();
//!
//! let mut db = Database::new(connect(&config).unwrap());
//! let report = db
//!     .apply_migrations(&Context::background(), migrations.migrations())
//!     .unwrap();
//! println!("schema at version {}", report.to);
//! ```

mod config;
mod connect;
mod error;
mod loader;

pub use config::{BackendConfig, DatabaseConfig};
pub use connect::{AnyBackend, connect};
pub use error::{DatabaseError, Result};
pub use loader::{MigrationSet, MigrationSource};
