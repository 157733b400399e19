//! Embedded SQLite backend for `simplesql-core`.
//!
//! [`SqliteBackend`] wraps one `rusqlite` connection and implements
//! [`Backend`](simplesql_core::Backend):
//!
//! - **`backend`**: statement execution, transactions, deadline-bounded
//!   lock waits
//! - **`convert`**: portable values to and from SQLite storage classes
//! - **`error`**: [`SqliteClassifier`], mapping engine failures onto the
//!   portable error taxonomy
//!
//! Placeholders use the `?N` form. Booleans are stored as `0`/`1`.
//!
//! # Quick start
//!
//! ```no_run
//! use simplesql_core::{Context, Database, Migration};
//! use simplesql_sqlite::SqliteBackend;
//!
//! let backend = SqliteBackend::open("app.db").unwrap();
//! let mut db = Database::new(backend);
//! let migrations = vec![Migration::new(
//!     1,
//!     "CREATE TABLE cluster (id TEXT PRIMARY KEY, version INTEGER NOT NULL, \
//!      is_deleted BOOLEAN NOT NULL DEFAULT FALSE);",
//!     "DROP TABLE cluster;",
//! )];
//! let report = db.apply_migrations(&Context::background(), &migrations).unwrap();
//! println!("schema at version {}", report.to);
//! ```

mod backend;
mod convert;
mod error;

pub use backend::{DEFAULT_BUSY_TIMEOUT, SqliteBackend};
pub use error::SqliteClassifier;
