//! PostgreSQL backend for `simplesql-core`.
//!
//! [`PostgresBackend`] drives a synchronous `postgres::Client`. Statements
//! use `$N` placeholders; integer and float parameters are narrowed to the
//! types the server infers, and result columns are read back by their
//! declared type. Failures are classified by SQLSTATE through
//! [`PostgresClassifier`].
//!
//! Column types map onto [`Value`](simplesql_core::Value) as follows:
//!
//! | PostgreSQL | Value |
//! |------------|-------|
//! | `BOOL` | `Bool` |
//! | `INT2`, `INT4`, `INT8`, `OID` | `Integer` |
//! | `FLOAT4`, `FLOAT8` | `Real` |
//! | `BYTEA` | `Blob` |
//! | `TEXT`, `VARCHAR`, `BPCHAR`, `NAME`, enums | `Text` |
//! | `NUMERIC`, `DATE`, `TIME`, `TIMESTAMP`, `TIMESTAMPTZ`, `UUID`, `JSON`, `JSONB` | `Text` |
//!
//! Reading any other column type fails with [`Error::Internal`](simplesql_core::Error::Internal)
//! naming the type.
//!
//! ```no_run
//! use simplesql_core::{Context, Database};
//! use simplesql_postgres::PostgresBackend;
//!
//! let backend = PostgresBackend::connect("postgres://app@localhost/app").unwrap();
//! let mut db = Database::new(backend);
//! let status = db.migration_status(&Context::background(), &[]).unwrap();
//! println!("schema at version {}", status.current_version);
//! ```

mod backend;
mod convert;
mod error;

pub use backend::PostgresBackend;
pub use error::{PostgresClassifier, classify_sql_state};
