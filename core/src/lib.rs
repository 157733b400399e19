//! Generic SQL access layer for described row types.
//!
//! This crate maps row types onto SQL statements and enforces optimistic
//! concurrency control and soft deletion on top of any [`Backend`]:
//!
//! - **`tag`**: [`Row`], [`Filter`] and [`Patch`] capability traits and the
//!   validated [`RowDescription`] / [`FilterDescription`] they produce.
//! - **`compile`**: pure statement compiler for column lists, placeholders,
//!   filter-to-WHERE compilation, guarded UPDATE/DELETE.
//! - **`bind`**: named-placeholder [`Statement`]s, rebound into a
//!   backend's positional style with list expansion.
//! - **`database`**: [`Table`] handles and the [`Database`] executor.
//! - **`migration`**: ordered, exactly-once [`Migration`]s tracked by a
//!   schema version marker.
//! - **`error`**: the portable [`Error`] taxonomy and [`ErrorClassifier`].
//!
//! Concrete engines live in `simplesql-sqlite` and `simplesql-postgres`.
//!
//! # Describing a row
//!
//! ```
//! use simplesql_core::*;
//!
//! struct Cluster {
//!     id: String,
//!     version: u64,
//!     state: String,
//!     is_deleted: bool,
//! }
//!
//! impl Row for Cluster {
//!     fn describe() -> std::result::Result<RowDescription, TagError> {
//!         RowDescription::builder()
//!             .field(Field::new("id", "id").primary_key())
//!             .field(Field::new("version", "version").version())
//!             .field(Field::new("state", "state"))
//!             .field(Field::new("is_deleted", "is_deleted").soft_delete())
//!             .build()
//!     }
//!
//!     fn column_value(&self, column: &str) -> Option<Value> {
//!         Some(match column {
//!             "id" => self.id.clone().into(),
//!             "version" => self.version.into(),
//!             "state" => self.state.clone().into(),
//!             "is_deleted" => self.is_deleted.into(),
//!             _ => return None,
//!         })
//!     }
//!
//!     fn from_record(record: &Record) -> simplesql_core::Result<Self> {
//!         Ok(Self {
//!             id: record.get("id")?,
//!             version: record.get("version")?,
//!             state: record.get("state")?,
//!             is_deleted: record.get("is_deleted")?,
//!         })
//!     }
//! }
//!
//! let table = Table::<Cluster>::new("cluster").unwrap();
//! assert_eq!(table.row_description().version(), Some("version"));
//! ```

mod backend;
mod bind;
pub mod compile;
mod database;
mod error;
mod migration;
mod tag;
mod value;

pub use backend::{Backend, CancelToken, Context};
pub use bind::{BoundStatement, PlaceholderStyle, Statement};
pub use database::{Database, Table};
pub use error::{Error, ErrorClassifier, ErrorKind, Result};
pub use migration::{
    Migration, MigrationReport, MigrationStatus, Migrator, SCHEMA_VERSION_TABLE,
};
pub use tag::{
    Changeset, Field, Filter, FilterDescription, FilterDescriptionBuilder, FilterField,
    FilterKind, FilterValue, INCLUDE_DELETED, LIMIT, NoFilter, Operator, Patch, Role, Row,
    RowDescription, RowDescriptionBuilder, TagError, validate_identifier,
};
pub use value::{FromValue, Record, Value};
