//! Typed tables and the optimistic-lock executor.
//!
//! [`Table`] pairs a table name with the validated descriptions of its row
//! and filter shapes; it is built once and reused for every call.
//! [`Database`] runs compiled statements against a [`Backend`] and enforces
//! the version protocol: a guarded write that affects zero rows is reported
//! as [`Error::Conflict`], whether the row is missing, already deleted or
//! at a different version.
//!
//! # Example
//!
//! ```ignore
//! let clusters = Table::<ClusterRow, ClusterFilter>::new("cluster")?;
//! let mut db = Database::new(backend);
//! let ctx = Context::background();
//!
//! db.apply_migrations(&ctx, &migrations)?;
//! db.insert(&ctx, &clusters, &row)?;
//! let current = db.get_by_primary_key(&ctx, &clusters, "a")?;
//! db.update(&ctx, &clusters, "a", current.version, &Changeset::new().set("state", "inactive"))?;
//! ```

use std::fmt;
use std::marker::PhantomData;

use tracing::debug;

use crate::backend::{Backend, Context};
use crate::bind::Statement;
use crate::compile;
use crate::error::{Error, Result};
use crate::migration::{Migration, MigrationReport, MigrationStatus, Migrator};
use crate::tag::{
    Filter, FilterDescription, FilterKind, NoFilter, Patch, Role, Row, RowDescription, TagError,
    validate_identifier,
};
use crate::value::{Record, Value};

/// A named table with the described row type `R` and filter type `F`.
pub struct Table<R, F = NoFilter> {
    name: String,
    row: RowDescription,
    filter: FilterDescription,
    _shape: PhantomData<fn() -> (R, F)>,
}

impl<R, F> Clone for Table<R, F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            row: self.row.clone(),
            filter: self.filter.clone(),
            _shape: PhantomData,
        }
    }
}

impl<R, F> fmt::Debug for Table<R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("row", &self.row)
            .field("filter", &self.filter)
            .finish()
    }
}

impl<R: Row, F: Filter> Table<R, F> {
    /// Describes `R` and `F` once and validates them for optimistic-lock
    /// operations.
    ///
    /// # Errors
    ///
    /// Fails if the table name is not a plain identifier, either description
    /// is malformed, the row has no primary key or version column, or a
    /// filter predicate names a column the row does not have.
    pub fn new(name: impl Into<String>) -> std::result::Result<Self, TagError> {
        let name = name.into();
        validate_identifier(&name)?;
        let row = R::describe()?;
        row.require(Role::PrimaryKey)?;
        row.require(Role::Version)?;
        let filter = F::describe()?;
        for field in filter.fields() {
            if let FilterKind::Predicate { column, .. } = field.kind() {
                if row.role_of(column).is_none() {
                    return Err(TagError::UnknownColumn {
                        field: field.name().to_string(),
                        column: column.clone(),
                    });
                }
            }
        }
        Ok(Self {
            name,
            row,
            filter,
            _shape: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn row_description(&self) -> &RowDescription {
        &self.row
    }

    pub fn filter_description(&self) -> &FilterDescription {
        &self.filter
    }
}

/// Runs data-access operations against one backend.
///
/// Stateless between calls: no rows are cached and no locks are held. The
/// backend's row-level atomicity is the only serialization point.
pub struct Database<B> {
    backend: B,
}

impl<B: Backend> Database<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    fn execute(&mut self, ctx: &Context, stmt: &Statement) -> Result<u64> {
        let bound = stmt.bind(self.backend.placeholder_style())?;
        debug!(backend = self.backend.name(), sql = %bound.sql, "execute");
        self.backend.execute(ctx, &bound)
    }

    fn query(&mut self, ctx: &Context, stmt: &Statement) -> Result<Vec<Record>> {
        let bound = stmt.bind(self.backend.placeholder_style())?;
        debug!(backend = self.backend.name(), sql = %bound.sql, "query");
        self.backend.query(ctx, &bound)
    }

    /// Executes a guarded write, mapping zero affected rows to a conflict.
    fn execute_guarded(
        &mut self,
        ctx: &Context,
        table: &str,
        stmt: &Statement,
        key: &Value,
        expected_version: u64,
    ) -> Result<()> {
        let affected = self.execute(ctx, stmt)?;
        if affected == 0 {
            debug!(
                table,
                ?key,
                expected_version,
                "optimistic lock rejected write"
            );
            return Err(Error::conflict(format!(
                "no rows affected in {table} for key {key:?} at version {expected_version}"
            )));
        }
        Ok(())
    }

    /// Inserts `row`. A duplicate key is reported as [`Error::Conflict`].
    pub fn insert<R: Row, F: Filter>(
        &mut self,
        ctx: &Context,
        table: &Table<R, F>,
        row: &R,
    ) -> Result<()> {
        let stmt = compile::insert(&table.name, &table.row, row)?;
        self.execute(ctx, &stmt).map(|_| ())
    }

    fn get_one<R: Row>(&mut self, ctx: &Context, table: &str, stmt: &Statement) -> Result<R> {
        let records = self.query(ctx, stmt)?;
        match records.first() {
            Some(record) => R::from_record(record),
            None => Err(Error::not_found(format!("no live row in {table}"))),
        }
    }

    /// Loads the live row whose primary key is `key`.
    ///
    /// For a composite key pass one value per key column, in declaration
    /// order, as a tuple or a [`Value::List`]; the same applies to
    /// [`update`](Self::update), [`soft_delete`](Self::soft_delete) and
    /// [`purge`](Self::purge).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such row exists or it was
    /// soft-deleted.
    pub fn get_by_primary_key<R: Row, F: Filter>(
        &mut self,
        ctx: &Context,
        table: &Table<R, F>,
        key: impl Into<Value>,
    ) -> Result<R> {
        let stmt = compile::select_by_primary_key(&table.name, &table.row, key.into())?;
        self.get_one(ctx, &table.name, &stmt)
    }

    /// Loads the live row whose unique-name column is `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such row exists or it was
    /// soft-deleted, and [`Error::Internal`] if the row shape declares no
    /// unique-name column.
    pub fn get_by_unique_name<R: Row, F: Filter>(
        &mut self,
        ctx: &Context,
        table: &Table<R, F>,
        name: impl Into<Value>,
    ) -> Result<R> {
        let stmt = compile::select_by_unique_name(&table.name, &table.row, name.into())?;
        self.get_one(ctx, &table.name, &stmt)
    }

    /// Applies the present assignments of `patch` and increments the version,
    /// provided the row is live and still at `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when no row matched, which means the
    /// caller's view is stale: re-read and retry.
    pub fn update<R: Row, F: Filter, P: Patch + ?Sized>(
        &mut self,
        ctx: &Context,
        table: &Table<R, F>,
        key: impl Into<Value>,
        expected_version: u64,
        patch: &P,
    ) -> Result<()> {
        let key = key.into();
        let stmt = compile::update(&table.name, &table.row, key.clone(), expected_version, patch)?;
        self.execute_guarded(ctx, &table.name, &stmt, &key, expected_version)
    }

    /// Flags the row as deleted and increments the version, provided it is
    /// live and still at `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when no row matched.
    pub fn soft_delete<R: Row, F: Filter>(
        &mut self,
        ctx: &Context,
        table: &Table<R, F>,
        key: impl Into<Value>,
        expected_version: u64,
    ) -> Result<()> {
        let key = key.into();
        let stmt = compile::soft_delete(&table.name, &table.row, key.clone(), expected_version)?;
        self.execute_guarded(ctx, &table.name, &stmt, &key, expected_version)
    }

    /// Physically removes the row, provided it is at `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when no row matched.
    pub fn purge<R: Row, F: Filter>(
        &mut self,
        ctx: &Context,
        table: &Table<R, F>,
        key: impl Into<Value>,
        expected_version: u64,
    ) -> Result<()> {
        let key = key.into();
        let stmt = compile::purge(&table.name, &table.row, key.clone(), expected_version)?;
        self.execute_guarded(ctx, &table.name, &stmt, &key, expected_version)
    }

    /// Lists the rows matching the present fields of `filter`.
    pub fn list<R: Row, F: Filter>(
        &mut self,
        ctx: &Context,
        table: &Table<R, F>,
        filter: &F,
    ) -> Result<Vec<R>> {
        let stmt = compile::select_filtered(&table.name, &table.row, &table.filter, |field| {
            filter.filter_value(field)
        })?;
        self.query(ctx, &stmt)?
            .iter()
            .map(R::from_record)
            .collect()
    }

    /// Brings the schema up to the highest supplied migration.
    ///
    /// Must run once at startup before other operations; a failure here is
    /// fatal and leaves the schema at the last applied version.
    pub fn apply_migrations(
        &mut self,
        ctx: &Context,
        migrations: &[Migration],
    ) -> Result<MigrationReport> {
        Migrator::new(&mut self.backend).apply(ctx, migrations)
    }

    /// Reports the applied version and which migrations are pending.
    pub fn migration_status(
        &mut self,
        ctx: &Context,
        migrations: &[Migration],
    ) -> Result<MigrationStatus> {
        Migrator::new(&mut self.backend).status(ctx, migrations)
    }

    /// Runs `down` scripts until the schema is at `target`. Operator use only.
    pub fn revert_migrations(
        &mut self,
        ctx: &Context,
        migrations: &[Migration],
        target: i64,
    ) -> Result<MigrationReport> {
        Migrator::new(&mut self.backend).revert_to(ctx, migrations, target)
    }
}
