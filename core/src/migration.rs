//! Forward schema migrations tracked by a persisted version marker.
//!
//! The marker lives in a one-row `schema_version` table. It is rewritten
//! with `DELETE` + `INSERT` in a single transaction, which tolerates a
//! missing or corrupt row. Applied migrations are append-only by
//! convention: their text is not checksummed, so editing an applied
//! migration goes unnoticed.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::backend::{Backend, Context};
use crate::bind::{BoundStatement, Statement};
use crate::error::{Error, Result};

/// Name of the marker table.
pub const SCHEMA_VERSION_TABLE: &str = "schema_version";

/// One schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Positive, unique version number.
    pub version: i64,
    /// DDL applied by [`Migrator::apply`].
    pub up: String,
    /// DDL for manual reversal; only [`Migrator::revert_to`] runs it.
    pub down: String,
}

impl Migration {
    pub fn new(version: i64, up: impl Into<String>, down: impl Into<String>) -> Self {
        Self {
            version,
            up: up.into(),
            down: down.into(),
        }
    }
}

/// Outcome of [`Migrator::apply`] or [`Migrator::revert_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Marker version before the run.
    pub from: i64,
    /// Marker version after the run.
    pub to: i64,
    /// Versions whose script ran, in execution order.
    pub applied: Vec<i64>,
}

/// Snapshot returned by [`Migrator::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Highest applied version, `0` for a fresh schema.
    pub current_version: i64,
    /// Supplied versions above the current one, ascending.
    pub pending: Vec<i64>,
}

/// Validates and sorts migrations ascending by version.
fn sorted(migrations: &[Migration]) -> Result<Vec<&Migration>> {
    let mut seen = HashSet::new();
    for m in migrations {
        if m.version <= 0 {
            return Err(Error::internal(format!(
                "migration version must be positive, got {}",
                m.version
            )));
        }
        if !seen.insert(m.version) {
            return Err(Error::internal(format!(
                "migration version {} supplied twice",
                m.version
            )));
        }
    }
    let mut sorted: Vec<&Migration> = migrations.iter().collect();
    sorted.sort_by_key(|m| m.version);
    Ok(sorted)
}

/// Applies migrations through a borrowed backend.
pub struct Migrator<'a, B: ?Sized> {
    backend: &'a mut B,
}

impl<'a, B: Backend + ?Sized> Migrator<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        Self { backend }
    }

    fn ensure_marker_table(&mut self, ctx: &Context) -> Result<()> {
        self.backend.execute_batch(
            ctx,
            &format!("CREATE TABLE IF NOT EXISTS {SCHEMA_VERSION_TABLE} (version INTEGER PRIMARY KEY)"),
        )
    }

    /// Reads the persisted version; a missing row counts as `0`.
    pub fn current_version(&mut self, ctx: &Context) -> Result<i64> {
        self.ensure_marker_table(ctx)?;
        let stmt = Statement::new(format!(
            "SELECT MAX(version) AS version FROM {SCHEMA_VERSION_TABLE}"
        ))
        .bind(self.backend.placeholder_style())?;
        let records = self.backend.query(ctx, &stmt)?;
        match records.first() {
            Some(record) => Ok(record.get::<Option<i64>>("version")?.unwrap_or(0)),
            None => Ok(0),
        }
    }

    fn set_version(&mut self, ctx: &Context, version: i64) -> Result<()> {
        let style = self.backend.placeholder_style();
        let delete = Statement::new(format!("DELETE FROM {SCHEMA_VERSION_TABLE}")).bind(style)?;
        let mut insert = Statement::new(format!(
            "INSERT INTO {SCHEMA_VERSION_TABLE} (version) VALUES (:version)"
        ));
        insert.bind_param("version", version);
        let insert: BoundStatement = insert.bind(style)?;
        self.backend.execute_atomically(ctx, &[delete, insert])
    }

    /// Applies every migration above the persisted version, ascending.
    ///
    /// After each successful `up` the marker is advanced, so a failure
    /// leaves the schema at the last applied version. Nothing is rolled
    /// back. Running it again on a migrated schema is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] for non-positive or duplicate versions
    /// (before anything runs) and propagates the first backend failure.
    pub fn apply(&mut self, ctx: &Context, migrations: &[Migration]) -> Result<MigrationReport> {
        let ordered = sorted(migrations)?;
        let from = self.current_version(ctx)?;
        let mut report = MigrationReport {
            from,
            to: from,
            applied: Vec::new(),
        };

        for m in ordered.into_iter().filter(|m| m.version > from) {
            ctx.check()?;
            self.backend.execute_batch(ctx, &m.up).map_err(|e| {
                Error::internal(format!("migration {} failed: {}", m.version, e.message()))
            })?;
            self.set_version(ctx, m.version)?;
            info!(backend = self.backend.name(), version = m.version, "applied migration");
            report.to = m.version;
            report.applied.push(m.version);
        }

        if report.applied.is_empty() {
            debug!(version = from, "schema already up to date");
        }
        Ok(report)
    }

    /// Reports the persisted version and the pending migrations.
    pub fn status(&mut self, ctx: &Context, migrations: &[Migration]) -> Result<MigrationStatus> {
        let ordered = sorted(migrations)?;
        let current_version = self.current_version(ctx)?;
        let pending = ordered
            .into_iter()
            .map(|m| m.version)
            .filter(|v| *v > current_version)
            .collect();
        Ok(MigrationStatus {
            current_version,
            pending,
        })
    }

    /// Runs `down` for every applied migration above `target`, newest
    /// first, moving the marker to the next lower supplied version (or
    /// `target`) after each step.
    ///
    /// Never invoked by [`apply`](Self::apply); meant for operators.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] for a negative target and propagates the
    /// first backend failure.
    pub fn revert_to(
        &mut self,
        ctx: &Context,
        migrations: &[Migration],
        target: i64,
    ) -> Result<MigrationReport> {
        if target < 0 {
            return Err(Error::internal(format!(
                "revert target must not be negative, got {target}"
            )));
        }
        let ordered = sorted(migrations)?;
        let from = self.current_version(ctx)?;
        let mut report = MigrationReport {
            from,
            to: from,
            applied: Vec::new(),
        };

        let to_revert: Vec<&Migration> = ordered
            .iter()
            .rev()
            .filter(|m| m.version > target && m.version <= from)
            .copied()
            .collect();

        for m in to_revert {
            ctx.check()?;
            self.backend.execute_batch(ctx, &m.down).map_err(|e| {
                Error::internal(format!("revert of {} failed: {}", m.version, e.message()))
            })?;
            let previous = ordered
                .iter()
                .map(|p| p.version)
                .filter(|v| *v < m.version)
                .max()
                .unwrap_or(0)
                .max(target);
            self.set_version(ctx, previous)?;
            info!(backend = self.backend.name(), version = m.version, "reverted migration");
            report.to = previous;
            report.applied.push(m.version);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_orders_ascending() {
        let migrations = vec![
            Migration::new(3, "c", ""),
            Migration::new(1, "a", ""),
            Migration::new(2, "b", ""),
        ];
        let versions: Vec<i64> = sorted(&migrations)
            .unwrap()
            .iter()
            .map(|m| m.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[test]
    fn test_sorted_rejects_bad_versions() {
        assert!(sorted(&[Migration::new(0, "", "")]).is_err());
        assert!(sorted(&[Migration::new(-4, "", "")]).is_err());
        assert!(sorted(&[Migration::new(1, "", ""), Migration::new(1, "", "")]).is_err());
    }
}
