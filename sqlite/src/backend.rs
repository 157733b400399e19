//! [`Backend`] implementation over a single `rusqlite` connection.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, params_from_iter};
use simplesql_core::{
    Backend, BoundStatement, Context, ErrorClassifier, PlaceholderStyle, Record, Result,
};
use tracing::debug;

use crate::convert::{column_names, record_from_row, to_sql_args};
use crate::error::SqliteClassifier;

/// Lock wait applied when the context carries no deadline.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// Virtual machine steps between context checks while a statement runs.
const PROGRESS_STEPS: i32 = 1_000;

/// Embedded SQLite engine.
///
/// Foreign key enforcement is switched on when the backend is created.
/// Each call bounds the engine's lock wait by the context deadline, so a
/// writer blocked on another connection gives up no later than the caller
/// asked. A statement that is already running is interrupted as soon as
/// the context expires or its cancel token fires.
pub struct SqliteBackend<C = SqliteClassifier> {
    conn: Connection,
    classifier: C,
    busy_timeout: Duration,
}

impl SqliteBackend<SqliteClassifier> {
    /// Opens (or creates) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the classified open failure.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| SqliteClassifier.classify(e))?;
        debug!(path = %path.display(), "opened sqlite database");
        Self::new(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| SqliteClassifier.classify(e))?;
        Self::new(conn)
    }

    /// Wraps an existing connection.
    pub fn new(conn: Connection) -> Result<Self> {
        let backend = Self {
            conn,
            classifier: SqliteClassifier,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        };
        backend.set_foreign_keys(true)?;
        Ok(backend)
    }
}

impl<C: ErrorClassifier<rusqlite::Error>> SqliteBackend<C> {
    /// Replaces the error classifier.
    pub fn with_classifier<C2: ErrorClassifier<rusqlite::Error>>(
        self,
        classifier: C2,
    ) -> SqliteBackend<C2> {
        SqliteBackend {
            conn: self.conn,
            classifier,
            busy_timeout: self.busy_timeout,
        }
    }

    /// Sets the lock wait used when the context has no deadline.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Turns `PRAGMA foreign_keys` on or off for this connection.
    pub fn set_foreign_keys(&self, enabled: bool) -> Result<()> {
        let pragma = if enabled {
            "PRAGMA foreign_keys = ON;"
        } else {
            "PRAGMA foreign_keys = OFF;"
        };
        self.conn
            .execute_batch(pragma)
            .map_err(|e| self.classifier.classify(e))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Checks the context and caps the lock wait by its remaining time.
    fn prepare_call(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        let wait = match ctx.remaining() {
            Some(remaining) => remaining.min(self.busy_timeout),
            None => self.busy_timeout,
        };
        self.conn
            .busy_timeout(wait)
            .map_err(|e| self.classifier.classify(e))
    }

    /// Runs `call` on the connection, interrupting it once `ctx` expires or
    /// is canceled.
    ///
    /// The context is polled from SQLite's progress handler, so a long
    /// running statement stops within a few thousand virtual machine steps
    /// and reports the context's own error rather than `SQLITE_INTERRUPT`.
    fn run<T>(
        &mut self,
        ctx: &Context,
        call: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        self.prepare_call(ctx)?;
        if !ctx.is_bounded() {
            return call(&mut self.conn).map_err(|e| self.classifier.classify(e));
        }

        let watched = ctx.clone();
        self.conn
            .progress_handler(PROGRESS_STEPS, Some(move || watched.check().is_err()));
        let result = call(&mut self.conn);
        self.conn.progress_handler(PROGRESS_STEPS, None::<fn() -> bool>);

        result.map_err(|e| match ctx.check() {
            Err(stopped) if is_interrupt(&e) => {
                debug!(reason = stopped.message(), "sqlite statement interrupted");
                stopped
            }
            _ => self.classifier.classify(e),
        })
    }
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    )
}

impl<C: ErrorClassifier<rusqlite::Error>> Backend for SqliteBackend<C> {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn execute(&mut self, ctx: &Context, stmt: &BoundStatement) -> Result<u64> {
        let args = to_sql_args(&stmt.args)?;
        let affected = self.run(ctx, |conn| {
            conn.execute(&stmt.sql, params_from_iter(args.iter()))
        })?;
        Ok(affected as u64)
    }

    fn query(&mut self, ctx: &Context, stmt: &BoundStatement) -> Result<Vec<Record>> {
        let args = to_sql_args(&stmt.args)?;
        self.run(ctx, |conn| {
            let mut prepared = conn.prepare(&stmt.sql)?;
            let columns = column_names(&prepared);
            let rows = prepared.query_map(params_from_iter(args.iter()), |row| {
                record_from_row(&columns, row)
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
    }

    fn execute_batch(&mut self, ctx: &Context, sql: &str) -> Result<()> {
        self.run(ctx, |conn| conn.execute_batch(sql))
    }

    fn execute_atomically(&mut self, ctx: &Context, stmts: &[BoundStatement]) -> Result<()> {
        let args = stmts
            .iter()
            .map(|stmt| to_sql_args(&stmt.args))
            .collect::<Result<Vec<_>>>()?;
        self.run(ctx, |conn| {
            // Dropping `tx` on an early return rolls back.
            let tx = conn.transaction()?;
            for (stmt, args) in stmts.iter().zip(&args) {
                tx.execute(&stmt.sql, params_from_iter(args.iter()))?;
            }
            tx.commit()
        })
    }
}
