//! Backend selection from configuration.

use std::path::Path;
use std::time::Duration;

use simplesql_core::{Backend, BoundStatement, Context, PlaceholderStyle, Record};
use simplesql_postgres::PostgresBackend;
use simplesql_sqlite::SqliteBackend;
use tracing::info;

use crate::config::{BackendConfig, DatabaseConfig};
use crate::error::Result;

/// Either supported engine behind one [`Backend`] implementation.
pub enum AnyBackend {
    Sqlite(SqliteBackend),
    Postgres(PostgresBackend),
}

macro_rules! delegate {
    ($self:ident, $b:ident => $call:expr) => {
        match $self {
            AnyBackend::Sqlite($b) => $call,
            AnyBackend::Postgres($b) => $call,
        }
    };
}

impl Backend for AnyBackend {
    fn name(&self) -> &'static str {
        delegate!(self, b => b.name())
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        delegate!(self, b => b.placeholder_style())
    }

    fn execute(&mut self, ctx: &Context, stmt: &BoundStatement) -> simplesql_core::Result<u64> {
        delegate!(self, b => b.execute(ctx, stmt))
    }

    fn query(
        &mut self,
        ctx: &Context,
        stmt: &BoundStatement,
    ) -> simplesql_core::Result<Vec<Record>> {
        delegate!(self, b => b.query(ctx, stmt))
    }

    fn execute_batch(&mut self, ctx: &Context, sql: &str) -> simplesql_core::Result<()> {
        delegate!(self, b => b.execute_batch(ctx, sql))
    }

    fn execute_atomically(
        &mut self,
        ctx: &Context,
        stmts: &[BoundStatement],
    ) -> simplesql_core::Result<()> {
        delegate!(self, b => b.execute_atomically(ctx, stmts))
    }
}

/// Opens the backend named in `config`.
///
/// For SQLite the configured statement timeout, when set, also caps the
/// lock wait.
///
/// # Errors
///
/// Returns [`DatabaseError::Storage`](crate::DatabaseError::Storage) with
/// the classified failure if the database cannot be opened.
pub fn connect(config: &DatabaseConfig) -> Result<AnyBackend> {
    let backend = match &config.backend {
        BackendConfig::Sqlite {
            path,
            busy_timeout_ms,
            foreign_keys,
        } => {
            let backend = if path.as_path() == Path::new(":memory:") {
                SqliteBackend::open_in_memory()?
            } else {
                SqliteBackend::open(path)?
            };
            let mut busy = Duration::from_millis(*busy_timeout_ms);
            if let Some(limit) = config.statement_timeout() {
                busy = busy.min(limit);
            }
            let backend = backend.with_busy_timeout(busy);
            if !foreign_keys {
                backend.set_foreign_keys(false)?;
            }
            info!(path = %path.display(), "using sqlite backend");
            AnyBackend::Sqlite(backend)
        }
        BackendConfig::Postgres { url } => {
            let backend =
                PostgresBackend::connect(url)?.with_statement_timeout(config.statement_timeout());
            info!("using postgres backend");
            AnyBackend::Postgres(backend)
        }
    };
    Ok(backend)
}
