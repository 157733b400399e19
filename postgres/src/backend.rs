//! [`Backend`] implementation over a synchronous `postgres::Client`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::{Client, NoTls};
use simplesql_core::{
    Backend, BoundStatement, Context, ErrorClassifier, PlaceholderStyle, Record, Result,
};
use tracing::{debug, warn};

use crate::convert::{PgValue, params, record_from_row};
use crate::error::PostgresClassifier;

// How often an in-flight statement checks its cancel token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

fn as_params<'a>(values: &'a [PgValue<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

/// Networked PostgreSQL engine.
///
/// Placeholders use the `$N` form. When the context carries a deadline the
/// session's `statement_timeout` is lowered to the remaining time before
/// the statement is sent; otherwise the configured default applies. A
/// statement still running when the context's cancel token fires is
/// canceled on the server.
pub struct PostgresBackend<C = PostgresClassifier> {
    client: Client,
    classifier: C,
    statement_timeout: Option<Duration>,
    // Last value sent with `SET statement_timeout`, in milliseconds.
    session_timeout_ms: Option<u64>,
}

impl PostgresBackend<PostgresClassifier> {
    /// Connects without TLS using a libpq-style URL or key/value string.
    ///
    /// # Errors
    ///
    /// Returns the classified connection failure.
    pub fn connect(url: &str) -> Result<Self> {
        let client = Client::connect(url, NoTls).map_err(|e| PostgresClassifier.classify(e))?;
        debug!("connected to postgres");
        Ok(Self::new(client))
    }

    /// Wraps an established client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            classifier: PostgresClassifier,
            statement_timeout: None,
            session_timeout_ms: None,
        }
    }
}

impl<C: ErrorClassifier<postgres::Error>> PostgresBackend<C> {
    /// Replaces the error classifier.
    pub fn with_classifier<C2: ErrorClassifier<postgres::Error>>(
        self,
        classifier: C2,
    ) -> PostgresBackend<C2> {
        PostgresBackend {
            client: self.client,
            classifier,
            statement_timeout: self.statement_timeout,
            session_timeout_ms: self.session_timeout_ms,
        }
    }

    /// Sets the statement timeout used when the context has no deadline.
    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    pub fn into_client(self) -> Client {
        self.client
    }

    /// Checks the context and syncs the session timeout with it.
    fn prepare_call(&mut self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        let limit = match (ctx.remaining(), self.statement_timeout) {
            (Some(remaining), Some(default)) => Some(remaining.min(default)),
            (Some(remaining), None) => Some(remaining),
            (None, default) => default,
        };
        // Zero disables the timeout in PostgreSQL, so a live deadline is at
        // least one millisecond. Rounding up keeps the server from giving up
        // before the caller's deadline has actually passed.
        let millis = limit.map_or(0, |d| {
            u64::try_from(d.as_micros().div_ceil(1_000))
                .unwrap_or(u64::MAX)
                .max(1)
        });
        if self.session_timeout_ms == Some(millis) {
            return Ok(());
        }
        self.client
            .batch_execute(&format!("SET statement_timeout = {millis}"))
            .map_err(|e| self.classifier.classify(e))?;
        self.session_timeout_ms = Some(millis);
        Ok(())
    }
}

impl<C: ErrorClassifier<postgres::Error>> PostgresBackend<C> {
    /// Runs `call` on the client after syncing the session timeout.
    ///
    /// When the context carries a cancel token, a watcher thread polls it
    /// while the statement is in flight and asks the server to cancel the
    /// query once it fires. A failure caused by the context (server-side
    /// cancel or `statement_timeout`) is reported as the context's error.
    fn run<T>(
        &mut self,
        ctx: &Context,
        call: impl FnOnce(&mut Client) -> std::result::Result<T, postgres::Error>,
    ) -> Result<T> {
        self.prepare_call(ctx)?;
        let result = match ctx.cancel_token() {
            None => call(&mut self.client),
            Some(token) => {
                let server = self.client.cancel_token();
                let done = AtomicBool::new(false);
                let done = &done;
                let client = &mut self.client;
                thread::scope(|scope| {
                    scope.spawn(move || {
                        while !done.load(Ordering::Acquire) {
                            if token.is_cancelled() {
                                if let Err(err) = server.cancel_query(NoTls) {
                                    warn!(%err, "failed to cancel postgres query");
                                }
                                return;
                            }
                            thread::sleep(CANCEL_POLL_INTERVAL);
                        }
                    });
                    let result = call(client);
                    done.store(true, Ordering::Release);
                    result
                })
            }
        };
        result.map_err(|e| match ctx.check() {
            Err(stopped) if e.code() == Some(&SqlState::QUERY_CANCELED) => {
                debug!(reason = stopped.message(), "postgres statement canceled");
                stopped
            }
            _ => self.classifier.classify(e),
        })
    }
}

impl<C: ErrorClassifier<postgres::Error>> Backend for PostgresBackend<C> {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn execute(&mut self, ctx: &Context, stmt: &BoundStatement) -> Result<u64> {
        let values = params(&stmt.args)?;
        self.run(ctx, |client| {
            client.execute(stmt.sql.as_str(), &as_params(&values))
        })
    }

    fn query(&mut self, ctx: &Context, stmt: &BoundStatement) -> Result<Vec<Record>> {
        let values = params(&stmt.args)?;
        let rows = self.run(ctx, |client| {
            client.query(stmt.sql.as_str(), &as_params(&values))
        })?;
        rows.iter()
            .map(|row| record_from_row(row).map_err(|e| self.classifier.classify(e)))
            .collect()
    }

    fn execute_batch(&mut self, ctx: &Context, sql: &str) -> Result<()> {
        self.run(ctx, |client| client.batch_execute(sql))
    }

    fn execute_atomically(&mut self, ctx: &Context, stmts: &[BoundStatement]) -> Result<()> {
        let values = stmts
            .iter()
            .map(|stmt| params(&stmt.args))
            .collect::<Result<Vec<_>>>()?;
        self.run(ctx, |client| {
            // Dropping `tx` on an early return rolls back.
            let mut tx = client.transaction()?;
            for (stmt, values) in stmts.iter().zip(&values) {
                tx.execute(stmt.sql.as_str(), &as_params(values))?;
            }
            tx.commit()
        })
    }
}
