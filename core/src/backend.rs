//! The seam between the executor and a concrete SQL engine.
//!
//! A [`Backend`] runs already-bound statements and reports failures in the
//! portable taxonomy, using the [`ErrorClassifier`](crate::ErrorClassifier)
//! it was constructed with. Every call takes a [`Context`] carrying an
//! optional deadline and cancellation token.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::bind::{BoundStatement, PlaceholderStyle};
use crate::error::{Error, Result};
use crate::value::Record;

/// Shared flag used to cancel in-flight work from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation signal for one operation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl Context {
    /// A context that never expires and cannot be canceled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_token(&self) -> Option<&CancelToken> {
        self.cancel.as_ref()
    }

    /// `true` when the context can expire or be canceled, i.e. when a
    /// running statement may have to be interrupted.
    pub fn is_bounded(&self) -> bool {
        self.deadline.is_some() || self.cancel.is_some()
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fails if the operation was canceled or its deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] in either case.
    pub fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(Error::internal("operation canceled"));
        }
        if self.remaining().is_some_and(|r| r.is_zero()) {
            return Err(Error::internal("deadline exceeded"));
        }
        Ok(())
    }
}

/// A SQL engine the executor and migration runner can drive.
///
/// Implementations classify every failure before returning it.
pub trait Backend {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Placeholder syntax the engine expects.
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Runs one statement and returns the number of rows affected.
    fn execute(&mut self, ctx: &Context, stmt: &BoundStatement) -> Result<u64>;

    /// Runs one query and returns every result row.
    fn query(&mut self, ctx: &Context, stmt: &BoundStatement) -> Result<Vec<Record>>;

    /// Runs parameterless SQL that may hold several statements (DDL).
    fn execute_batch(&mut self, ctx: &Context, sql: &str) -> Result<()>;

    /// Runs the statements in one transaction; either all apply or none.
    fn execute_atomically(&mut self, ctx: &Context, stmts: &[BoundStatement]) -> Result<()>;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        (**self).placeholder_style()
    }

    fn execute(&mut self, ctx: &Context, stmt: &BoundStatement) -> Result<u64> {
        (**self).execute(ctx, stmt)
    }

    fn query(&mut self, ctx: &Context, stmt: &BoundStatement) -> Result<Vec<Record>> {
        (**self).query(ctx, stmt)
    }

    fn execute_batch(&mut self, ctx: &Context, sql: &str) -> Result<()> {
        (**self).execute_batch(ctx, sql)
    }

    fn execute_atomically(&mut self, ctx: &Context, stmts: &[BoundStatement]) -> Result<()> {
        (**self).execute_atomically(ctx, stmts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_context_passes() {
        assert!(Context::background().check().is_ok());
        assert!(Context::background().remaining().is_none());
        assert!(!Context::background().is_bounded());
    }

    #[test]
    fn test_bounded_contexts() {
        let token = CancelToken::new();
        let canceled = Context::background().with_cancel(token);
        assert!(canceled.is_bounded());
        assert!(canceled.cancel_token().is_some());
        assert!(
            Context::background()
                .with_timeout(Duration::from_secs(1))
                .is_bounded()
        );
    }

    #[test]
    fn test_canceled_context_fails() {
        let token = CancelToken::new();
        let ctx = Context::background().with_cancel(token.clone());
        assert!(ctx.check().is_ok());
        token.cancel();
        let err = ctx.check().unwrap_err();
        assert_eq!(err.message(), "operation canceled");
    }

    #[test]
    fn test_expired_deadline_fails() {
        let ctx = Context::background().with_deadline(Instant::now());
        assert_eq!(ctx.check().unwrap_err().message(), "deadline exceeded");
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let soon = Instant::now() + Duration::from_secs(1);
        let ctx = Context::background()
            .with_deadline(soon)
            .with_timeout(Duration::from_secs(3600));
        assert_eq!(ctx.deadline(), Some(soon));
    }
}
