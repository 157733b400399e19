//! Portable error taxonomy shared by every backend.
//!
//! Backend failures are classified into [`Error::NotFound`],
//! [`Error::Conflict`] or [`Error::Internal`] before they reach the caller.
//! The original backend message is kept as text for diagnostics; backend
//! error types never cross this boundary.

use thiserror::Error;

/// Errors returned by data-access operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A point lookup matched no live row.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A write lost an optimistic-lock race or violated a uniqueness or
    /// foreign-key constraint.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything else reported by the backend, including connectivity,
    /// malformed queries, cancellation and decoding failures.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Discriminant of [`Error`], convenient for matching without the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Internal,
}

impl Error {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Diagnostic message carried by the error.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(m) | Self::Conflict(m) | Self::Internal(m) => m,
        }
    }
}

/// Maps a backend-specific failure into the portable taxonomy.
///
/// Each backend ships one implementation and takes an instance at
/// construction time, so callers can substitute their own mapping.
pub trait ErrorClassifier<E>: Send + Sync {
    fn classify(&self, err: E) -> Error;
}

impl<E, F> ErrorClassifier<E> for F
where
    F: Fn(E) -> Error + Send + Sync,
{
    fn classify(&self, err: E) -> Error {
        self(err)
    }
}

/// Convenience alias for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(Error::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(Error::conflict("x").kind(), ErrorKind::Conflict);
        assert_eq!(Error::internal("x").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_display_keeps_message() {
        let err = Error::conflict("no rows affected");
        assert_eq!(err.to_string(), "conflict: no rows affected");
        assert_eq!(err.message(), "no rows affected");
    }

    #[test]
    fn test_closure_is_a_classifier() {
        let classifier = |e: std::io::Error| Error::internal(e.to_string());
        let err = classifier.classify(std::io::Error::other("boom"));
        assert!(matches!(err, Error::Internal(m) if m == "boom"));
    }
}
