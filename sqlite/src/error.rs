//! SQLite error classification.
//!
//! Maps `rusqlite` failures onto the portable taxonomy: missing rows become
//! `NotFound`, any constraint violation (unique, primary key, foreign key,
//! check, not-null) becomes `Conflict`, everything else is `Internal`.

use rusqlite::ErrorCode;
use simplesql_core::{Error, ErrorClassifier};

/// Default classifier for [`SqliteBackend`](crate::SqliteBackend).
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteClassifier;

impl ErrorClassifier<rusqlite::Error> for SqliteClassifier {
    fn classify(&self, err: rusqlite::Error) -> Error {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => Error::not_found(err.to_string()),
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::ConstraintViolation => Error::conflict(err.to_string()),
                ErrorCode::NotFound => Error::not_found(err.to_string()),
                _ => Error::internal(err.to_string()),
            },
            _ => Error::internal(err.to_string()),
        }
    }
}
