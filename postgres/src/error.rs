//! PostgreSQL error classification by SQLSTATE.

use postgres::error::SqlState;
use simplesql_core::{Error, ErrorClassifier};

/// Default classifier for [`PostgresBackend`](crate::PostgresBackend).
///
/// `unique_violation` and `foreign_key_violation` are conflicts,
/// `no_data_found` is a miss, everything else (including connection
/// failures, which carry no SQLSTATE) is internal.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresClassifier;

impl ErrorClassifier<postgres::Error> for PostgresClassifier {
    fn classify(&self, err: postgres::Error) -> Error {
        classify_sql_state(err.code(), err.to_string())
    }
}

/// Classifies by SQLSTATE alone.
pub fn classify_sql_state(code: Option<&SqlState>, message: String) -> Error {
    match code {
        Some(c) if *c == SqlState::UNIQUE_VIOLATION || *c == SqlState::FOREIGN_KEY_VIOLATION => {
            Error::conflict(message)
        }
        Some(c) if *c == SqlState::NO_DATA_FOUND => Error::not_found(message),
        _ => Error::internal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_states_are_conflicts() {
        let err = classify_sql_state(
            Some(&SqlState::UNIQUE_VIOLATION),
            "duplicate key value violates unique constraint".to_string(),
        );
        assert!(err.is_conflict());
        assert!(err.message().contains("duplicate key"));

        let fk = classify_sql_state(Some(&SqlState::FOREIGN_KEY_VIOLATION), String::new());
        assert!(fk.is_conflict());
    }

    #[test]
    fn test_no_data_found_is_not_found() {
        let err = classify_sql_state(Some(&SqlState::NO_DATA_FOUND), "no rows".to_string());
        assert!(err.is_not_found());
    }

    #[test]
    fn test_other_states_are_internal() {
        let check = classify_sql_state(Some(&SqlState::CHECK_VIOLATION), "check".to_string());
        assert!(matches!(check, Error::Internal(_)));
        let syntax = classify_sql_state(Some(&SqlState::SYNTAX_ERROR), "syntax".to_string());
        assert!(matches!(syntax, Error::Internal(_)));
        let io = classify_sql_state(None, "connection closed".to_string());
        assert_eq!(io, Error::internal("connection closed"));
    }
}
