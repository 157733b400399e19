//! Error types for configuration and migration loading.

use thiserror::Error;

/// Errors raised while loading configuration, reading migrations or
/// connecting to a backend.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A migration file or bundle entry is malformed.
    #[error("invalid migration: {0}")]
    InvalidMigration(String),

    /// Failure reported by the storage layer.
    #[error(transparent)]
    Storage(#[from] simplesql_core::Error),
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;
