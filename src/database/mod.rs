// Database module
// In-memory document store and vector index, bundled into named SQLite collections on disk

pub mod collection;
pub mod documents;
pub mod index;

use thiserror::Error;

pub use collection::{Collection, CollectionStore, CollectionSummary};
pub use documents::{DocumentId, DocumentStore, Severity, VulnerabilityDocument};
pub use index::{IndexEntry, ScoredId, VectorIndex};

/// Errors raised by the document store, vector index and collection persistence
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document id {0} already exists")]
    DuplicateId(DocumentId),

    #[error("Document id {0} not found")]
    NotFound(DocumentId),

    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector index is empty")]
    EmptyIndex,

    #[error("Collection not found: {0}")]
    IndexNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Collection is corrupt: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    #[inline]
    fn from(error: sqlx::Error) -> Self {
        Self::Database(error.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    #[inline]
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::Database(format!("Failed to run schema migration: {error}"))
    }
}
