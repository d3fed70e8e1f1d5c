use thiserror::Error;

/// Failure of the on-device store. Fatal to the call that triggered it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("local store lock poisoned")]
    Poisoned,

    #[error("invalid value stored in {column}: {value}")]
    Corrupt { column: &'static str, value: String },
}

/// Errors surfaced by [`crate::SyncCoordinator`].
///
/// Remote failures never show up here: they are absorbed into the mutation
/// queue and reported through `SyncStatus` instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    LocalStore(#[from] StoreError),

    #[error("no media item with id {0}")]
    NotFound(String),

    #[error("no collection with id {0}")]
    CollectionNotFound(String),

    #[error("unsupported export version {found} (expected {expected})")]
    UnsupportedExportVersion { found: u32, expected: u32 },

    #[error("invalid input: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type SyncResult<T> = Result<T, SyncError>;
