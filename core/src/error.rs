use thiserror::Error;

use crate::schema::Collection;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors surfaced by the datastore.
///
/// Validation errors are raised before any transaction opens. Transaction
/// errors mean the engine rolled back; nothing from the failed operation is
/// visible and the whole logical operation may be retried. Schema errors are
/// fatal for the session.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("{what} '{key}' not found")]
    NotFound { what: &'static str, key: String },

    #[error("Transaction failed: {0}")]
    Transaction(#[from] rusqlite::Error),

    #[error("Transaction scope error on '{collection}': {reason}")]
    Scope {
        collection: Collection,
        reason: &'static str,
    },

    #[error("Failed to open or upgrade datastore: {0}")]
    Schema(#[source] rusqlite::Error),

    #[error("Datastore schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error("Malformed stored value: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Datastore handle is closed")]
    Closed,

    #[error("Datastore worker failed: {0}")]
    Worker(String),
}

impl StoreError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(what: &'static str, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            what,
            key: key.into(),
        }
    }

    /// Only engine-level transaction failures leave the store untouched and
    /// are worth retrying as-is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transaction(_))
    }
}
