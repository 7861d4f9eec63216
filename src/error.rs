// ⚠️ Error taxonomy for the ledger
//
// Two layers:
// - StoreError: what a RecordStore adapter can report
// - LedgerError: what the allocator, reconciler and facade report to callers

use crate::identifier::IdKind;
use crate::store::Collection;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, LedgerError>;

// ============================================================================
// STORE ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection} record {id} not found")]
    NotFound { collection: Collection, id: String },

    #[error("{collection} record {id} already exists")]
    Duplicate { collection: Collection, id: String },

    /// Version check failed on update_if_version
    #[error("{collection} record {id} is at version {found}, expected {expected}")]
    Conflict {
        collection: Collection,
        id: String,
        expected: i64,
        found: i64,
    },

    #[error("store does not support {0}")]
    Unsupported(&'static str),

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(format!("json: {}", err))
    }
}

// ============================================================================
// LEDGER ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Identifier does not match its kind's pattern
    #[error("Invalid {kind} number format. Expected format: {expected}")]
    InvalidFormat { kind: IdKind, expected: &'static str },

    #[error("unknown identifier kind: {0}")]
    UnknownKind(String),

    /// A Taka number was submitted twice
    #[error("{kind} number {id} is already recorded")]
    DuplicateRejected { kind: IdKind, id: String },

    #[error("roll {0} not found")]
    RollNotFound(String),

    #[error("{collection} record {id} not found")]
    NotFound { collection: Collection, id: String },

    #[error("store write failed: {0}")]
    StoreWriteFailed(#[source] StoreError),

    #[error("store read failed: {0}")]
    StoreReadFailed(#[source] StoreError),

    /// One half of a two-record write landed and could not be undone
    #[error("partial commit on roll {roll_number} / taka {taka_number}: {detail}")]
    PartialCommit {
        roll_number: String,
        taka_number: String,
        detail: String,
    },

    #[error("roll {roll_number} changed concurrently after {attempts} attempts")]
    Conflict { roll_number: String, attempts: u32 },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    /// Map a store failure on a write path, keeping NotFound distinct
    pub(crate) fn from_write(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => LedgerError::NotFound { collection, id },
            other => LedgerError::StoreWriteFailed(other),
        }
    }

    /// True when the failure left records in an inconsistent pair
    pub fn is_partial(&self) -> bool {
        matches!(self, LedgerError::PartialCommit { .. })
    }
}
