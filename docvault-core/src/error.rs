//! Error types and result types for document store operations.
//!
//! Every fallible operation in this crate returns [`DocumentStoreResult<T>`]. The
//! [`DocumentStoreError::NotFound`] and [`DocumentStoreError::Conflict`] variants are the
//! sentinel outcomes callers branch on; anything the backend reports that is not one of
//! the recognized outcomes is carried through in [`DocumentStoreError::Backend`].

use std::time::Duration;

use bson::error::Error as BsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The targeted document id does not exist in the collection.
    #[error("Document {id} not found in collection {collection}")]
    NotFound {
        id: String,
        collection: String,
    },
    /// A document with the given id already exists in the collection.
    #[error("Document {id} already exists in collection {collection}")]
    Conflict {
        id: String,
        collection: String,
    },
    /// A caller-supplied filter could not be translated into a backend query.
    #[error("Invalid predicate: {0}")]
    Predicate(String),
    /// The connection to the backend could not be established.
    #[error("Connection error: {0}")]
    Connection(String),
    /// The operation exceeded the deadline of its execution scope.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    /// The execution scope was cancelled before the operation completed.
    #[error("Operation cancelled")]
    Cancelled,
    /// An error reported by the underlying database driver.
    #[error("Backend error: {0}")]
    Backend(String),
    /// Serialization/deserialization error when converting documents to or from BSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The document has an invalid structure (e.g. it does not serialize to a BSON document).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl DocumentStoreError {
    pub fn not_found(id: impl Into<String>, collection: impl Into<String>) -> Self {
        DocumentStoreError::NotFound { id: id.into(), collection: collection.into() }
    }

    pub fn conflict(id: impl Into<String>, collection: impl Into<String>) -> Self {
        DocumentStoreError::Conflict { id: id.into(), collection: collection.into() }
    }

    /// Returns `true` if the targeted document does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentStoreError::NotFound { .. })
    }

    /// Returns `true` if a create targeted an id that is already taken.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DocumentStoreError::Conflict { .. })
    }

    /// Returns `true` if retrying the whole operation later may succeed.
    ///
    /// This layer never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DocumentStoreError::Connection(_) | DocumentStoreError::Timeout(_))
    }

    /// Suggested HTTP status for surfacing this error to a client.
    ///
    /// Not-found maps to 404, conflicts to 409, malformed predicates to 400 and every
    /// other failure to 502 (an upstream failure).
    pub fn status_hint(&self) -> u16 {
        match self {
            DocumentStoreError::NotFound { .. } => 404,
            DocumentStoreError::Conflict { .. } => 409,
            DocumentStoreError::Predicate(_) => 400,
            _ => 502,
        }
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
