//! Storage backend abstraction.
//!
//! A backend is the connected handle to a document database. It is produced by a
//! [`StoreBackendConnector`], shared by every store that uses the same
//! [`ConnectionManager`](crate::connection::ConnectionManager), and speaks in untyped BSON
//! documents keyed by their `id` field. Typing, existence checks and timeouts live in the
//! [`DocumentStore`](crate::store::DocumentStore); backends only do what they are told.
//!
//! # Traits
//!
//! - [`StoreBackend`]: the connected handle
//! - [`BackendSession`]: a transaction-bearing session on that handle
//! - [`StoreBackendConnector`]: establishes handles

use async_trait::async_trait;
use bson::Bson;
use std::fmt::Debug;

use crate::{config::StoreConfig, error::DocumentStoreResult, query::Query};

/// Abstract interface for a connected document database.
///
/// # Thread Safety
///
/// Implementations must support concurrent use from many tasks. Concurrency control
/// beyond that (pooling, queuing) is up to the implementation.
///
/// # Errors
///
/// Driver failures are reported as
/// [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend) with the
/// driver's message. Absence is never an error at this level: lookups return `None`,
/// replace and delete return whether a document matched.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug + 'static {
    /// Session type returned by [`StoreBackend::start_session`].
    type Session: BackendSession;

    /// Fetches the document whose `id` field equals `id`.
    async fn find_document(&self, id: &str, collection: &str) -> DocumentStoreResult<Option<Bson>>;

    /// Inserts documents in order as a single bulk operation.
    ///
    /// No existence check is made. If the backend fails part way, documents before the
    /// failure may already be stored.
    async fn insert_documents(
        &self,
        documents: Vec<(String, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Replaces the whole document whose `id` field equals `id`.
    ///
    /// Returns `false` if no document matched.
    async fn replace_document(
        &self,
        id: &str,
        document: Bson,
        collection: &str,
    ) -> DocumentStoreResult<bool>;

    /// Removes the document whose `id` field equals `id`.
    ///
    /// Returns `false` if no document matched.
    async fn delete_document(&self, id: &str, collection: &str) -> DocumentStoreResult<bool>;

    /// Returns every document matching `query`. The filter has already been validated.
    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Bson>>;

    /// Starts a session with an open transaction.
    async fn start_session(&self) -> DocumentStoreResult<Self::Session>;

    /// Closes the connection and releases its resources.
    ///
    /// Called once by the connection manager on disconnect. Handles captured by in-flight
    /// operations may still be used afterwards and must fail rather than panic.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

/// A session holding an open transaction.
///
/// Reads see the session's own pending writes; other sessions and plain backend calls
/// do not see them until [`BackendSession::commit`].
#[async_trait]
pub trait BackendSession: Send + 'static {
    async fn find_document(&mut self, id: &str, collection: &str) -> DocumentStoreResult<Option<Bson>>;

    async fn insert_documents(
        &mut self,
        documents: Vec<(String, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Makes every pending write visible, or none of them.
    async fn commit(self) -> DocumentStoreResult<()>;

    /// Discards every pending write.
    async fn abort(self) -> DocumentStoreResult<()>;
}

/// Establishes backend connections.
///
/// The connection manager calls [`StoreBackendConnector::connect`] at most once per
/// connected period; implementations do not need their own once-guard.
#[async_trait]
pub trait StoreBackendConnector: Send + Sync + Debug + 'static {
    type Backend: StoreBackend;

    /// Opens a connection described by `config`.
    ///
    /// Should not return until the server has been reached, so that establishment
    /// failures surface here rather than on the first operation.
    async fn connect(&self, config: &StoreConfig) -> DocumentStoreResult<Self::Backend>;
}
