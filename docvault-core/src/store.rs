//! Typed document store over a single collection.
//!
//! A [`DocumentStore`] is bound to one document type and one collection. Every operation
//! derives a child [`Scope`] bounded by the store's timeout, obtains the shared connection
//! (establishing it on first use) and performs an existence check before any mutation, so
//! callers can tell [`NotFound`](DocumentStoreError::NotFound) and
//! [`Conflict`](DocumentStoreError::Conflict) apart from backend failures.
//!
//! # Consistency
//!
//! Uniqueness of `id` is enforced by check-then-insert, not by a database constraint. Two
//! concurrent creates for the same id outside a transaction can both pass the check and
//! both insert. Use [`DocumentStore::begin_transaction`] when that matters.
//!
//! # Example
//!
//! ```ignore
//! use docvault::{prelude::*, memory::InMemoryConnector};
//!
//! let config = StoreConfig::builder().collection("donor").resolve();
//! let donors = DocumentStore::<Donor, _>::new(config, InMemoryConnector::default());
//!
//! let scope = Scope::background();
//! donors.create(&scope, &donor).await?;
//! let stored = donors.find(&scope, &donor.id).await?;
//! ```

use std::{collections::HashSet, marker::PhantomData, sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
    backend::{StoreBackend, StoreBackendConnector},
    config::StoreConfig,
    connection::ConnectionManager,
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
    scope::Scope,
    transaction::Transaction,
};

/// Typed CRUD access to one collection.
///
/// Cheap to clone; clones share the connection manager.
#[derive(Debug)]
pub struct DocumentStore<D: Document, C: StoreBackendConnector> {
    manager: Arc<ConnectionManager<C>>,
    collection: String,
    timeout: Duration,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document, C: StoreBackendConnector> Clone for DocumentStore<D, C> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            collection: self.collection.clone(),
            timeout: self.timeout,
            _marker: PhantomData,
        }
    }
}

impl<D: Document, C: StoreBackendConnector> DocumentStore<D, C> {
    /// Creates a store with its own connection manager.
    ///
    /// Nothing is connected until the first operation.
    pub fn new(config: StoreConfig, connector: C) -> Self {
        Self::with_manager(Arc::new(ConnectionManager::new(config, connector)))
    }

    /// Creates a store on an existing manager, using the manager's collection and timeout.
    pub fn with_manager(manager: Arc<ConnectionManager<C>>) -> Self {
        let collection = manager.config().collection.clone();
        Self::with_manager_for(manager, collection)
    }

    /// Creates a store on an existing manager bound to another collection.
    ///
    /// All stores built from one manager share a single connection.
    pub fn with_manager_for(manager: Arc<ConnectionManager<C>>, collection: impl Into<String>) -> Self {
        Self {
            timeout: manager.config().timeout,
            collection: collection.into(),
            manager,
            _marker: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Upper bound applied to each operation.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn manager(&self) -> &Arc<ConnectionManager<C>> {
        &self.manager
    }

    /// Inserts `document` unless a document with the same id exists.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::Conflict`] if the id is taken; lookup and insert failures
    /// are passed through.
    pub async fn create(&self, scope: &Scope, document: &D) -> DocumentStoreResult<()> {
        let id = document.id();
        debug!(collection = %self.collection, id, "create");

        let scope = scope.child(self.timeout);
        let backend = self.manager.connect(&scope).await?;

        if scope.run(backend.find_document(id, &self.collection)).await?.is_some() {
            debug!(collection = %self.collection, id, "create conflict");
            return Err(DocumentStoreError::conflict(id, &self.collection));
        }

        let entry = (id.to_string(), document.to_bson()?);
        scope
            .run(backend.insert_documents(vec![entry], &self.collection))
            .await
            .inspect_err(|err| self.log_failure("create", err))
    }

    /// Inserts a batch of documents as one bulk operation.
    ///
    /// Every id is checked before anything is written: a duplicate id within the batch or
    /// an id that already exists fails the whole batch with
    /// [`DocumentStoreError::Conflict`] and writes nothing.
    ///
    /// The batch is **not atomic**. If the backend fails during the bulk insert, documents
    /// before the failure may already be stored; the error is returned without per-item
    /// status. Use [`Transaction::create_many`] for all-or-nothing batches.
    pub async fn create_many(&self, scope: &Scope, documents: &[D]) -> DocumentStoreResult<()> {
        debug!(collection = %self.collection, count = documents.len(), "create many");

        if documents.is_empty() {
            return Ok(());
        }

        let mut seen = HashSet::with_capacity(documents.len());
        if let Some(duplicate) = documents.iter().find(|doc| !seen.insert(doc.id())) {
            return Err(DocumentStoreError::conflict(duplicate.id(), &self.collection));
        }

        let entries = documents
            .iter()
            .map(|doc| doc.to_bson().map(|bson| (doc.id().to_string(), bson)))
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        let scope = scope.child(self.timeout);
        let backend = self.manager.connect(&scope).await?;

        for (id, _) in &entries {
            if scope.run(backend.find_document(id, &self.collection)).await?.is_some() {
                debug!(collection = %self.collection, id, "create many conflict");
                return Err(DocumentStoreError::conflict(id, &self.collection));
            }
        }

        scope
            .run(backend.insert_documents(entries, &self.collection))
            .await
            .inspect_err(|err| self.log_failure("create many", err))
    }

    /// Fetches the document with the given id.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::NotFound`] if there is none; other failures are passed through.
    pub async fn find(&self, scope: &Scope, id: &str) -> DocumentStoreResult<D> {
        debug!(collection = %self.collection, id, "find");

        let scope = scope.child(self.timeout);
        let backend = self.manager.connect(&scope).await?;

        match scope.run(backend.find_document(id, &self.collection)).await {
            Ok(Some(bson)) => D::from_bson(bson),
            Ok(None) => Err(DocumentStoreError::not_found(id, &self.collection)),
            Err(err) => {
                self.log_failure("find", &err);
                Err(err)
            }
        }
    }

    /// Fetches every document matching `filter`; `None` returns the whole collection.
    ///
    /// Zero matches yield an empty `Vec`, not an error.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::Predicate`] if the filter cannot be translated. This is
    /// checked before the connection is touched.
    pub async fn find_many(&self, scope: &Scope, filter: Option<Expr>) -> DocumentStoreResult<Vec<D>> {
        self.query(scope, Query::filtered(filter)).await
    }

    /// Like [`DocumentStore::find_many`], with ordering and paging.
    pub async fn query(&self, scope: &Scope, query: Query) -> DocumentStoreResult<Vec<D>> {
        debug!(collection = %self.collection, filter = ?query.filter, "query");

        if let Some(filter) = &query.filter {
            filter.validate()?;
        }

        let scope = scope.child(self.timeout);
        let backend = self.manager.connect(&scope).await?;

        scope
            .run(backend.query_documents(query, &self.collection))
            .await
            .inspect_err(|err| self.log_failure("query", err))?
            .into_iter()
            .map(D::from_bson)
            .collect()
    }

    /// Replaces the stored document with the same id as `document`.
    ///
    /// The stored document is replaced whole; fields absent from `document` are gone
    /// afterwards.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::NotFound`] if there is no such document.
    pub async fn update(&self, scope: &Scope, document: &D) -> DocumentStoreResult<()> {
        let id = document.id();
        debug!(collection = %self.collection, id, "update");

        let scope = scope.child(self.timeout);
        let backend = self.manager.connect(&scope).await?;

        if scope.run(backend.find_document(id, &self.collection)).await?.is_none() {
            return Err(DocumentStoreError::not_found(id, &self.collection));
        }

        let replaced = scope
            .run(backend.replace_document(id, document.to_bson()?, &self.collection))
            .await
            .inspect_err(|err| self.log_failure("update", err))?;

        // Deleted between the check and the replace.
        if !replaced {
            return Err(DocumentStoreError::not_found(id, &self.collection));
        }

        Ok(())
    }

    /// Removes the document with the given id.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::NotFound`] if there is no such document.
    pub async fn delete(&self, scope: &Scope, id: &str) -> DocumentStoreResult<()> {
        debug!(collection = %self.collection, id, "delete");

        let scope = scope.child(self.timeout);
        let backend = self.manager.connect(&scope).await?;

        if scope.run(backend.find_document(id, &self.collection)).await?.is_none() {
            return Err(DocumentStoreError::not_found(id, &self.collection));
        }

        let deleted = scope
            .run(backend.delete_document(id, &self.collection))
            .await
            .inspect_err(|err| self.log_failure("delete", err))?;

        if !deleted {
            return Err(DocumentStoreError::not_found(id, &self.collection));
        }

        Ok(())
    }

    /// Starts a transaction on this store's collection.
    ///
    /// The transaction must be finished with [`Transaction::commit`] or
    /// [`Transaction::rollback`].
    pub async fn begin_transaction(
        &self,
        scope: &Scope,
    ) -> DocumentStoreResult<Transaction<D, C::Backend>> {
        debug!(collection = %self.collection, "begin transaction");

        let scope = scope.child(self.timeout);
        let backend = self.manager.connect(&scope).await?;
        let session = scope.run(backend.start_session()).await?;

        Ok(Transaction::new(session, self.collection.clone(), self.timeout))
    }

    /// Disconnects the shared connection. Idempotent.
    ///
    /// Affects every store built on the same manager; the next operation reconnects.
    pub async fn disconnect(&self, scope: &Scope) -> DocumentStoreResult<()> {
        self.manager.disconnect(scope).await
    }

    fn log_failure(&self, operation: &'static str, err: &DocumentStoreError) {
        warn!(collection = %self.collection, operation, error = %err, "operation failed");
    }
}
