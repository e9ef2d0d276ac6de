//! Transactional unit-of-work for batches of creates.
//!
//! A [`Transaction`] binds a backend session to one collection. Creates made through it
//! follow the same check-then-insert contract as
//! [`DocumentStore::create`](crate::store::DocumentStore::create), but stay invisible to
//! everyone else until [`Transaction::commit`]. Commit and rollback consume the
//! transaction, so it cannot be used after either.

use std::{collections::HashSet, marker::PhantomData, time::Duration};

use tracing::{debug, warn};

use crate::{
    backend::{BackendSession, StoreBackend},
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult},
    scope::Scope,
};

/// An open transaction on one collection.
pub struct Transaction<D: Document, B: StoreBackend> {
    session: Option<B::Session>,
    collection: String,
    timeout: Duration,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document, B: StoreBackend> Transaction<D, B> {
    pub(crate) fn new(session: B::Session, collection: String, timeout: Duration) -> Self {
        Self {
            session: Some(session),
            collection,
            timeout,
            _marker: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    // Only commit and rollback take the session, and both consume `self`.
    fn session(&mut self) -> DocumentStoreResult<&mut B::Session> {
        self.session
            .as_mut()
            .ok_or_else(|| DocumentStoreError::Backend("transaction already finished".into()))
    }

    /// Inserts `document` within the transaction unless its id is already taken,
    /// either in the collection or earlier in this transaction.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::Conflict`] if the id is taken.
    pub async fn create(&mut self, scope: &Scope, document: &D) -> DocumentStoreResult<()> {
        let id = document.id().to_string();
        debug!(collection = %self.collection, id, "transactional create");

        let bson = document.to_bson()?;
        let scope = scope.child(self.timeout);
        let collection = self.collection.clone();
        let session = self.session()?;

        if scope.run(session.find_document(&id, &collection)).await?.is_some() {
            return Err(DocumentStoreError::conflict(id, collection));
        }

        scope
            .run(session.insert_documents(vec![(id, bson)], &collection))
            .await
    }

    /// Inserts a batch within the transaction.
    ///
    /// Every id is checked first; on [`DocumentStoreError::Conflict`] nothing is added to
    /// the transaction. Combined with [`Transaction::commit`] the batch is all-or-nothing.
    pub async fn create_many(&mut self, scope: &Scope, documents: &[D]) -> DocumentStoreResult<()> {
        debug!(collection = %self.collection, count = documents.len(), "transactional create many");

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
        let collection = self.collection.clone();
        let session = self.session()?;

        for (id, _) in &entries {
            if scope.run(session.find_document(id, &collection)).await?.is_some() {
                return Err(DocumentStoreError::conflict(id, collection));
            }
        }

        scope.run(session.insert_documents(entries, &collection)).await
    }

    /// Makes every create in this transaction visible at once.
    ///
    /// The commit is not bounded by the store timeout, only by `scope`: abandoning a
    /// commit half way leaves its outcome unknown.
    pub async fn commit(mut self, scope: &Scope) -> DocumentStoreResult<()> {
        debug!(collection = %self.collection, "commit");

        match self.session.take() {
            Some(session) => scope.run(session.commit()).await,
            None => Ok(()),
        }
    }

    /// Discards every create in this transaction.
    pub async fn rollback(mut self, scope: &Scope) -> DocumentStoreResult<()> {
        debug!(collection = %self.collection, "rollback");

        match self.session.take() {
            Some(session) => scope.run(session.abort()).await,
            None => Ok(()),
        }
    }
}

impl<D: Document, B: StoreBackend> Drop for Transaction<D, B> {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(
                collection = %self.collection,
                "transaction dropped without commit or rollback, pending writes are discarded"
            );
        }
    }
}
