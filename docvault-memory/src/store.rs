//! In-memory storage implementation for document stores.
//!
//! Documents live as BSON values in nested maps (`collection -> id -> document`) behind an
//! async-aware read-write lock. A [`InMemoryConnector`] hands out [`InMemoryStore`] handles
//! onto the same data, so disconnecting and reconnecting keeps everything that was written.

use std::{
    cmp::Ordering as CmpOrdering,
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bson::Bson;
use mea::rwlock::RwLock;
use tracing::{debug, trace};

use docvault_core::{
    backend::{BackendSession, StoreBackend, StoreBackendConnector},
    config::StoreConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Query, SortDirection},
};

use crate::evaluator::{Comparable, DocumentEvaluator, lookup};

// Ordered by id so unsorted queries come back in a stable order.
type CollectionMap = BTreeMap<String, Bson>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state; clones share
/// the same data and the same open/closed state.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing).
///
/// # Example
///
/// ```ignore
/// use docvault_memory::InMemoryStore;
/// use docvault_core::backend::StoreBackend;
/// use bson::{Bson, doc};
///
/// let store = InMemoryStore::new();
/// let doc = Bson::Document(doc! { "id": "a1", "name": "Alice" });
/// store.insert_documents(vec![("a1".into(), doc)], "users").await?;
///
/// assert!(store.find_document("a1", "users").await?.is_some());
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    /// collection_name -> (document_id -> document)
    store: Arc<RwLock<StoreMap>>,
    open: Arc<AtomicBool>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty, open store.
    pub fn new() -> Self {
        Self::attach(Arc::new(RwLock::new(StoreMap::new())))
    }

    fn attach(store: Arc<RwLock<StoreMap>>) -> Self {
        Self {
            store,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// `false` once [`StoreBackend::shutdown`] has run on this handle.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Number of documents in `collection`.
    pub async fn len(&self, collection: &str) -> usize {
        self.store
            .read()
            .await
            .get(collection)
            .map_or(0, CollectionMap::len)
    }

    fn ensure_open(&self) -> DocumentStoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DocumentStoreError::Backend("in-memory connection is closed".into()))
        }
    }
}

/// Sort key of `field` in a stored value; missing fields sort as null.
fn sort_key<'a>(bson: &'a Bson, field: &str) -> Comparable<'a> {
    bson.as_document()
        .and_then(|doc| lookup(doc, field))
        .map(Comparable::from)
        .unwrap_or(Comparable::Null)
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    type Session = InMemorySession;

    async fn find_document(&self, id: &str, collection: &str) -> DocumentStoreResult<Option<Bson>> {
        self.ensure_open()?;

        Ok(self
            .store
            .read()
            .await
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn insert_documents(&self, documents: Vec<(String, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        self.ensure_open()?;

        let mut store = self.store.write().await;
        let collection_map = store.entry(collection.to_string()).or_default();

        for (id, doc) in documents {
            collection_map.insert(id, doc);
        }

        Ok(())
    }

    async fn replace_document(&self, id: &str, document: Bson, collection: &str) -> DocumentStoreResult<bool> {
        self.ensure_open()?;

        let mut store = self.store.write().await;
        let Some(existing) = store.get_mut(collection).and_then(|documents| documents.get_mut(id)) else {
            return Ok(false);
        };

        *existing = document;
        Ok(true)
    }

    async fn delete_document(&self, id: &str, collection: &str) -> DocumentStoreResult<bool> {
        self.ensure_open()?;

        Ok(self
            .store
            .write()
            .await
            .get_mut(collection)
            .and_then(|documents| documents.remove(id))
            .is_some())
    }

    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        self.ensure_open()?;

        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut documents = match &query.filter {
            Some(filter) => DocumentEvaluator::filter_documents(collection_map.values(), filter)?,
            None => collection_map.values().cloned().collect(),
        };

        if let Some(sort) = &query.sort {
            documents.sort_by(|a, b| {
                let (left, right) = (sort_key(a, &sort.field), sort_key(b, &sort.field));
                let ordering = left.partial_cmp(&right).unwrap_or(CmpOrdering::Equal);

                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        Ok(documents
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn start_session(&self) -> DocumentStoreResult<InMemorySession> {
        self.ensure_open()?;

        Ok(InMemorySession {
            store: self.clone(),
            pending: StoreMap::new(),
        })
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}

/// Session with buffered writes.
///
/// Inserts are kept in the session until [`BackendSession::commit`], which applies them
/// all under one write lock, or none of them if any id was taken in the meantime.
#[derive(Debug)]
pub struct InMemorySession {
    store: InMemoryStore,
    pending: StoreMap,
}

impl InMemorySession {
    /// Number of buffered, uncommitted documents.
    pub fn pending(&self) -> usize {
        self.pending.values().map(CollectionMap::len).sum()
    }
}

#[async_trait]
impl BackendSession for InMemorySession {
    async fn find_document(&mut self, id: &str, collection: &str) -> DocumentStoreResult<Option<Bson>> {
        if let Some(doc) = self.pending.get(collection).and_then(|documents| documents.get(id)) {
            return Ok(Some(doc.clone()));
        }

        self.store.find_document(id, collection).await
    }

    async fn insert_documents(&mut self, documents: Vec<(String, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        self.store.ensure_open()?;

        self.pending
            .entry(collection.to_string())
            .or_default()
            .extend(documents);

        Ok(())
    }

    async fn commit(self) -> DocumentStoreResult<()> {
        self.store.ensure_open()?;

        let mut store = self.store.store.write().await;

        for (collection, documents) in &self.pending {
            if let Some(existing) = store.get(collection) {
                if let Some(id) = documents.keys().find(|id| existing.contains_key(*id)) {
                    return Err(DocumentStoreError::conflict(id, collection));
                }
            }
        }

        let count = self.pending();
        for (collection, documents) in self.pending {
            store.entry(collection).or_default().extend(documents);
        }

        debug!(count, "in-memory transaction committed");
        Ok(())
    }

    async fn abort(self) -> DocumentStoreResult<()> {
        trace!(discarded = self.pending(), "in-memory transaction aborted");
        Ok(())
    }
}

/// Connects [`InMemoryStore`] handles to one shared dataset.
///
/// Every [`connect`](StoreBackendConnector::connect) returns a fresh, open handle onto the
/// same data. The configuration's host and database are ignored: a connector serves a
/// single in-process database.
#[derive(Clone, Debug, Default)]
pub struct InMemoryConnector {
    store: Arc<RwLock<StoreMap>>,
    connects: Arc<AtomicUsize>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times [`StoreBackendConnector::connect`] has been called.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::Acquire)
    }

    /// A handle onto the connector's data that bypasses connection management.
    pub fn store(&self) -> InMemoryStore {
        InMemoryStore::attach(self.store.clone())
    }
}

#[async_trait]
impl StoreBackendConnector for InMemoryConnector {
    type Backend = InMemoryStore;

    async fn connect(&self, config: &StoreConfig) -> DocumentStoreResult<InMemoryStore> {
        let attempt = self.connects.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(database = %config.database, attempt, "opening in-memory connection");

        Ok(self.store())
    }
}
