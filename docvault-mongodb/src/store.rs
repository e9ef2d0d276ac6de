use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, ClientSession, Collection as MongoCollection,
    options::{ClientOptions, FindOptions},
};
use tracing::{debug, info};

use docvault_core::{
    backend::{BackendSession, StoreBackend, StoreBackendConnector},
    config::StoreConfig,
    connection::CONNECT_TIMEOUT,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Query, SortDirection},
};

use crate::query::MongoQueryTranslator;

fn backend_error(err: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

fn prepare_document(document: Bson) -> DocumentStoreResult<Document> {
    match document {
        Bson::Document(doc) => Ok(doc),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "expected a document, got {:?}",
            other.element_type()
        ))),
    }
}

/// Drops the server-generated `_id`; documents are keyed by their own `id` field.
fn restore_document(mut document: Document) -> Bson {
    document.remove("_id");
    Bson::Document(document)
}

/// A connected MongoDB client bound to one database.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client.database(&self.database).collection(collection_name)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    type Session = MongoDbSession;

    async fn find_document(&self, id: &str, collection: &str) -> DocumentStoreResult<Option<Bson>> {
        Ok(self
            .get_collection(collection)
            .find_one(doc! { "id": id })
            .await
            .map_err(backend_error)?
            .map(restore_document))
    }

    async fn insert_documents(&self, documents: Vec<(String, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        // The driver rejects an empty insert_many.
        if documents.is_empty() {
            return Ok(());
        }

        let documents = documents
            .into_iter()
            .map(|(_, doc)| prepare_document(doc))
            .collect::<DocumentStoreResult<Vec<Document>>>()?;

        // Ordered: stops at the first failure, earlier documents stay inserted.
        self.get_collection(collection)
            .insert_many(documents)
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn replace_document(&self, id: &str, document: Bson, collection: &str) -> DocumentStoreResult<bool> {
        let result = self
            .get_collection(collection)
            .replace_one(doc! { "id": id }, prepare_document(document)?)
            .await
            .map_err(backend_error)?;

        Ok(result.matched_count > 0)
    }

    async fn delete_document(&self, id: &str, collection: &str) -> DocumentStoreResult<bool> {
        let result = self
            .get_collection(collection)
            .delete_one(doc! { "id": id })
            .await
            .map_err(backend_error)?;

        Ok(result.deleted_count > 0)
    }

    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip as u64);
        }
        if let Some(sort) = &query.sort {
            options.sort = Some(doc! {
                sort.field.clone(): match sort.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                }
            })
        }

        let filter = MongoQueryTranslator::translate(query.filter.as_ref())?;

        Ok(self
            .get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)?
            .into_iter()
            .map(restore_document)
            .collect())
    }

    async fn start_session(&self) -> DocumentStoreResult<MongoDbSession> {
        let mut session = self.client.start_session().await.map_err(backend_error)?;
        session.start_transaction().await.map_err(backend_error)?;

        Ok(MongoDbSession {
            session,
            database: self.database.clone(),
        })
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        // Does not wait for sessions and cursors still held by in-flight operations.
        self.client.clone().shutdown().immediate(true).await;
        Ok(())
    }
}

/// A client session with an open multi-document transaction.
///
/// Requires a replica set or sharded cluster; standalone servers reject transactions
/// when the session starts.
pub struct MongoDbSession {
    session: ClientSession,
    database: String,
}

impl MongoDbSession {
    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.session
            .client()
            .database(&self.database)
            .collection(collection_name)
    }
}

#[async_trait]
impl BackendSession for MongoDbSession {
    async fn find_document(&mut self, id: &str, collection: &str) -> DocumentStoreResult<Option<Bson>> {
        Ok(self
            .get_collection(collection)
            .find_one(doc! { "id": id })
            .session(&mut self.session)
            .await
            .map_err(backend_error)?
            .map(restore_document))
    }

    async fn insert_documents(&mut self, documents: Vec<(String, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        // The driver rejects an empty insert_many.
        if documents.is_empty() {
            return Ok(());
        }

        let documents = documents
            .into_iter()
            .map(|(_, doc)| prepare_document(doc))
            .collect::<DocumentStoreResult<Vec<Document>>>()?;

        self.get_collection(collection)
            .insert_many(documents)
            .session(&mut self.session)
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn commit(mut self) -> DocumentStoreResult<()> {
        self.session.commit_transaction().await.map_err(backend_error)
    }

    async fn abort(mut self) -> DocumentStoreResult<()> {
        self.session.abort_transaction().await.map_err(backend_error)
    }
}

/// Opens [`MongoDbStore`] connections from a [`StoreConfig`].
///
/// The server is pinged before the connection is handed out, so an unreachable server
/// fails the connect rather than the first operation.
#[derive(Clone, Debug, Default)]
pub struct MongoDbConnector {
    app_name: Option<String>,
}

impl MongoDbConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Application name reported to the server.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

#[async_trait]
impl StoreBackendConnector for MongoDbConnector {
    type Backend = MongoDbStore;

    async fn connect(&self, config: &StoreConfig) -> DocumentStoreResult<MongoDbStore> {
        let connection_error = |err: mongodb::error::Error| DocumentStoreError::Connection(err.to_string());

        let mut options = ClientOptions::parse(config.connection_uri())
            .await
            .map_err(connection_error)?;
        options.connect_timeout = Some(CONNECT_TIMEOUT);
        options.server_selection_timeout = Some(CONNECT_TIMEOUT);
        if let Some(app_name) = &self.app_name {
            options.app_name = Some(app_name.clone());
        }

        let client = Client::with_options(options).map_err(connection_error)?;

        debug!(%config, "pinging server");
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connection_error)?;

        info!(%config, "mongodb connection established");
        Ok(MongoDbStore::new(client, config.database.clone()))
    }
}
