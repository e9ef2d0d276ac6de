//! Shared fixtures for the integration tests: blood-bank documents, an instrumented
//! connector and store builders.

#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use docvault::{
    bson::Bson,
    memory::{InMemoryConnector, InMemorySession, InMemoryStore},
    prelude::*,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donor {
    pub id: String,
    pub birth_number: String,
    pub first_name: String,
    pub last_name: String,
    pub postal_code: String,
    pub blood_type: String,
    pub blood_rh: String,
    pub eligible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_donation: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub diseases: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Donor {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contents {
    pub erythrocytes: bool,
    pub leukocytes: bool,
    pub platelets: bool,
    pub plasma: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub donor_id: String,
    pub donation_id: String,
    pub status: String,
    pub frozen: bool,
    pub expiration: DateTime<Utc>,
    pub location: String,
    pub blood_type: String,
    pub blood_rh: String,
    pub contents: Contents,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Unit {
    fn id(&self) -> &str {
        &self.id
    }
}

pub fn registered_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, 9, 30, 0).unwrap()
}

pub fn donor(id: &str, blood_type: &str) -> Donor {
    Donor {
        id: id.to_string(),
        birth_number: "900101/1234".into(),
        first_name: "Peter".into(),
        last_name: "Novak".into(),
        postal_code: "81101".into(),
        blood_type: blood_type.to_string(),
        blood_rh: "+".into(),
        eligible: true,
        last_donation: None,
        email: Some(format!("{id}@example.com")),
        diseases: vec![],
        created_at: registered_at(),
        updated_at: registered_at(),
    }
}

pub fn unit(id: &str, donor: &Donor) -> Unit {
    Unit {
        id: id.to_string(),
        donor_id: donor.id.clone(),
        donation_id: format!("{id}-donation"),
        status: "unprocessed".into(),
        frozen: false,
        expiration: registered_at() + chrono::Duration::days(42),
        location: "BA".into(),
        blood_type: donor.blood_type.clone(),
        blood_rh: donor.blood_rh.clone(),
        contents: Contents {
            erythrocytes: true,
            leukocytes: true,
            platelets: true,
            plasma: true,
        },
        created_at: registered_at(),
        updated_at: registered_at(),
    }
}

/// Configuration that ignores the process environment.
pub fn config(collection: &str) -> StoreConfig {
    StoreConfig::builder().collection(collection).resolve_with(|_| None)
}

pub fn donor_store(connector: InMemoryConnector) -> DocumentStore<Donor, InMemoryConnector> {
    DocumentStore::new(config("donor"), connector)
}

/// Backend calls that a [`StubConnector`] can be told to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Find,
    Insert,
    Replace,
    Delete,
}

/// Message of every injected backend failure.
pub const INJECTED: &str = "boom";

/// Connector that counts attempts and can be made slow or flaky.
///
/// Like the MongoDB driver, its backends reject an empty bulk insert.
#[derive(Clone, Debug, Default)]
pub struct StubConnector {
    inner: InMemoryConnector,
    attempts: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
    connect_delay: Duration,
    latency: Duration,
    failing: Vec<Op>,
    vanishing: bool,
}

impl StubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Delay applied to every backend call.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The next `count` attempts are refused.
    pub fn refuse(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Every call to one of `ops` fails with a backend error.
    pub fn fail_ops(mut self, ops: impl IntoIterator<Item = Op>) -> Self {
        self.failing.extend(ops);
        self
    }

    /// Documents disappear right before they are replaced or deleted, as if another
    /// writer removed them after the existence check.
    pub fn vanishing(mut self) -> Self {
        self.vanishing = true;
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn data(&self) -> InMemoryStore {
        self.inner.store()
    }
}

#[async_trait]
impl StoreBackendConnector for StubConnector {
    type Backend = StubBackend;

    async fn connect(&self, config: &StoreConfig) -> DocumentStoreResult<StubBackend> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.connect_delay).await;

        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(DocumentStoreError::Backend("connection refused".into()));
        }

        Ok(StubBackend {
            inner: self.inner.connect(config).await?,
            latency: self.latency,
            failing: self.failing.clone(),
            vanishing: self.vanishing,
        })
    }
}

fn reject_empty(documents: &[(String, Bson)]) -> DocumentStoreResult<()> {
    if documents.is_empty() {
        return Err(DocumentStoreError::Backend("no documents provided to insert".into()));
    }
    Ok(())
}

#[derive(Debug)]
pub struct StubBackend {
    inner: InMemoryStore,
    latency: Duration,
    failing: Vec<Op>,
    vanishing: bool,
}

impl StubBackend {
    async fn pause(&self, op: Op) -> DocumentStoreResult<()> {
        tokio::time::sleep(self.latency).await;
        if self.failing.contains(&op) {
            return Err(DocumentStoreError::Backend(INJECTED.into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for StubBackend {
    type Session = StubSession;

    async fn find_document(&self, id: &str, collection: &str) -> DocumentStoreResult<Option<Bson>> {
        self.pause(Op::Find).await?;
        self.inner.find_document(id, collection).await
    }

    async fn insert_documents(&self, documents: Vec<(String, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        self.pause(Op::Insert).await?;
        reject_empty(&documents)?;
        self.inner.insert_documents(documents, collection).await
    }

    async fn replace_document(&self, id: &str, document: Bson, collection: &str) -> DocumentStoreResult<bool> {
        self.pause(Op::Replace).await?;
        if self.vanishing {
            self.inner.delete_document(id, collection).await?;
        }
        self.inner.replace_document(id, document, collection).await
    }

    async fn delete_document(&self, id: &str, collection: &str) -> DocumentStoreResult<bool> {
        self.pause(Op::Delete).await?;
        if self.vanishing {
            self.inner.delete_document(id, collection).await?;
        }
        self.inner.delete_document(id, collection).await
    }

    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        self.pause(Op::Find).await?;
        self.inner.query_documents(query, collection).await
    }

    async fn start_session(&self) -> DocumentStoreResult<StubSession> {
        Ok(StubSession {
            inner: self.inner.start_session().await?,
        })
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.inner.shutdown().await
    }
}

pub struct StubSession {
    inner: InMemorySession,
}

#[async_trait]
impl BackendSession for StubSession {
    async fn find_document(&mut self, id: &str, collection: &str) -> DocumentStoreResult<Option<Bson>> {
        self.inner.find_document(id, collection).await
    }

    async fn insert_documents(&mut self, documents: Vec<(String, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        reject_empty(&documents)?;
        self.inner.insert_documents(documents, collection).await
    }

    async fn commit(self) -> DocumentStoreResult<()> {
        self.inner.commit().await
    }

    async fn abort(self) -> DocumentStoreResult<()> {
        self.inner.abort().await
    }
}
