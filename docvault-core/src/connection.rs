//! Lazily established, shared backend connections.
//!
//! A [`ConnectionManager`] owns at most one live backend handle. The first operation that
//! needs it establishes it; every other caller either reuses the published handle or
//! waits for the establishment already in flight. Only one attempt runs at a time:
//!
//! 1. optimistic read of the published handle,
//! 2. take the establishment lock and look again,
//! 3. connect, publish, release.
//!
//! Wrap the manager in an [`Arc`] and pass it to several stores so stores that share
//! configuration share the connection too.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use mea::{mutex::Mutex, rwlock::RwLock};
use tracing::{debug, info, warn};

use crate::{
    backend::{StoreBackend, StoreBackendConnector},
    config::StoreConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    scope::Scope,
};

/// Upper bound for establishing a connection, independent of the operation timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the shared backend handle for one connector and configuration.
pub struct ConnectionManager<C: StoreBackendConnector> {
    config: StoreConfig,
    connector: C,
    connect_timeout: Duration,
    handle: RwLock<Option<Arc<C::Backend>>>,
    establish: Mutex<()>,
    established: AtomicUsize,
}

impl<C: StoreBackendConnector> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("connector", &self.connector)
            .field("connect_timeout", &self.connect_timeout)
            .field("established", &self.connections_established())
            .finish_non_exhaustive()
    }
}

impl<C: StoreBackendConnector> ConnectionManager<C> {
    pub fn new(config: StoreConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            connect_timeout: CONNECT_TIMEOUT,
            handle: RwLock::new(None),
            establish: Mutex::new(()),
            established: AtomicUsize::new(0),
        }
    }

    /// Overrides [`CONNECT_TIMEOUT`].
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Number of connections this manager has established so far.
    pub fn connections_established(&self) -> usize {
        self.established.load(Ordering::Acquire)
    }

    pub async fn is_connected(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// Returns the shared handle, establishing it first if there is none.
    ///
    /// Establishment runs within `scope`, further bounded by the connect timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Connection`] if the backend cannot be reached in
    /// time, and [`DocumentStoreError::Cancelled`] if `scope` is cancelled while waiting.
    pub async fn connect(&self, scope: &Scope) -> DocumentStoreResult<Arc<C::Backend>> {
        if let Some(handle) = self.handle.read().await.as_ref() {
            return Ok(handle.clone());
        }

        let _establishing = scope
            .run(async { Ok(self.establish.lock().await) })
            .await?;

        if let Some(handle) = self.handle.read().await.as_ref() {
            return Ok(handle.clone());
        }

        debug!(config = %self.config, "establishing connection");

        let attempt = scope.child(self.connect_timeout);
        let backend = attempt
            .run(self.connector.connect(&self.config))
            .await
            .map_err(|err| match err {
                DocumentStoreError::Timeout(_) => DocumentStoreError::Connection(format!(
                    "no connection to {} within {:?}",
                    self.config, self.connect_timeout
                )),
                DocumentStoreError::Backend(message) => DocumentStoreError::Connection(message),
                other => other,
            })
            .inspect_err(|err| warn!(config = %self.config, error = %err, "connection failed"))?;

        let backend = Arc::new(backend);
        *self.handle.write().await = Some(backend.clone());
        self.established.fetch_add(1, Ordering::AcqRel);

        info!(config = %self.config, "connected");
        Ok(backend)
    }

    /// Tears down the shared handle and returns to the not-connected state.
    ///
    /// A no-op when not connected. Operations that already hold the handle keep it and
    /// finish (or fail) against the closed connection.
    pub async fn disconnect(&self, scope: &Scope) -> DocumentStoreResult<()> {
        if self.handle.read().await.is_none() {
            return Ok(());
        }

        let _establishing = scope
            .run(async { Ok(self.establish.lock().await) })
            .await?;

        let Some(backend) = self.handle.write().await.take() else {
            return Ok(());
        };

        scope.run(backend.shutdown()).await?;

        info!(config = %self.config, "disconnected");
        Ok(())
    }
}
