//! Convenient re-exports of commonly used types from docvault.
//!
//! ```ignore
//! use docvault::prelude::*;
//! ```

pub use docvault_core::{
    backend::{BackendSession, StoreBackend, StoreBackendConnector},
    config::{StoreConfig, StoreConfigBuilder},
    connection::{CONNECT_TIMEOUT, ConnectionManager},
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    scope::Scope,
    store::DocumentStore,
    transaction::Transaction,
};
