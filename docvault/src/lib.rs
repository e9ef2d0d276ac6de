//! Typed document storage with lazily shared connections and bounded operations.
//!
//! This crate is the entry point for docvault. It re-exports the core types from
//! `docvault-core` and the available backends.
//!
//! # Features
//!
//! - **Typed collections** - one [`DocumentStore`](store::DocumentStore) per document type and collection
//! - **Conflict-aware writes** - creates report `Conflict`, id-targeted operations report `NotFound`
//! - **Lazy, shared connections** - established once on first use, however many tasks race for it
//! - **Bounded operations** - every call runs inside a [`Scope`](scope::Scope) with a deadline
//! - **Transactions** - batch creates that become visible together on commit
//!
//! # Quick Start
//!
//! ```ignore
//! use docvault::{prelude::*, memory::InMemoryConnector};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Donor {
//!     pub id: String,
//!     pub first_name: String,
//!     pub blood_type: String,
//! }
//!
//! impl Document for Donor {
//!     fn id(&self) -> &str { &self.id }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let config = StoreConfig::builder().collection("donor").resolve();
//!     let donors = DocumentStore::<Donor, _>::new(config, InMemoryConnector::new());
//!     let scope = Scope::background();
//!
//!     let donor = Donor { id: "d1".into(), first_name: "Peter".into(), blood_type: "AB".into() };
//!     donors.create(&scope, &donor).await?;
//!
//!     // A second create with the same id is a conflict.
//!     assert!(donors.create(&scope, &donor).await.unwrap_err().is_conflict());
//!
//!     let ab = donors.find_many(&scope, Some(Filter::matching([("blood_type", "AB")]))).await?;
//!     assert_eq!(ab.len(), 1);
//!
//!     donors.disconnect(&scope).await
//! }
//! ```
//!
//! # Sharing a connection
//!
//! Stores built from one [`ConnectionManager`](connection::ConnectionManager) share its
//! connection:
//!
//! ```ignore
//! let manager = Arc::new(ConnectionManager::new(StoreConfig::from_env(), connector));
//! let donors = DocumentStore::<Donor, _>::with_manager_for(manager.clone(), "donor");
//! let units = DocumentStore::<Unit, _>::with_manager_for(manager, "unit");
//! ```
//!
//! # Transactions
//!
//! ```ignore
//! let mut tx = units.begin_transaction(&scope).await?;
//! tx.create_many(&scope, &batch).await?;
//! tx.commit(&scope).await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - in-process storage for development and testing
//! - `mongodb` - MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use docvault_core::{backend, config, connection, document, error, query, scope, store, transaction};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docvault_memory::{InMemoryConnector, InMemorySession, InMemoryStore};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docvault_mongodb::{MongoDbConnector, MongoDbSession, MongoDbStore};
}
