//! In-memory document storage backend for docvault.
//!
//! Implements the backend traits of `docvault-core` on top of async-aware read-write
//! locks. Suited to development and tests; data is lost when the connector is dropped.
//!
//! # Features
//!
//! - **Shared data across connects** - reconnecting sees everything written before
//! - **Full query support** - filtering on nested paths, sorting and paging
//! - **Buffered transactions** - commit applies a session's writes all at once
//!
//! # Quick Start
//!
//! ```ignore
//! use docvault::{prelude::*, memory::InMemoryConnector};
//!
//! let connector = InMemoryConnector::new();
//! let config = StoreConfig::builder().collection("donor").resolve();
//! let donors = DocumentStore::<Donor, _>::new(config, connector.clone());
//!
//! donors.create(&Scope::background(), &donor).await?;
//! assert_eq!(connector.connects(), 1);
//! ```

#[allow(unused_extern_crates)]
extern crate self as docvault_memory;

mod evaluator;
pub mod store;

pub use store::{InMemoryConnector, InMemorySession, InMemoryStore};
