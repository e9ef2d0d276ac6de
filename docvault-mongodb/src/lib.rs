//! MongoDB backend implementation for docvault.
//!
//! Documents are stored as-is and looked up by their `id` field; the server-assigned
//! `_id` never reaches callers. Enable it through the facade crate:
//!
//! ```toml
//! [dependencies]
//! docvault = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! [`MongoDbConnector`] builds the connection string from a
//! [`StoreConfig`](docvault_core::config::StoreConfig), applies the connect timeout to
//! both socket connect and server selection, and pings the server before returning.
//!
//! # Transactions
//!
//! [`MongoDbSession`] wraps a driver session with an open multi-document transaction.
//! The server must be a replica set or sharded cluster.
//!
//! # Example
//!
//! ```ignore
//! use docvault::{prelude::*, mongodb::MongoDbConnector};
//!
//! let config = StoreConfig::builder().collection("unit").resolve();
//! let units = DocumentStore::<Unit, _>::new(config, MongoDbConnector::new());
//! let frozen = units.find_many(&Scope::background(), Some(Filter::eq("frozen", true))).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docvault_mongodb;

mod query;
pub mod store;

pub use store::{MongoDbConnector, MongoDbSession, MongoDbStore};
