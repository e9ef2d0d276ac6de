//! Typed document store access layer over a remote document database.
//!
//! This crate is the core of the docvault project and provides:
//!
//! - **Documents** ([`document`]) - the trait stored types implement and their BSON conversion
//! - **Configuration** ([`config`]) - explicit settings with environment fallbacks
//! - **Execution scopes** ([`scope`]) - cancellable, deadline-bound operation contexts
//! - **Filters and queries** ([`query`]) - a small predicate AST translated by each backend
//! - **Backends** ([`backend`]) - traits a database driver implements
//! - **Connections** ([`connection`]) - lazily established, single-flight shared handles
//! - **Document store** ([`store`]) - create/find/update/delete with not-found and conflict outcomes
//! - **Transactions** ([`transaction`]) - all-or-nothing batches of creates
//! - **Errors** ([`error`]) - the error taxonomy and result alias
//!
//! # Example
//!
//! ```ignore
//! use docvault::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Donor {
//!     pub id: String,
//!     pub first_name: String,
//! }
//!
//! impl Document for Donor {
//!     fn id(&self) -> &str {
//!         &self.id
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docvault_core;

pub mod backend;
pub mod config;
pub mod connection;
pub mod document;
pub mod error;
pub mod query;
pub mod scope;
pub mod store;
pub mod transaction;
