//! # murmur-store
//!
//! String-keyed, versioned key-value storage for the DM layer.
//!
//! Records are whole-value blobs wrapped in a [`VersionedObject`]. The
//! [`KeyValue`] trait is implemented by an in-memory map for tests and
//! ephemeral clients, and by a SQLite-backed [`Database`] for durable state.

pub mod database;
pub mod kv;
pub mod memory;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use kv::{load_json, save_json, KeyValue};
pub use memory::MemoryKv;
pub use models::VersionedObject;
