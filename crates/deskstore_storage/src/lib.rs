//! # DeskStore Storage
//!
//! Key-value storage trait and implementations for DeskStore.
//!
//! This crate provides the lowest-level persistence abstraction: a flat
//! string-to-string map, shaped like the persistent key-value storage a
//! browser exposes. Storage implementations are **opaque**: they do not
//! know about records, modules or owners.
//!
//! ## Design Principles
//!
//! - Values are whole strings; every write replaces the previous value
//! - Shared by reference: all operations take `&self`
//! - Must be `Send + Sync` for concurrent access
//! - DeskStore owns the key layout and the JSON format of values
//!
//! ## Available Storages
//!
//! - [`InMemoryStorage`] - For testing and ephemeral data, with optional quota
//! - [`FileStorage`] - One file per key inside a directory
//!
//! ## Example
//!
//! ```rust
//! use deskstore_storage::{KeyValueStorage, InMemoryStorage};
//!
//! let storage = InMemoryStorage::new();
//! storage.set("greeting", "hello world").unwrap();
//! assert_eq!(storage.get("greeting").unwrap().as_deref(), Some("hello world"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::KeyValueStorage;
pub use error::{StorageError, StorageResult};
pub use file::FileStorage;
pub use memory::InMemoryStorage;
