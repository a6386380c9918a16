//! # vmap Storage
//!
//! Byte-store backends for vmap.
//!
//! This crate provides the lowest-level storage abstraction used by the
//! durable map backend. Backends are **opaque byte stores**: they do not
//! interpret the journal frames written to them.
//!
//! ## Design Principles
//!
//! - Backends are append-only byte stores (read, append, sync, rewind)
//! - A commit group is appended with [`StorageBackend::append_group`], which
//!   either lands completely or leaves the store at its previous length
//! - No knowledge of journal frames, trees or revisions
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral stores
//! - [`FileBackend`] - For persistent storage using OS file APIs
//! - [`FaultyBackend`] - Wrapper that injects I/O failures on demand
//!
//! ## Example
//!
//! ```rust
//! use vmap_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append_group(&[b"hello".as_slice(), b" world".as_slice()]).unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod faulty;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use faulty::{FaultHandle, FaultyBackend};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
