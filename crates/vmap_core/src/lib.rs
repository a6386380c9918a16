//! # vmap Core
//!
//! Transactional storage core for a revisioned, verifiable key-value map.
//!
//! Every batch of key updates produces a new immutable revision of a tree,
//! summarized by a signed root. This crate provides:
//! - The data model: [`MapLeaf`], [`SignedMapRoot`], [`Revision`], [`TreeId`]
//! - The storage contract: [`MapStorage`], [`MapTx`], [`ReadOnlyMapTx`]
//! - [`MapStore`], the reference implementation, in memory or journaled
//! - The error taxonomy: [`MapError`] and [`ErrorKind`]
//!
//! ## Guarantees
//!
//! - **Atomicity**: a commit publishes all of its writes and its root, or nothing
//! - **Gapless revisions**: failed and rolled-back sessions consume no revision
//! - **Single writer**: one open write session per tree
//! - **Repeatable reads**: a snapshot never sees commits made after it opened
//! - **Durability**: a journaled store replays every acknowledged commit

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod index;
pub mod journal;
mod leaf;
mod log;
mod map;
mod root;
mod session;
mod store;
mod tree;
mod types;

pub use config::{Config, WriterPolicy};
pub use dir::{journal_path, MapDir};
pub use error::{ErrorKind, MapError, MapResult};
pub use journal::Journal;
pub use leaf::MapLeaf;
pub use log::{CommitLog, CommitRecord, NullLog};
pub use map::{
    with_write_session, MapReader, MapStorage, MapTx, ReadOnlyMapStorage, ReadOnlyMapTx,
};
pub use root::{now_nanos, SignedMapRoot};
pub use session::{Snapshot, WriteSession};
pub use store::{MapStore, TreeStats};
pub use types::{Revision, TreeId, LATEST_REVISION};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
