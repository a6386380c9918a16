//! # vmap Server
//!
//! Service layer over the vmap storage contract.
//!
//! This crate provides:
//! - Request handlers for reading and writing leaves and roots ([`MapServer`])
//! - An explicit [`Registry`] of collaborators: storage, tree metadata,
//!   root hashing and root signing
//! - Translation of storage errors into transport status codes ([`Status`])
//!
//! # Architecture
//!
//! The server owns no state of its own. Everything it needs is injected once
//! through the registry:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vmap_core::MapStore;
//! use vmap_server::{InMemoryTreeProvider, MapServer, Registry, ServerConfig, TreeInfo};
//!
//! let trees = InMemoryTreeProvider::new();
//! trees.insert(TreeInfo::new(tree_id, "users"));
//!
//! let registry = Registry::new(
//!     Arc::new(MapStore::in_memory()),
//!     Arc::new(trees),
//!     signer,
//!     hasher,
//! );
//! let server = MapServer::new(ServerConfig::default(), registry);
//! ```
//!
//! # Write path
//!
//! `set_leaves` runs one write session:
//! 1. Begin a session on the tree
//! 2. Hash the new revision over the previous root and the leaves
//! 3. Sign the hash
//! 4. Stage every leaf, then the signed root, and commit
//!
//! Any failure drops the session, which rolls it back.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod messages;
mod registry;

pub use config::ServerConfig;
pub use error::{Code, CollaboratorError, ServerError, ServerResult, Status};
pub use handler::MapServer;
pub use messages::{
    GetLeavesRequest, GetLeavesResponse, GetSignedMapRootByRevisionRequest,
    GetSignedMapRootRequest, GetSignedMapRootResponse, LeafResult, SetLeavesRequest,
    SetLeavesResponse,
};
pub use registry::{
    InMemoryTreeProvider, Registry, RootHasher, RootSigner, TreeInfo, TreeProvider,
};
