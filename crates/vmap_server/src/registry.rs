//! Collaborators of the map server and the registry that holds them.

use crate::error::CollaboratorError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use vmap_core::{MapLeaf, MapStorage, Revision, SignedMapRoot, TreeId};

/// Metadata of a tree known to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeInfo {
    /// The tree.
    pub tree_id: TreeId,
    /// Human-readable name.
    pub display_name: String,
}

impl TreeInfo {
    /// Creates tree metadata.
    pub fn new(tree_id: TreeId, display_name: impl Into<String>) -> Self {
        Self {
            tree_id,
            display_name: display_name.into(),
        }
    }
}

/// Source of tree metadata.
///
/// The storage layer creates trees lazily; this is what decides whether a
/// tree exists as far as callers are concerned.
pub trait TreeProvider: Send + Sync {
    /// Returns the tree's metadata, or `None` if the tree is unknown.
    fn tree(&self, tree_id: TreeId) -> Option<TreeInfo>;
}

/// Signs root hashes.
pub trait RootSigner: Send + Sync {
    /// Signs `root_hash` on behalf of `tree`.
    fn sign(&self, tree: TreeId, root_hash: &[u8]) -> Result<Vec<u8>, CollaboratorError>;
}

/// Computes the root hash of a new revision.
pub trait RootHasher: Send + Sync {
    /// Returns the root hash of `revision`, given the root it follows (if
    /// any) and the leaves it writes.
    fn root_hash(
        &self,
        tree: TreeId,
        revision: Revision,
        previous_root: Option<&SignedMapRoot>,
        leaves: &[(Vec<u8>, MapLeaf)],
    ) -> Result<Vec<u8>, CollaboratorError>;
}

/// Tree metadata held in memory.
#[derive(Debug, Default)]
pub struct InMemoryTreeProvider {
    trees: RwLock<HashMap<TreeId, TreeInfo>>,
}

impl InMemoryTreeProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a tree.
    pub fn insert(&self, info: TreeInfo) {
        self.trees.write().insert(info.tree_id, info);
    }

    /// Removes a tree, returning its metadata.
    pub fn remove(&self, tree_id: TreeId) -> Option<TreeInfo> {
        self.trees.write().remove(&tree_id)
    }

    /// Returns the number of known trees.
    pub fn len(&self) -> usize {
        self.trees.read().len()
    }

    /// Returns true if no trees are known.
    pub fn is_empty(&self) -> bool {
        self.trees.read().is_empty()
    }
}

impl TreeProvider for InMemoryTreeProvider {
    fn tree(&self, tree_id: TreeId) -> Option<TreeInfo> {
        self.trees.read().get(&tree_id).cloned()
    }
}

/// Everything the server depends on, built once by the embedding process.
#[derive(Clone)]
pub struct Registry {
    /// Map storage.
    pub storage: Arc<dyn MapStorage>,
    /// Tree metadata.
    pub trees: Arc<dyn TreeProvider>,
    /// Root signer.
    pub signer: Arc<dyn RootSigner>,
    /// Root hasher.
    pub hasher: Arc<dyn RootHasher>,
}

impl Registry {
    /// Creates a registry.
    pub fn new(
        storage: Arc<dyn MapStorage>,
        trees: Arc<dyn TreeProvider>,
        signer: Arc<dyn RootSigner>,
        hasher: Arc<dyn RootHasher>,
    ) -> Self {
        Self {
            storage,
            trees,
            signer,
            hasher,
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_insert_and_remove() {
        let provider = InMemoryTreeProvider::new();
        assert!(provider.is_empty());

        provider.insert(TreeInfo::new(TreeId(1), "users"));
        provider.insert(TreeInfo::new(TreeId(2), "devices"));
        assert_eq!(provider.len(), 2);
        assert_eq!(
            provider.tree(TreeId(1)),
            Some(TreeInfo::new(TreeId(1), "users"))
        );

        provider.insert(TreeInfo::new(TreeId(1), "accounts"));
        assert_eq!(provider.tree(TreeId(1)).unwrap().display_name, "accounts");

        assert!(provider.remove(TreeId(2)).is_some());
        assert_eq!(provider.tree(TreeId(2)), None);
    }
}
