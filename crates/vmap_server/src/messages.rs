//! Request and response messages.

use vmap_core::{MapLeaf, SignedMapRoot, TreeId, LATEST_REVISION};

/// Reads many keys of one tree at one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetLeavesRequest {
    /// The tree to read.
    pub tree_id: TreeId,
    /// Keys to look up.
    pub keys: Vec<Vec<u8>>,
    /// Revision to read; `-1` reads the latest.
    pub revision: i64,
}

impl GetLeavesRequest {
    /// Creates a request for the latest revision.
    pub fn latest(tree_id: TreeId, keys: Vec<Vec<u8>>) -> Self {
        Self::at(tree_id, keys, LATEST_REVISION)
    }

    /// Creates a request for a specific revision.
    pub fn at(tree_id: TreeId, keys: Vec<Vec<u8>>, revision: i64) -> Self {
        Self {
            tree_id,
            keys,
            revision,
        }
    }
}

/// One key of a [`GetLeavesResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafResult {
    /// The requested key.
    pub key: Vec<u8>,
    /// The leaf at the read revision, or `None` if the key was never set.
    pub leaf: Option<MapLeaf>,
}

/// Result of [`GetLeavesRequest`], in request key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetLeavesResponse {
    /// One entry per requested key.
    pub leaves: Vec<LeafResult>,
    /// The root of the revision that was read; `None` at revision 0.
    pub map_root: Option<SignedMapRoot>,
}

/// Writes a batch of leaves as one new revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetLeavesRequest {
    /// The tree to write.
    pub tree_id: TreeId,
    /// Key and leaf pairs.
    pub leaves: Vec<(Vec<u8>, MapLeaf)>,
    /// Opaque data stored in the new root.
    pub metadata: Vec<u8>,
}

impl SetLeavesRequest {
    /// Creates a request without root metadata.
    pub fn new(tree_id: TreeId, leaves: Vec<(Vec<u8>, MapLeaf)>) -> Self {
        Self {
            tree_id,
            leaves,
            metadata: Vec::new(),
        }
    }

    /// Sets the root metadata.
    pub fn with_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Result of [`SetLeavesRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetLeavesResponse {
    /// The signed root of the committed revision.
    pub map_root: SignedMapRoot,
}

/// Fetches the latest root of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetSignedMapRootRequest {
    /// The tree.
    pub tree_id: TreeId,
}

/// Fetches the root of a specific revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetSignedMapRootByRevisionRequest {
    /// The tree.
    pub tree_id: TreeId,
    /// The revision; `-1` reads the latest.
    pub revision: i64,
}

/// A root lookup result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetSignedMapRootResponse {
    /// The root.
    pub map_root: SignedMapRoot,
}
