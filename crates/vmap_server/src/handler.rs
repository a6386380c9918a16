//! Request handlers for the map service.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::messages::{
    GetLeavesRequest, GetLeavesResponse, GetSignedMapRootByRevisionRequest,
    GetSignedMapRootRequest, GetSignedMapRootResponse, LeafResult, SetLeavesRequest,
    SetLeavesResponse,
};
use crate::registry::{Registry, TreeInfo};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};
use vmap_core::{MapError, MapTx, SignedMapRoot, TreeId};

/// Tree probed by [`MapServer::is_healthy`]. Snapshots never register trees,
/// so probing leaves no trace in storage.
const HEALTH_PROBE_TREE: TreeId = TreeId(0);

/// Handler for map requests.
///
/// Stateless apart from its configuration and registry; share it behind an
/// `Arc` across request threads.
#[derive(Debug)]
pub struct MapServer {
    config: ServerConfig,
    registry: Registry,
}

impl MapServer {
    /// Creates a server.
    pub fn new(config: ServerConfig, registry: Registry) -> Self {
        Self { config, registry }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Reads many keys at one revision.
    ///
    /// Absent keys come back with `leaf: None`, in request order. Revision 0
    /// of a written tree has no root, so its `map_root` is `None`; a tree
    /// with no revisions at all fails with `NoRootsYet`.
    pub fn get_leaves(&self, request: GetLeavesRequest) -> ServerResult<GetLeavesResponse> {
        self.lookup_tree(request.tree_id)?;
        self.check_keys(request.keys.iter().map(Vec::as_slice))?;

        let snapshot = self.registry.storage.snapshot(request.tree_id)?;
        let map_root = match snapshot.signed_map_root_at(request.revision) {
            Ok(root) => Some(root),
            Err(MapError::NotFound { .. }) => None,
            Err(err) => return Err(err.into()),
        };

        let mut leaves = Vec::with_capacity(request.keys.len());
        for key in request.keys {
            let leaf = snapshot.get(request.revision, &key)?;
            leaves.push(LeafResult { key, leaf });
        }

        debug!(
            tree = %request.tree_id,
            revision = request.revision,
            keys = leaves.len(),
            "leaves read"
        );
        Ok(GetLeavesResponse { leaves, map_root })
    }

    /// Writes a batch of leaves as one new revision and returns its signed root.
    ///
    /// On any failure, including the deadline passing before commit, the
    /// write session is dropped and the tree is left unchanged.
    pub fn set_leaves(&self, request: SetLeavesRequest) -> ServerResult<SetLeavesResponse> {
        let deadline = Instant::now() + self.config.request_timeout;
        let tree = request.tree_id;
        self.lookup_tree(tree)?;
        self.check_keys(request.leaves.iter().map(|(key, _)| key.as_slice()))?;

        let result = self.write_leaves(request, deadline);
        match &result {
            Ok(response) => info!(
                tree = %tree,
                revision = %response.map_root.map_revision,
                "leaves committed"
            ),
            Err(err) => warn!(
                tree = %tree,
                status = %err.status().code,
                error = %err,
                "set_leaves failed"
            ),
        }
        result
    }

    fn write_leaves(
        &self,
        request: SetLeavesRequest,
        deadline: Instant,
    ) -> ServerResult<SetLeavesResponse> {
        let tree = request.tree_id;
        let mut tx = self.registry.storage.begin(tree)?;
        self.check_deadline(deadline)?;

        let revision = tx.write_revision();
        let previous_root = previous_root(tx.as_ref())?;
        let root_hash = self
            .registry
            .hasher
            .root_hash(tree, revision, previous_root.as_ref(), &request.leaves)
            .map_err(ServerError::Hasher)?;
        let signature = self
            .registry
            .signer
            .sign(tree, &root_hash)
            .map_err(ServerError::Signer)?;

        for (key, leaf) in request.leaves {
            tx.set(&key, leaf)?;
        }

        let map_root = SignedMapRoot::new(revision, root_hash)
            .with_signature(signature)
            .with_metadata(request.metadata);
        tx.store_signed_map_root(map_root.clone())?;

        self.check_deadline(deadline)?;
        tx.commit()?;
        Ok(SetLeavesResponse { map_root })
    }

    /// Returns the latest root of a tree.
    pub fn get_signed_map_root(
        &self,
        request: GetSignedMapRootRequest,
    ) -> ServerResult<GetSignedMapRootResponse> {
        self.lookup_tree(request.tree_id)?;
        let snapshot = self.registry.storage.snapshot(request.tree_id)?;
        let map_root = snapshot.latest_signed_map_root()?;
        Ok(GetSignedMapRootResponse { map_root })
    }

    /// Returns the root of a specific revision.
    pub fn get_signed_map_root_by_revision(
        &self,
        request: GetSignedMapRootByRevisionRequest,
    ) -> ServerResult<GetSignedMapRootResponse> {
        self.lookup_tree(request.tree_id)?;
        let snapshot = self.registry.storage.snapshot(request.tree_id)?;
        let map_root = snapshot.signed_map_root_at(request.revision)?;
        Ok(GetSignedMapRootResponse { map_root })
    }

    /// Returns true if storage can open a snapshot.
    pub fn is_healthy(&self) -> bool {
        match self.registry.storage.snapshot(HEALTH_PROBE_TREE) {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "health check failed");
                false
            }
        }
    }

    fn lookup_tree(&self, tree: TreeId) -> ServerResult<TreeInfo> {
        self.registry
            .trees
            .tree(tree)
            .ok_or(ServerError::UnknownTree(tree))
    }

    fn check_keys<'a>(&self, keys: impl ExactSizeIterator<Item = &'a [u8]>) -> ServerResult<()> {
        let max = self.config.max_leaves_per_request;
        if keys.len() > max {
            return Err(ServerError::invalid_argument(format!(
                "too many leaves: {} > {max}",
                keys.len()
            )));
        }

        let mut seen = HashSet::new();
        for (index, key) in keys.enumerate() {
            if key.is_empty() {
                return Err(ServerError::invalid_argument(format!(
                    "key {index} is empty"
                )));
            }
            if !seen.insert(key) {
                return Err(ServerError::invalid_argument(format!(
                    "key {index} is a duplicate"
                )));
            }
        }
        Ok(())
    }

    fn check_deadline(&self, deadline: Instant) -> ServerResult<()> {
        if Instant::now() >= deadline {
            return Err(ServerError::DeadlineExceeded(self.config.request_timeout));
        }
        Ok(())
    }
}

/// The root the new revision follows, or `None` for a tree's first write.
fn previous_root(tx: &dyn MapTx) -> ServerResult<Option<SignedMapRoot>> {
    match tx.latest_signed_map_root() {
        Ok(root) => Ok(Some(root)),
        Err(MapError::NoRootsYet { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Code, CollaboratorError};
    use crate::registry::{InMemoryTreeProvider, RootHasher, RootSigner};
    use sha2::{Digest, Sha256};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use vmap_core::{MapLeaf, MapStorage, MapStore, Revision};

    const TREE: TreeId = TreeId(7);

    struct Sha256Signer;

    impl RootSigner for Sha256Signer {
        fn sign(&self, tree: TreeId, root_hash: &[u8]) -> Result<Vec<u8>, CollaboratorError> {
            let mut hasher = Sha256::new();
            hasher.update(b"test-signing-key");
            hasher.update(tree.as_i64().to_le_bytes());
            hasher.update(root_hash);
            Ok(hasher.finalize().to_vec())
        }
    }

    struct Sha256Hasher {
        delay: Duration,
    }

    impl RootHasher for Sha256Hasher {
        fn root_hash(
            &self,
            _tree: TreeId,
            revision: Revision,
            previous_root: Option<&SignedMapRoot>,
            leaves: &[(Vec<u8>, MapLeaf)],
        ) -> Result<Vec<u8>, CollaboratorError> {
            thread::sleep(self.delay);
            let mut hasher = Sha256::new();
            if let Some(previous) = previous_root {
                hasher.update(&previous.root_hash);
            }
            hasher.update(revision.as_u64().to_le_bytes());
            for (key, leaf) in leaves {
                hasher.update(key);
                hasher.update(&leaf.leaf_value);
            }
            Ok(hasher.finalize().to_vec())
        }
    }

    struct FailingSigner;

    impl RootSigner for FailingSigner {
        fn sign(&self, _tree: TreeId, _root_hash: &[u8]) -> Result<Vec<u8>, CollaboratorError> {
            Err(CollaboratorError::new("key unavailable"))
        }
    }

    fn registry_with(
        store: Arc<MapStore>,
        signer: Arc<dyn RootSigner>,
        delay: Duration,
    ) -> Registry {
        let trees = InMemoryTreeProvider::new();
        trees.insert(TreeInfo::new(TREE, "test"));
        Registry::new(
            store,
            Arc::new(trees),
            signer,
            Arc::new(Sha256Hasher { delay }),
        )
    }

    fn create_server() -> (MapServer, Arc<MapStore>) {
        let store = Arc::new(MapStore::in_memory());
        let registry = registry_with(Arc::clone(&store), Arc::new(Sha256Signer), Duration::ZERO);
        (MapServer::new(ServerConfig::default(), registry), store)
    }

    fn leaves(pairs: &[(&[u8], &[u8])]) -> Vec<(Vec<u8>, MapLeaf)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_vec(), MapLeaf::new(*value)))
            .collect()
    }

    #[test]
    fn set_then_get() {
        let (server, _store) = create_server();

        let first = server
            .set_leaves(SetLeavesRequest::new(TREE, leaves(&[(b"a", b"1"), (b"b", b"2")])))
            .unwrap();
        assert_eq!(first.map_root.map_revision, Revision::new(1));
        assert_eq!(first.map_root.root_hash.len(), 32);
        assert_eq!(first.map_root.signature.len(), 32);

        let second = server
            .set_leaves(
                SetLeavesRequest::new(TREE, leaves(&[(b"a", b"3")])).with_metadata(b"m".to_vec()),
            )
            .unwrap();
        assert_eq!(second.map_root.map_revision, Revision::new(2));
        assert_eq!(second.map_root.metadata, b"m");
        assert_ne!(second.map_root.root_hash, first.map_root.root_hash);

        let latest = server
            .get_leaves(GetLeavesRequest::latest(
                TREE,
                vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()],
            ))
            .unwrap();
        assert_eq!(latest.map_root, Some(second.map_root));
        let values: Vec<Option<Vec<u8>>> = latest
            .leaves
            .iter()
            .map(|r| r.leaf.as_ref().map(|l| l.leaf_value.clone()))
            .collect();
        assert_eq!(values, vec![Some(b"3".to_vec()), Some(b"2".to_vec()), None]);

        let historic = server
            .get_leaves(GetLeavesRequest::at(TREE, vec![b"a".to_vec()], 1))
            .unwrap();
        assert_eq!(historic.map_root, Some(first.map_root));
        assert_eq!(historic.leaves[0].leaf.as_ref().unwrap().leaf_value, b"1");
    }

    #[test]
    fn root_lookups() {
        let (server, _store) = create_server();
        let err = server
            .get_signed_map_root(GetSignedMapRootRequest { tree_id: TREE })
            .unwrap_err();
        assert_eq!(err.status().code, Code::NotFound);

        let written = server
            .set_leaves(SetLeavesRequest::new(TREE, leaves(&[(b"k", b"v")])))
            .unwrap();
        server
            .set_leaves(SetLeavesRequest::new(TREE, leaves(&[(b"k", b"w")])))
            .unwrap();

        let by_revision = server
            .get_signed_map_root_by_revision(GetSignedMapRootByRevisionRequest {
                tree_id: TREE,
                revision: 1,
            })
            .unwrap();
        assert_eq!(by_revision.map_root, written.map_root);

        let latest = server
            .get_signed_map_root(GetSignedMapRootRequest { tree_id: TREE })
            .unwrap();
        assert_eq!(latest.map_root.map_revision, Revision::new(2));

        let err = server
            .get_signed_map_root_by_revision(GetSignedMapRootByRevisionRequest {
                tree_id: TREE,
                revision: 9,
            })
            .unwrap_err();
        assert_eq!(err.status().code, Code::InvalidArgument);
    }

    #[test]
    fn get_leaves_on_empty_tree() {
        let (server, _store) = create_server();
        let err = server
            .get_leaves(GetLeavesRequest::latest(TREE, vec![b"a".to_vec()]))
            .unwrap_err();
        assert!(matches!(err, ServerError::Map(MapError::NoRootsYet { .. })));
        assert_eq!(err.status().code, Code::NotFound);
    }

    #[test]
    fn get_leaves_at_revision_zero() {
        let (server, _store) = create_server();
        server
            .set_leaves(SetLeavesRequest::new(TREE, leaves(&[(b"a", b"1")])))
            .unwrap();

        let before_writes = server
            .get_leaves(GetLeavesRequest::at(TREE, vec![b"a".to_vec()], 0))
            .unwrap();
        assert_eq!(before_writes.map_root, None);
        assert_eq!(
            before_writes.leaves,
            vec![LeafResult {
                key: b"a".to_vec(),
                leaf: None
            }]
        );
    }

    #[test]
    fn unknown_tree() {
        let (server, store) = create_server();
        let err = server
            .set_leaves(SetLeavesRequest::new(TreeId(99), leaves(&[(b"a", b"1")])))
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownTree(TreeId(99))));
        assert_eq!(err.status().code, Code::NotFound);
        assert!(store.trees().is_empty());
    }

    #[test]
    fn request_validation() {
        let (server, store) = create_server();

        let empty_key = server
            .set_leaves(SetLeavesRequest::new(TREE, leaves(&[(b"", b"1")])))
            .unwrap_err();
        assert_eq!(empty_key.status().code, Code::InvalidArgument);

        let duplicate = server
            .set_leaves(SetLeavesRequest::new(TREE, leaves(&[(b"a", b"1"), (b"a", b"2")])))
            .unwrap_err();
        assert_eq!(duplicate.status().code, Code::InvalidArgument);

        let duplicate_read = server
            .get_leaves(GetLeavesRequest::latest(TREE, vec![b"a".to_vec(), b"a".to_vec()]))
            .unwrap_err();
        assert_eq!(duplicate_read.status().code, Code::InvalidArgument);

        assert_eq!(store.latest_revision(TREE).unwrap(), Revision::ZERO);
    }

    #[test]
    fn too_many_leaves() {
        let store = Arc::new(MapStore::in_memory());
        let registry = registry_with(Arc::clone(&store), Arc::new(Sha256Signer), Duration::ZERO);
        let server = MapServer::new(ServerConfig::new().with_max_leaves_per_request(2), registry);

        let err = server
            .set_leaves(SetLeavesRequest::new(
                TREE,
                leaves(&[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")]),
            ))
            .unwrap_err();
        assert_eq!(err.status().code, Code::InvalidArgument);
        assert!(server
            .set_leaves(SetLeavesRequest::new(TREE, leaves(&[(b"a", b"1"), (b"b", b"2")])))
            .is_ok());
    }

    #[test]
    fn signer_failure_rolls_back() {
        let store = Arc::new(MapStore::in_memory());
        let registry = registry_with(Arc::clone(&store), Arc::new(FailingSigner), Duration::ZERO);
        let server = MapServer::new(ServerConfig::default(), registry);

        let err = server
            .set_leaves(SetLeavesRequest::new(TREE, leaves(&[(b"a", b"1")])))
            .unwrap_err();
        assert_eq!(err.status().code, Code::Internal);
        assert_eq!(store.latest_revision(TREE).unwrap(), Revision::ZERO);

        // The writer slot was released by the dropped session.
        let tx = store.begin(TREE).unwrap();
        assert_eq!(tx.write_revision(), Revision::new(1));
    }

    #[test]
    fn deadline_before_commit() {
        let store = Arc::new(MapStore::in_memory());
        let registry = registry_with(
            Arc::clone(&store),
            Arc::new(Sha256Signer),
            Duration::from_millis(40),
        );
        let server = MapServer::new(
            ServerConfig::new().with_request_timeout(Duration::from_millis(10)),
            registry,
        );

        let err = server
            .set_leaves(SetLeavesRequest::new(TREE, leaves(&[(b"a", b"1")])))
            .unwrap_err();
        assert!(matches!(err, ServerError::DeadlineExceeded(_)));
        assert_eq!(err.status().code, Code::DeadlineExceeded);
        assert_eq!(store.latest_revision(TREE).unwrap(), Revision::ZERO);
    }

    #[test]
    fn health_follows_store() {
        let (server, store) = create_server();
        assert!(server.is_healthy());
        assert!(store.trees().is_empty());

        store.close().unwrap();
        assert!(!server.is_healthy());
        let err = server
            .get_signed_map_root(GetSignedMapRootRequest { tree_id: TREE })
            .unwrap_err();
        assert_eq!(err.status().code, Code::Unavailable);
    }
}
