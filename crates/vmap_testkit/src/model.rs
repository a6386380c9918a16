//! Reference model of one tree.
//!
//! [`MapModel`] is the simplest possible implementation of the map
//! semantics: every (key, revision) version in a `BTreeMap`. Histories
//! applied to a real store are replayed onto the model and every read is
//! checked against it.

use crate::fixtures::{commit_leaves, test_root};
use std::collections::BTreeMap;
use vmap_core::{
    MapError, MapLeaf, MapReader, MapStorage, Revision, SignedMapRoot, TreeId, LATEST_REVISION,
};

/// Expected contents of one tree.
#[derive(Debug, Clone)]
pub struct MapModel {
    tree: TreeId,
    history: BTreeMap<Vec<u8>, BTreeMap<u64, MapLeaf>>,
    roots: Vec<SignedMapRoot>,
}

impl MapModel {
    /// Creates an empty model.
    pub fn new(tree: TreeId) -> Self {
        Self {
            tree,
            history: BTreeMap::new(),
            roots: Vec::new(),
        }
    }

    /// The modelled tree.
    pub fn tree(&self) -> TreeId {
        self.tree
    }

    /// Latest committed revision.
    pub fn latest(&self) -> Revision {
        Revision::new(self.roots.len() as u64)
    }

    /// Records a committed revision.
    ///
    /// # Panics
    ///
    /// If `root` is not for the next revision.
    pub fn record(&mut self, leaves: &[(Vec<u8>, MapLeaf)], root: SignedMapRoot) -> Revision {
        let revision = self.latest().next();
        assert_eq!(root.map_revision, revision, "root recorded out of order");
        for (key, leaf) in leaves {
            self.history
                .entry(key.clone())
                .or_default()
                .insert(revision.as_u64(), leaf.clone());
        }
        self.roots.push(root);
        revision
    }

    /// The leaf of `key` at `revision`.
    pub fn get(&self, revision: u64, key: &[u8]) -> Option<&MapLeaf> {
        self.history
            .get(key)?
            .range(..=revision)
            .next_back()
            .map(|(_, leaf)| leaf)
    }

    /// The root of `revision`.
    pub fn root(&self, revision: u64) -> Option<&SignedMapRoot> {
        let index = usize::try_from(revision).ok()?.checked_sub(1)?;
        self.roots.get(index)
    }

    /// Every key ever written.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.history.keys().map(Vec::as_slice)
    }

    /// Checks every key and root visible to `reader` against the model.
    ///
    /// # Panics
    ///
    /// On the first mismatch.
    pub fn verify<R: MapReader + ?Sized>(&self, reader: &R) {
        if let Some(mismatch) = self.first_mismatch(reader) {
            panic!("{mismatch}");
        }
    }

    /// Like [`MapModel::verify`], but describes the first mismatch instead
    /// of panicking.
    pub fn first_mismatch<R: MapReader + ?Sized>(&self, reader: &R) -> Option<String> {
        let tree = self.tree;
        let ceiling = reader.read_revision().as_u64();
        if ceiling > self.latest().as_u64() {
            return Some(format!(
                "{tree} reads revision {ceiling}, model is at {}",
                self.latest()
            ));
        }

        for revision in 0..=ceiling {
            let requested = revision as i64;
            for key in self.keys() {
                match reader.get(requested, key) {
                    Ok(actual) if actual.as_ref() == self.get(revision, key) => {}
                    Ok(actual) => {
                        return Some(format!(
                            "{tree} key {key:?} at revision {revision}: got {actual:?}, expected {:?}",
                            self.get(revision, key)
                        ))
                    }
                    Err(err) => return Some(format!("{tree} key {key:?} at {revision}: {err}")),
                }
            }
            if revision > 0 {
                match reader.signed_map_root_at(requested) {
                    Ok(root) if Some(&root) == self.root(revision) => {}
                    Ok(root) => return Some(format!("{tree} root {revision}: got {root:?}")),
                    Err(err) => return Some(format!("{tree} root {revision}: {err}")),
                }
            }
        }

        match reader.get(LATEST_REVISION, b"\xffnever-written") {
            Ok(None) => {}
            other => return Some(format!("{tree} unwritten key read as {other:?}")),
        }
        match reader.latest_signed_map_root() {
            Ok(root) if root.map_revision.as_u64() == ceiling => None,
            Err(MapError::NoRootsYet { .. }) if ceiling == 0 => None,
            other => Some(format!("{tree} latest root at {ceiling}: {other:?}")),
        }
    }
}

/// A store paired with a model of one of its trees.
pub struct ModelHarness<'a> {
    storage: &'a dyn MapStorage,
    model: MapModel,
}

impl<'a> ModelHarness<'a> {
    /// Creates a harness for an empty `tree` of `storage`.
    pub fn new(storage: &'a dyn MapStorage, tree: TreeId) -> Self {
        Self {
            storage,
            model: MapModel::new(tree),
        }
    }

    /// Resumes a harness on a store reopened from `model`'s history.
    pub fn resume(storage: &'a dyn MapStorage, model: MapModel) -> Self {
        Self { storage, model }
    }

    /// Returns the model.
    pub fn model(&self) -> &MapModel {
        &self.model
    }

    /// Consumes the harness, returning the model.
    pub fn into_model(self) -> MapModel {
        self.model
    }

    /// Commits `leaves` to the store and the model.
    pub fn commit(&mut self, leaves: &[(Vec<u8>, MapLeaf)]) -> Revision {
        let revision =
            commit_leaves(self.storage, self.model.tree, leaves).expect("Failed to commit batch");
        let recorded = self.model.record(leaves, test_root(revision));
        assert_eq!(revision, recorded, "store and model disagree on revision");
        revision
    }

    /// Stages `leaves` and a root, then rolls back.
    pub fn abort(&mut self, leaves: &[(Vec<u8>, MapLeaf)]) {
        let mut tx = self
            .storage
            .begin(self.model.tree)
            .expect("Failed to begin session");
        assert_eq!(tx.write_revision(), self.model.latest().next());
        for (key, leaf) in leaves {
            tx.set(key, leaf.clone()).expect("Failed to stage leaf");
        }
        let root = test_root(tx.write_revision());
        tx.store_signed_map_root(root).expect("Failed to stage root");
        tx.rollback().expect("Failed to roll back");
    }

    /// Verifies a fresh snapshot against the model.
    pub fn verify_all(&self) {
        let snapshot = self
            .storage
            .snapshot(self.model.tree)
            .expect("Failed to open snapshot");
        assert_eq!(snapshot.read_revision(), self.model.latest());
        self.model.verify(snapshot.as_ref());
    }
}
