//! Benchmark utilities.

use rand::Rng;
use vmap_core::{MapLeaf, MapResult, MapStorage, Revision, SignedMapRoot, TreeId};

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Key number `i`, fixed width so keys sort by number.
pub fn bench_key(i: usize) -> Vec<u8> {
    format!("key-{i:08}").into_bytes()
}

/// Generate `count` leaves with random values of `value_size` bytes.
pub fn generate_leaves(count: usize, value_size: usize) -> Vec<(Vec<u8>, MapLeaf)> {
    (0..count)
        .map(|i| (bench_key(i), MapLeaf::new(random_data(value_size))))
        .collect()
}

/// A root with a 32-byte hash, as a real signer would produce.
pub fn bench_root(revision: Revision) -> SignedMapRoot {
    SignedMapRoot::new(revision, random_data(32)).with_signature(random_data(64))
}

/// Commits `leaves` as the next revision of `tree`.
pub fn commit(
    storage: &dyn MapStorage,
    tree: TreeId,
    leaves: &[(Vec<u8>, MapLeaf)],
) -> MapResult<Revision> {
    vmap_core::with_write_session(storage, tree, |tx| {
        for (key, leaf) in leaves {
            tx.set(key, leaf.clone())?;
        }
        tx.store_signed_map_root(bench_root(tx.write_revision()))
    })
    .map(|(revision, ())| revision)
}

/// Writes `revisions` revisions of `keys` keys each; every revision
/// rewrites every key.
pub fn populate(
    storage: &dyn MapStorage,
    tree: TreeId,
    revisions: usize,
    keys: usize,
    value_size: usize,
) -> MapResult<()> {
    for _ in 0..revisions {
        commit(storage, tree, &generate_leaves(keys, value_size))?;
    }
    Ok(())
}
