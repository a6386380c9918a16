//! Signed map roots.

use crate::types::Revision;
use std::time::{SystemTime, UNIX_EPOCH};

/// The signed summary of one committed revision.
///
/// Exactly one root exists per committed revision. Hash, signature and
/// metadata are opaque caller data; storage never computes or checks them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignedMapRoot {
    /// Revision this root summarizes.
    pub map_revision: Revision,
    /// Root hash of the map at `map_revision`.
    pub root_hash: Vec<u8>,
    /// Creation time in nanoseconds since the Unix epoch.
    pub timestamp_nanos: u64,
    /// Signature over the root, produced by an external signer.
    pub signature: Vec<u8>,
    /// Opaque caller metadata.
    pub metadata: Vec<u8>,
}

impl SignedMapRoot {
    /// Creates an unsigned root for `map_revision` stamped with the current time.
    #[must_use]
    pub fn new(map_revision: Revision, root_hash: impl Into<Vec<u8>>) -> Self {
        Self {
            map_revision,
            root_hash: root_hash.into(),
            timestamp_nanos: now_nanos(),
            signature: Vec::new(),
            metadata: Vec::new(),
        }
    }

    /// Sets the signature.
    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<Vec<u8>>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp_nanos(mut self, timestamp_nanos: u64) -> Self {
        self.timestamp_nanos = timestamp_nanos;
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = metadata.into();
        self
    }
}

/// Nanoseconds since the Unix epoch, saturating.
#[must_use]
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
