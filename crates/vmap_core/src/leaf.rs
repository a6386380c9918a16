//! Leaf values stored per key per revision.

/// The payload stored for one key at one revision.
///
/// All fields are opaque to storage: `leaf_hash` is computed by the caller
/// and returned unmodified, and may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MapLeaf {
    /// Leaf payload.
    pub leaf_value: Vec<u8>,
    /// Caller-computed hash of the leaf.
    pub leaf_hash: Vec<u8>,
    /// Optional backend-defined extra data.
    pub extra_data: Option<Vec<u8>>,
}

impl MapLeaf {
    /// Creates a leaf holding `value` with no hash or extra data.
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            leaf_value: value.into(),
            leaf_hash: Vec::new(),
            extra_data: None,
        }
    }

    /// Sets the leaf hash.
    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<Vec<u8>>) -> Self {
        self.leaf_hash = hash.into();
        self
    }

    /// Sets the extra data.
    #[must_use]
    pub fn with_extra_data(mut self, extra: impl Into<Vec<u8>>) -> Self {
        self.extra_data = Some(extra.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let leaf = MapLeaf::new(b"v".as_slice())
            .with_hash(vec![1, 2])
            .with_extra_data(b"x".as_slice());
        assert_eq!(leaf.leaf_value, b"v");
        assert_eq!(leaf.leaf_hash, vec![1, 2]);
        assert_eq!(leaf.extra_data.as_deref(), Some(b"x".as_slice()));
    }

    #[test]
    fn empty_extra_data_differs_from_none() {
        let none = MapLeaf::new(b"v".as_slice());
        let empty = MapLeaf::new(b"v".as_slice()).with_extra_data(Vec::new());
        assert_ne!(none, empty);
    }
}
