//! Core type definitions for vmap.

use std::fmt;

/// Request sentinel meaning "the latest revision visible to this view".
pub const LATEST_REVISION: i64 = -1;

/// Identifier of a tree: one independently revisioned map.
///
/// The core never checks that a tree "exists"; a tree with no commits is
/// simply empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreeId(pub i64);

impl TreeId {
    /// Creates a new tree ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tree:{}", self.0)
    }
}

/// A committed revision of a tree.
///
/// Revisions start at 1 for the first commit and grow by exactly one per
/// commit. [`Revision::ZERO`] is the state before any commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Revision(pub u64);

impl Revision {
    /// The empty state before the first commit.
    pub const ZERO: Self = Self(0);

    /// Creates a new revision.
    #[must_use]
    pub const fn new(revision: u64) -> Self {
        Self(revision)
    }

    /// Returns the raw revision value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the revision a commit on top of this one produces.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Converts a request revision into a `Revision` if it is non-negative.
    #[must_use]
    pub fn from_request(requested: i64) -> Option<Self> {
        u64::try_from(requested).ok().map(Self)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rev:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_next_is_gapless() {
        assert_eq!(Revision::ZERO.next(), Revision::new(1));
        assert_eq!(Revision::new(41).next().as_u64(), 42);
    }

    #[test]
    fn revision_from_request() {
        assert_eq!(Revision::from_request(0), Some(Revision::ZERO));
        assert_eq!(Revision::from_request(7), Some(Revision::new(7)));
        assert_eq!(Revision::from_request(LATEST_REVISION), None);
        assert_eq!(Revision::from_request(-5), None);
    }

    #[test]
    fn display_forms() {
        assert_eq!(TreeId::new(-3).to_string(), "tree:-3");
        assert_eq!(Revision::new(9).to_string(), "rev:9");
    }
}
