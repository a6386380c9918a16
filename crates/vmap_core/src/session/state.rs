//! Session state.

use crate::error::{MapError, MapResult};

/// Lifecycle of a snapshot or write session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    /// Operations are allowed.
    Open,
    /// A write session published its revision.
    Committed,
    /// A write session discarded its staged data.
    RolledBack,
    /// A snapshot was closed.
    Closed,
}

impl SessionState {
    pub(crate) fn is_open(self) -> bool {
        self == Self::Open
    }

    pub(crate) fn ensure_open(self) -> MapResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(MapError::Closed)
        }
    }
}
