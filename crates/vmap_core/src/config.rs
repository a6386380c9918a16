//! Store configuration.

use std::time::Duration;

/// What `begin` does when another session already writes the same tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterPolicy {
    /// Wait until the current writer commits or rolls back.
    #[default]
    Block,
    /// Fail immediately with `Busy`.
    Reject,
    /// Wait up to the given duration, then fail with `Busy`.
    Wait(Duration),
}

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the store already holds a journal.
    pub error_if_exists: bool,

    /// Whether to sync the journal on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Serialization policy for concurrent writers on one tree.
    pub writer_policy: WriterPolicy,

    /// Maximum number of distinct keys one session may stage.
    pub max_batch_size: Option<usize>,

    /// Maximum size in bytes of a single `leaf_value`.
    pub max_leaf_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            sync_on_commit: true,
            writer_policy: WriterPolicy::Block,
            max_batch_size: None,
            max_leaf_size: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if the store exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets whether to sync the journal on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the writer serialization policy.
    #[must_use]
    pub const fn writer_policy(mut self, policy: WriterPolicy) -> Self {
        self.writer_policy = policy;
        self
    }

    /// Limits the number of distinct keys per session.
    #[must_use]
    pub const fn max_batch_size(mut self, keys: usize) -> Self {
        self.max_batch_size = Some(keys);
        self
    }

    /// Limits the size of a single leaf value.
    #[must_use]
    pub const fn max_leaf_size(mut self, bytes: usize) -> Self {
        self.max_leaf_size = Some(bytes);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(!config.error_if_exists);
        assert!(config.sync_on_commit);
        assert_eq!(config.writer_policy, WriterPolicy::Block);
        assert_eq!(config.max_batch_size, None);
        assert_eq!(config.max_leaf_size, None);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .sync_on_commit(false)
            .writer_policy(WriterPolicy::Wait(Duration::from_millis(50)))
            .max_batch_size(10)
            .max_leaf_size(1024);

        assert!(!config.create_if_missing);
        assert!(!config.sync_on_commit);
        assert_eq!(
            config.writer_policy,
            WriterPolicy::Wait(Duration::from_millis(50))
        );
        assert_eq!(config.max_batch_size, Some(10));
        assert_eq!(config.max_leaf_size, Some(1024));
    }
}
