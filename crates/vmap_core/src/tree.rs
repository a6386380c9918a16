//! Per-tree state: the writer permit and the versioned index.

use crate::config::WriterPolicy;
use crate::error::{MapError, MapResult};
use crate::index::TreeIndex;
use crate::types::TreeId;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;

/// Shared state of one tree.
///
/// Write sessions serialize on the writer flag; readers only ever touch the
/// index, and only for the duration of a single call.
#[derive(Debug)]
pub(crate) struct TreeSlot {
    tree: TreeId,
    writer: Mutex<bool>,
    writer_released: Condvar,
    pub(crate) index: RwLock<TreeIndex>,
}

impl TreeSlot {
    pub(crate) fn new(tree: TreeId) -> Self {
        Self {
            tree,
            writer: Mutex::new(false),
            writer_released: Condvar::new(),
            index: RwLock::new(TreeIndex::default()),
        }
    }

    pub(crate) fn tree(&self) -> TreeId {
        self.tree
    }

    /// Takes the tree's single writer permit according to `policy`.
    pub(crate) fn acquire_writer(
        self: &Arc<Self>,
        policy: WriterPolicy,
    ) -> MapResult<WriterPermit> {
        let mut busy = self.writer.lock();
        match policy {
            WriterPolicy::Block => {
                while *busy {
                    self.writer_released.wait(&mut busy);
                }
            }
            WriterPolicy::Reject => {
                if *busy {
                    return Err(MapError::Busy { tree: self.tree });
                }
            }
            WriterPolicy::Wait(timeout) => {
                let deadline = Instant::now() + timeout;
                while *busy {
                    if self
                        .writer_released
                        .wait_until(&mut busy, deadline)
                        .timed_out()
                        && *busy
                    {
                        return Err(MapError::Busy { tree: self.tree });
                    }
                }
            }
        }
        *busy = true;
        Ok(WriterPermit {
            slot: Arc::clone(self),
        })
    }

    fn release_writer(&self) {
        *self.writer.lock() = false;
        self.writer_released.notify_one();
    }
}

/// Ownership of a tree's writer slot. Released on drop.
#[derive(Debug)]
pub(crate) struct WriterPermit {
    slot: Arc<TreeSlot>,
}

impl Drop for WriterPermit {
    fn drop(&mut self) {
        self.slot.release_writer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn reject_while_held() {
        let slot = Arc::new(TreeSlot::new(TreeId(1)));
        let permit = slot.acquire_writer(WriterPolicy::Reject).unwrap();
        assert!(matches!(
            slot.acquire_writer(WriterPolicy::Reject),
            Err(MapError::Busy { tree: TreeId(1) })
        ));
        drop(permit);
        assert!(slot.acquire_writer(WriterPolicy::Reject).is_ok());
    }

    #[test]
    fn wait_times_out() {
        let slot = Arc::new(TreeSlot::new(TreeId(1)));
        let _permit = slot.acquire_writer(WriterPolicy::Block).unwrap();
        let started = Instant::now();
        let result = slot.acquire_writer(WriterPolicy::Wait(Duration::from_millis(30)));
        assert!(matches!(result, Err(MapError::Busy { .. })));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn block_waits_for_release() {
        let slot = Arc::new(TreeSlot::new(TreeId(1)));
        let permit = slot.acquire_writer(WriterPolicy::Block).unwrap();
        let (tx, rx) = mpsc::channel();

        let waiter = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                let _permit = slot.acquire_writer(WriterPolicy::Block).unwrap();
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(permit);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }
}
