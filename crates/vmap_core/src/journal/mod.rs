//! Append-only commit journal for durability and crash recovery.
//!
//! Every commit is written as one contiguous group of frames before it
//! becomes visible. On open the journal is replayed to rebuild the index.
//!
//! ## Frame Format
//!
//! ```text
//! | magic "VMAP" (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! A commit group is `Begin, Set*, Root, Commit`, all for one tree and one
//! revision.
//!
//! ## Recovery Policy
//!
//! ### Tolerated (treated as a clean end of log)
//!
//! - **Truncated header or payload** at the tail: a write interrupted by a crash
//! - **Unfinished group** at the tail: frames after the last `Commit`
//!
//! Both are discarded and the device is rewound to the end of the last
//! complete group.
//!
//! ### Fatal (the store refuses to open)
//!
//! - CRC mismatch, bad magic, unknown record type, future version
//! - A frame out of place inside a group
//! - A revision that does not follow its tree's previous revision
//!
//! ## Invariants
//!
//! - The journal is **append-only**; only a failed or torn tail is ever cut
//! - A failed commit leaves the journal byte-identical to before it
//! - If a failed commit cannot be cut off, the journal is poisoned and
//!   refuses further appends until reopened

mod reader;
mod record;
mod writer;

pub use reader::{replay, Frame, JournalReader, Replay};
pub use record::{JournalRecord, RecordType, JOURNAL_MAGIC, JOURNAL_VERSION};
pub use writer::Journal;
