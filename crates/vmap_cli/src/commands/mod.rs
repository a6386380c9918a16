//! CLI command implementations.

pub mod dump_journal;
pub mod get;
pub mod inspect;
pub mod roots;
pub mod verify;

use std::error::Error;
use std::path::Path;
use tracing::debug;
use vmap_core::{journal_path, Config, Journal, MapStore};
use vmap_storage::InMemoryBackend;

/// Loads a copy of the store's journal into memory.
///
/// Commands work on the copy, so a torn tail is only cut from memory and
/// the store on disk is never touched.
pub fn load_journal(path: &Path) -> Result<InMemoryBackend, Box<dyn Error>> {
    let journal = journal_path(path);
    if !journal.exists() {
        return Err(format!("No store found at {}", path.display()).into());
    }
    let bytes = std::fs::read(&journal)?;
    debug!(journal = %journal.display(), bytes = bytes.len(), "journal loaded");
    Ok(InMemoryBackend::with_data(bytes))
}

/// Replays the journal copy into a read-only store.
pub fn load_store(path: &Path) -> Result<MapStore<Journal>, Box<dyn Error>> {
    let backend = load_journal(path)?;
    let config = Config::default().sync_on_commit(false);
    Ok(MapStore::open_with_backend(config, Box::new(backend))?)
}

/// Parses a key given on the command line.
pub fn parse_key(key: &str, hex: bool) -> Result<Vec<u8>, Box<dyn Error>> {
    if hex {
        hex_decode(key)
    } else {
        Ok(key.as_bytes().to_vec())
    }
}

/// Renders bytes as lowercase hex.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(text: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    if text.len() % 2 != 0 {
        return Err(format!("odd-length hex key: {text}").into());
    }
    let mut bytes = Vec::with_capacity(text.len() / 2);
    for i in (0..text.len()).step_by(2) {
        let byte = text
            .get(i..i + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .ok_or_else(|| format!("invalid hex key: {text}"))?;
        bytes.push(byte);
    }
    Ok(bytes)
}

/// Renders bytes as text when printable, hex otherwise.
pub fn display_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.is_empty() && text.chars().all(|c| !c.is_control()) => {
            format!("{text:?}")
        }
        _ => format!("0x{}", hex_encode(bytes)),
    }
}
