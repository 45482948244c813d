//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod inspect;
pub mod verify;

use docsync_engine::{scan_log, CacheRecord, LocalCacheEntry, LogScan};
use docsync_protocol::DocumentId;
use docsync_storage::{FileLog, LogStore};
use std::collections::BTreeMap;
use std::path::Path;

/// Reads and scans a cache log without modifying it.
pub fn read_log(path: &Path) -> Result<LogScan, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No cache log found at {:?}", path).into());
    }
    let log = FileLog::open(path)?;
    let bytes = log.load()?;
    Ok(scan_log(&bytes))
}

/// Replays records into the live entry map.
pub fn replay(records: &[CacheRecord]) -> BTreeMap<DocumentId, LocalCacheEntry> {
    let mut entries = BTreeMap::new();
    for record in records {
        match record {
            CacheRecord::Put(entry) => {
                entries.insert(entry.document_id.clone(), entry.clone());
            }
            CacheRecord::Delete(id) => {
                entries.remove(id);
            }
        }
    }
    entries
}
