//! Inspect command implementation.

use super::{read_log, replay};
use serde::Serialize;
use std::path::Path;

/// Cache inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Cache log path.
    pub path: String,
    /// Log size in bytes.
    pub log_size: u64,
    /// Decoded frames, including superseded ones.
    pub frame_count: usize,
    /// Bytes after the last intact frame.
    pub torn_bytes: u64,
    /// Live entries.
    pub entry_count: usize,
    /// Entries with unsynced edits.
    pub dirty_count: usize,
    /// Per-entry details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<EntrySummary>>,
}

/// Summary of one cached document.
#[derive(Debug, Serialize)]
pub struct EntrySummary {
    /// Document id.
    pub id: String,
    /// Base version.
    pub version: u64,
    /// Unsynced edits present.
    pub dirty: bool,
    /// Last write (epoch ms).
    pub updated_at: u64,
    /// Encoded content size in bytes.
    pub content_bytes: usize,
}

/// Builds the inspection result for the log at `path`.
pub fn inspect(
    path: &Path,
    show_entries: bool,
    dirty_only: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let scan = read_log(path)?;
    let entries = replay(&scan.records);

    let summaries = show_entries.then(|| {
        entries
            .values()
            .filter(|entry| !dirty_only || entry.dirty)
            .map(|entry| EntrySummary {
                id: entry.document_id.to_string(),
                version: entry.version,
                dirty: entry.dirty,
                updated_at: entry.updated_at,
                content_bytes: entry.content.encoded_len(),
            })
            .collect()
    });

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size: scan.valid_len + scan.torn_bytes,
        frame_count: scan.records.len(),
        torn_bytes: scan.torn_bytes,
        entry_count: entries.len(),
        dirty_count: entries.values().filter(|entry| entry.dirty).count(),
        entries: summaries,
    })
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    show_entries: bool,
    dirty_only: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path, show_entries, dirty_only)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Cache: {}", result.path);
    println!();
    println!("  Log size:   {} bytes", result.log_size);
    println!("  Frames:     {}", result.frame_count);
    if result.torn_bytes > 0 {
        println!("  Torn tail:  {} bytes", result.torn_bytes);
    }
    println!("  Documents:  {}", result.entry_count);
    println!("  Unsynced:   {}", result.dirty_count);

    if let Some(entries) = &result.entries {
        println!();
        println!("  {:<38} {:>8} {:>6} {:>10}", "DOCUMENT", "VERSION", "DIRTY", "BYTES");
        for entry in entries {
            println!(
                "  {:<38} {:>8} {:>6} {:>10}",
                entry.id,
                entry.version,
                if entry.dirty { "yes" } else { "no" },
                entry.content_bytes
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::sample_log;

    #[test]
    fn counts_live_and_dirty_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.log");
        sample_log(&path);

        let result = inspect(&path, false, false).unwrap();
        assert_eq!(result.frame_count, 5);
        assert_eq!(result.entry_count, 2);
        assert_eq!(result.dirty_count, 1);
        assert!(result.entries.is_none());

        let dirty = inspect(&path, true, true).unwrap().entries.unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].id, "a");
        assert_eq!(dirty[0].version, 2);
    }
}
