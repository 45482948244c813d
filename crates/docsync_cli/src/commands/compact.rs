//! Compact command implementation.

use super::{read_log, replay};
use docsync_engine::{CompactStats, DurableCache};
use docsync_storage::FileLog;
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting cache log at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let scan = read_log(path)?;
    let live = replay(&scan.records).len();
    println!("Compaction Analysis:");
    println!("  Frames:       {}", scan.records.len());
    println!("  Live entries: {}", live);
    if scan.torn_bytes > 0 {
        println!("  Torn tail:    {} bytes (will be dropped)", scan.torn_bytes);
    }

    if dry_run {
        return Ok(());
    }
    if live == scan.records.len() && scan.torn_bytes == 0 {
        println!();
        println!("No compaction needed - log is already minimal");
        return Ok(());
    }

    let stats = compact(path)?;
    println!();
    println!("  Size before: {} bytes", stats.bytes_before);
    println!("  Size after:  {} bytes", stats.bytes_after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        stats.bytes_before.saturating_sub(stats.bytes_after),
        if stats.bytes_before > 0 {
            (stats.bytes_before.saturating_sub(stats.bytes_after)) as f64
                / stats.bytes_before as f64
                * 100.0
        } else {
            0.0
        }
    );
    println!("✓ Compaction complete");
    Ok(())
}

/// Compacts the log at `path` in place.
pub fn compact(path: &Path) -> Result<CompactStats, Box<dyn std::error::Error>> {
    let cache = DurableCache::open(FileLog::open(path)?)?;
    Ok(cache.compact()?)
}
