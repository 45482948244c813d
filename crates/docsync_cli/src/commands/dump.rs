//! Dump command implementation.

use super::read_log;
use docsync_engine::CacheRecord;
use serde::Serialize;
use std::path::Path;

/// One frame of the cache log.
#[derive(Debug, Serialize)]
pub struct FrameInfo {
    /// Position in the log.
    pub index: usize,
    /// `put` or `delete`.
    pub op: &'static str,
    /// Document id.
    pub document_id: String,
    /// Base version (puts only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Unsynced flag (puts only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
    /// Write time (puts only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

impl FrameInfo {
    fn new(index: usize, record: &CacheRecord) -> Self {
        let document_id = record.document_id().to_string();
        match record {
            CacheRecord::Put(entry) => Self {
                index,
                op: "put",
                document_id,
                version: Some(entry.version),
                dirty: Some(entry.dirty),
                updated_at: Some(entry.updated_at),
            },
            CacheRecord::Delete(_) => Self {
                index,
                op: "delete",
                document_id,
                version: None,
                dirty: None,
                updated_at: None,
            },
        }
    }
}

/// Lists frames of the log at `path`.
pub fn frames(
    path: &Path,
    limit: Option<usize>,
    skip: usize,
) -> Result<Vec<FrameInfo>, Box<dyn std::error::Error>> {
    let scan = read_log(path)?;
    Ok(scan
        .records
        .iter()
        .enumerate()
        .skip(skip)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(index, record)| FrameInfo::new(index, record))
        .collect())
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    skip: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let frames = frames(path, limit, skip)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&frames)?);
        }
        _ => print_text_output(&frames),
    }

    Ok(())
}

fn print_text_output(frames: &[FrameInfo]) {
    println!("Cache log frames:");
    println!();
    for frame in frames {
        match (frame.version, frame.dirty) {
            (Some(version), Some(dirty)) => println!(
                "  #{:<6} {:<6} {} v{}{}",
                frame.index,
                frame.op,
                frame.document_id,
                version,
                if dirty { " (dirty)" } else { "" }
            ),
            _ => println!("  #{:<6} {:<6} {}", frame.index, frame.op, frame.document_id),
        }
    }
    println!();
    println!("Total: {} frames", frames.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::sample_log;

    #[test]
    fn lists_frames_in_log_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.log");
        sample_log(&path);

        let all = frames(&path, None, 0).unwrap();
        let ops: Vec<_> = all.iter().map(|f| f.op).collect();
        assert_eq!(ops, vec!["put", "put", "put", "put", "delete"]);

        let page = frames(&path, Some(2), 1).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].index, 1);
        assert_eq!(page[0].version, Some(2));
    }
}
