//! Verify command implementation.

use super::read_log;
use docsync_engine::CacheRecord;
use std::collections::HashSet;
use std::path::Path;

/// Verification findings.
#[derive(Debug, Default)]
pub struct VerifyReport {
    /// Intact frames.
    pub frames: usize,
    /// Bytes after the last intact frame.
    pub torn_bytes: u64,
    /// Problems found in intact frames.
    pub problems: Vec<String>,
}

impl VerifyReport {
    /// Returns true if nothing is wrong.
    pub fn is_clean(&self) -> bool {
        self.torn_bytes == 0 && self.problems.is_empty()
    }
}

/// Checks the log at `path`.
pub fn verify(path: &Path) -> Result<VerifyReport, Box<dyn std::error::Error>> {
    let scan = read_log(path)?;
    let mut report = VerifyReport {
        frames: scan.records.len(),
        torn_bytes: scan.torn_bytes,
        problems: Vec::new(),
    };

    let mut live = HashSet::new();
    for (index, record) in scan.records.iter().enumerate() {
        match record {
            CacheRecord::Put(entry) => {
                if entry.document_id.as_str().is_empty() {
                    report.problems.push(format!("frame {index}: empty document id"));
                }
                if entry.version == 0 {
                    report
                        .problems
                        .push(format!("frame {index}: {} has version 0", entry.document_id));
                }
                live.insert(entry.document_id.clone());
            }
            CacheRecord::Delete(id) => {
                if !live.remove(id) {
                    report
                        .problems
                        .push(format!("frame {index}: delete of unknown document {id}"));
                }
            }
        }
    }
    Ok(report)
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying cache log at {:?}", path);
    println!();

    let report = verify(path)?;
    println!("  Intact frames: {}", report.frames);
    if report.torn_bytes > 0 {
        println!("  ✗ Torn tail: {} bytes", report.torn_bytes);
    }
    for problem in &report.problems {
        println!("  ✗ {}", problem);
    }

    println!();
    if report.is_clean() {
        println!("✓ Cache log is valid");
        Ok(())
    } else {
        Err(format!(
            "Verification failed: {} problem(s), {} torn bytes",
            report.problems.len(),
            report.torn_bytes
        )
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::sample_log;
    use std::fs::OpenOptions;
    use std::io::Write;

    #[test]
    fn clean_log_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.log");
        sample_log(&path);

        let report = verify(&path).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.frames, 5);
    }

    #[test]
    fn torn_tail_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.log");
        sample_log(&path);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[40, 0, 0, 0, 1, 2]).unwrap();
        drop(file);

        let report = verify(&path).unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.torn_bytes, 6);
        assert_eq!(report.frames, 5);
    }
}
