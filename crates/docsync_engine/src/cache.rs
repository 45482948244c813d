//! Client-side document cache.
//!
//! The cache holds the last content the client knows for each document and
//! whether that content still has to reach the server. It is written on
//! every edit, so a crash or restart never loses more than the edit being
//! typed.
//!
//! [`DurableCache`] persists entries in a [`LogStore`] as a sequence of
//! frames, each a little-endian `u32` length followed by one CBOR-encoded
//! [`CacheRecord`]. Replaying the frames in order rebuilds the entry map; a
//! torn trailing frame is cut off when the cache is opened. Superseded
//! frames are reclaimed by compaction, which runs automatically once the
//! log outgrows its [`CompactionPolicy`].

use docsync_protocol::{DocumentContent, DocumentId, DocumentRecord};
use docsync_storage::{LogStore, StorageError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by a cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing log failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An entry could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// What the client knows about one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCacheEntry {
    /// Document the entry belongs to.
    #[serde(rename = "fileId")]
    pub document_id: DocumentId,
    /// Server version the content was based on.
    pub version: u64,
    /// Latest local content.
    #[serde(rename = "scene")]
    pub content: DocumentContent,
    /// True while the content has not been accepted by the server.
    pub dirty: bool,
    /// When the entry was last written (epoch ms).
    #[serde(rename = "updatedAt")]
    pub updated_at: u64,
}

impl LocalCacheEntry {
    /// Entry mirroring a server record, with nothing left to upload.
    pub fn clean(record: &DocumentRecord) -> Self {
        Self {
            document_id: record.id.clone(),
            version: record.version,
            content: record.content.clone(),
            dirty: false,
            updated_at: record.updated_at,
        }
    }

    /// Entry holding a local edit based on `version`.
    pub fn dirty(
        document_id: DocumentId,
        version: u64,
        content: DocumentContent,
        updated_at: u64,
    ) -> Self {
        Self {
            document_id,
            version,
            content,
            dirty: true,
            updated_at,
        }
    }
}

/// Storage for [`LocalCacheEntry`] values keyed by document.
///
/// Implementations use interior locking; every method takes `&self`.
pub trait LocalCache: Send + Sync {
    /// Returns the entry for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    fn get(&self, id: &DocumentId) -> CacheResult<Option<LocalCacheEntry>>;

    /// Inserts or replaces the entry for `entry.document_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    fn put(&self, entry: LocalCacheEntry) -> CacheResult<()>;

    /// Removes the entry for `id`. Removing a missing entry is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    fn delete(&self, id: &DocumentId) -> CacheResult<()>;

    /// Returns every entry, ordered by document id.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    fn list_all(&self) -> CacheResult<Vec<LocalCacheEntry>>;
}

impl<C: LocalCache + ?Sized> LocalCache for Arc<C> {
    fn get(&self, id: &DocumentId) -> CacheResult<Option<LocalCacheEntry>> {
        (**self).get(id)
    }

    fn put(&self, entry: LocalCacheEntry) -> CacheResult<()> {
        (**self).put(entry)
    }

    fn delete(&self, id: &DocumentId) -> CacheResult<()> {
        (**self).delete(id)
    }

    fn list_all(&self) -> CacheResult<Vec<LocalCacheEntry>> {
        (**self).list_all()
    }
}

/// In-memory cache. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<DocumentId, LocalCacheEntry>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, id: &DocumentId) -> CacheResult<Option<LocalCacheEntry>> {
        Ok(self.entries.read().get(id).cloned())
    }

    fn put(&self, entry: LocalCacheEntry) -> CacheResult<()> {
        self.entries
            .write()
            .insert(entry.document_id.clone(), entry);
        Ok(())
    }

    fn delete(&self, id: &DocumentId) -> CacheResult<()> {
        self.entries.write().remove(id);
        Ok(())
    }

    fn list_all(&self) -> CacheResult<Vec<LocalCacheEntry>> {
        let mut entries: Vec<_> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(entries)
    }
}

/// One frame of the durable cache log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheRecord {
    /// Insert or replace an entry.
    Put(LocalCacheEntry),
    /// Remove an entry.
    Delete(DocumentId),
}

impl CacheRecord {
    /// Document the record applies to.
    pub fn document_id(&self) -> &DocumentId {
        match self {
            CacheRecord::Put(entry) => &entry.document_id,
            CacheRecord::Delete(id) => id,
        }
    }

    /// Encodes the record as a length-prefixed frame.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encode`] if CBOR encoding fails.
    pub fn encode_frame(&self) -> CacheResult<Vec<u8>> {
        let mut payload = Vec::new();
        ciborium::ser::into_writer(self, &mut payload)
            .map_err(|e| CacheError::Encode(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CacheError::Encode(format!("frame too large: {} bytes", payload.len())))?;

        let mut frame = Vec::with_capacity(FRAME_HEADER + payload.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }
}

const FRAME_HEADER: usize = 4;

/// Result of scanning a cache log.
#[derive(Debug, Clone, Default)]
pub struct LogScan {
    /// Records decoded from the intact prefix, in log order.
    pub records: Vec<CacheRecord>,
    /// Length of the intact prefix in bytes.
    pub valid_len: u64,
    /// Bytes after the intact prefix.
    pub torn_bytes: u64,
}

/// Decodes frames from `bytes` until the end or the first bad frame.
pub fn scan_log(bytes: &[u8]) -> LogScan {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let Some(header) = bytes.get(offset..offset + FRAME_HEADER) else {
            break;
        };
        let mut len_bytes = [0u8; FRAME_HEADER];
        len_bytes.copy_from_slice(header);
        let len = u32::from_le_bytes(len_bytes) as usize;

        let start = offset + FRAME_HEADER;
        let Some(payload) = bytes.get(start..start + len) else {
            break;
        };
        match ciborium::de::from_reader::<CacheRecord, _>(payload) {
            Ok(record) => records.push(record),
            Err(e) => {
                debug!(offset, error = %e, "undecodable cache frame");
                break;
            }
        }
        offset = start + len;
    }

    LogScan {
        records,
        valid_len: offset as u64,
        torn_bytes: (bytes.len() - offset) as u64,
    }
}

/// Size figures for a [`DurableCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Live entries.
    pub entries: usize,
    /// Frames in the log, including superseded ones.
    pub frames: usize,
    /// Log size in bytes.
    pub log_bytes: u64,
}

/// Outcome of [`DurableCache::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactStats {
    /// Frames before compaction.
    pub frames_before: usize,
    /// Frames after compaction (one per live entry).
    pub frames_after: usize,
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
}

/// When a [`DurableCache`] compacts its log on its own.
///
/// The log is compacted after a write once it holds at least `min_frames`
/// frames and more than `max_frames_per_entry` frames per live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionPolicy {
    /// Frame count below which the log is never compacted.
    pub min_frames: usize,
    /// Allowed frames per live entry before compacting.
    pub max_frames_per_entry: usize,
}

impl CompactionPolicy {
    /// Creates the default policy: 64 frames, 4 frames per entry.
    pub fn new() -> Self {
        Self {
            min_frames: 64,
            max_frames_per_entry: 4,
        }
    }

    /// A policy that never compacts automatically.
    pub fn disabled() -> Self {
        Self {
            min_frames: usize::MAX,
            max_frames_per_entry: usize::MAX,
        }
    }

    /// Sets the minimum frame count.
    pub fn with_min_frames(mut self, frames: usize) -> Self {
        self.min_frames = frames;
        self
    }

    /// Sets the allowed frames per live entry (at least 1).
    pub fn with_max_frames_per_entry(mut self, frames: usize) -> Self {
        self.max_frames_per_entry = frames.max(1);
        self
    }

    /// Returns true if a log of `frames` frames over `entries` live
    /// entries should be compacted.
    pub fn should_compact(&self, frames: usize, entries: usize) -> bool {
        frames >= self.min_frames
            && frames > entries.saturating_mul(self.max_frames_per_entry)
    }
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

struct DurableInner<S> {
    store: S,
    entries: BTreeMap<DocumentId, LocalCacheEntry>,
    frames: usize,
    policy: CompactionPolicy,
}

impl<S: LogStore> DurableInner<S> {
    fn append(&mut self, record: &CacheRecord) -> CacheResult<()> {
        let frame = record.encode_frame()?;
        self.store.append(&frame)?;
        self.store.sync()?;
        self.frames += 1;
        Ok(())
    }

    fn compact(&mut self) -> CacheResult<CompactStats> {
        let frames_before = self.frames;
        let bytes_before = self.store.len()?;

        let mut data = Vec::new();
        for entry in self.entries.values() {
            data.extend(CacheRecord::Put(entry.clone()).encode_frame()?);
        }
        self.store.replace(&data)?;
        self.frames = self.entries.len();

        let stats = CompactStats {
            frames_before,
            frames_after: self.frames,
            bytes_before,
            bytes_after: data.len() as u64,
        };
        info!(
            frames_before,
            frames_after = stats.frames_after,
            bytes_before,
            bytes_after = stats.bytes_after,
            "cache log compacted"
        );
        Ok(stats)
    }

    /// Compacts if the policy asks for it. The write that triggered it has
    /// already been persisted, so a failure here only leaves a longer log.
    fn maybe_compact(&mut self) {
        if !self.policy.should_compact(self.frames, self.entries.len()) {
            return;
        }
        if let Err(e) = self.compact() {
            warn!(error = %e, frames = self.frames, "automatic cache compaction failed");
        }
    }
}

/// Cache persisted in a [`LogStore`].
pub struct DurableCache<S: LogStore> {
    inner: Mutex<DurableInner<S>>,
}

impl<S: LogStore> DurableCache<S> {
    /// Opens a cache over `store`, replaying its log.
    ///
    /// A torn or undecodable tail is truncated away.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or truncated.
    pub fn open(mut store: S) -> CacheResult<Self> {
        let bytes = store.load()?;
        let scan = scan_log(&bytes);
        if scan.torn_bytes > 0 {
            warn!(
                valid_len = scan.valid_len,
                torn_bytes = scan.torn_bytes,
                "truncating torn cache log tail"
            );
            store.truncate(scan.valid_len)?;
        }

        let frames = scan.records.len();
        let mut entries = BTreeMap::new();
        for record in scan.records {
            match record {
                CacheRecord::Put(entry) => {
                    entries.insert(entry.document_id.clone(), entry);
                }
                CacheRecord::Delete(id) => {
                    entries.remove(&id);
                }
            }
        }
        debug!(entries = entries.len(), frames, "cache log replayed");

        Ok(Self {
            inner: Mutex::new(DurableInner {
                store,
                entries,
                frames,
                policy: CompactionPolicy::default(),
            }),
        })
    }

    /// Sets when the log is compacted automatically.
    pub fn with_compaction(self, policy: CompactionPolicy) -> Self {
        self.inner.lock().policy = policy;
        self
    }

    /// Returns size figures for the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the log length cannot be read.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let inner = self.inner.lock();
        Ok(CacheStats {
            entries: inner.entries.len(),
            frames: inner.frames,
            log_bytes: inner.store.len()?,
        })
    }

    /// Rewrites the log with one frame per live entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the new log cannot be encoded or written. The
    /// old log stays in place on failure.
    pub fn compact(&self) -> CacheResult<CompactStats> {
        self.inner.lock().compact()
    }

    /// Consumes the cache and returns the underlying store.
    pub fn into_store(self) -> S {
        self.inner.into_inner().store
    }
}

impl<S: LogStore> LocalCache for DurableCache<S> {
    fn get(&self, id: &DocumentId) -> CacheResult<Option<LocalCacheEntry>> {
        Ok(self.inner.lock().entries.get(id).cloned())
    }

    fn put(&self, entry: LocalCacheEntry) -> CacheResult<()> {
        let mut inner = self.inner.lock();
        inner.append(&CacheRecord::Put(entry.clone()))?;
        inner.entries.insert(entry.document_id.clone(), entry);
        inner.maybe_compact();
        Ok(())
    }

    fn delete(&self, id: &DocumentId) -> CacheResult<()> {
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(id) {
            return Ok(());
        }
        inner.append(&CacheRecord::Delete(id.clone()))?;
        inner.entries.remove(id);
        inner.maybe_compact();
        Ok(())
    }

    fn list_all(&self) -> CacheResult<Vec<LocalCacheEntry>> {
        Ok(self.inner.lock().entries.values().cloned().collect())
    }
}
