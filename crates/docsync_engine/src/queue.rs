//! Pending operation queue.
//!
//! The queue holds at most one operation per document: enqueuing a save for
//! a document that already has one removes the old operation and appends the
//! new one at the back, so only the latest content is ever uploaded and the
//! oldest intents are the ones dropped on overflow. Operations become ready
//! at their
//! `next_retry_at`; a failed attempt pushes that deadline out with
//! exponential backoff.

use crate::config::RetryConfig;
use docsync_protocol::{DocumentContent, DocumentId, SaveRequest};
use std::collections::VecDeque;

/// Kind of pending operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Upload the document content.
    Save,
}

/// A write waiting to be sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    /// Operation kind.
    pub kind: OperationKind,
    /// Target document.
    pub document_id: DocumentId,
    /// Version the content was based on.
    pub claimed_version: u64,
    /// New title, if the edit renamed the document.
    pub title: Option<String>,
    /// Content to upload.
    pub content: DocumentContent,
    /// Failed attempts so far.
    pub attempt: u32,
    /// Earliest time the operation may run (epoch ms).
    pub next_retry_at: u64,
    /// Code of the last failure.
    pub last_error_code: Option<String>,
}

impl PendingOperation {
    /// Creates a save that is ready immediately.
    pub fn save(
        document_id: DocumentId,
        claimed_version: u64,
        title: Option<String>,
        content: DocumentContent,
        now: u64,
    ) -> Self {
        Self {
            kind: OperationKind::Save,
            document_id,
            claimed_version,
            title,
            content,
            attempt: 0,
            next_retry_at: now,
            last_error_code: None,
        }
    }

    /// Returns true if the operation may run at `now`.
    pub fn is_ready(&self, now: u64) -> bool {
        self.next_retry_at <= now
    }

    /// Records a failed attempt and schedules the next one.
    pub fn mark_for_retry(&mut self, now: u64, retry: &RetryConfig, error_code: &str) {
        self.attempt = self.attempt.saturating_add(1);
        let delay = retry.delay_for_attempt(self.attempt);
        self.next_retry_at = now.saturating_add(delay.as_millis() as u64);
        self.last_error_code = Some(error_code.to_string());
    }

    /// Builds the request body for this operation.
    pub fn to_request(&self) -> SaveRequest {
        let request = SaveRequest::new(self.claimed_version, self.content.clone());
        match &self.title {
            Some(title) => request.with_title(title.clone()),
            None => request,
        }
    }
}

/// Result of [`PendingQueue::dequeue_ready`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dequeued {
    /// The first ready operation in queue order, removed from the queue.
    pub operation: Option<PendingOperation>,
    /// Earliest deadline among the operations left in the queue.
    pub next_retry_at: Option<u64>,
}

/// Bounded FIFO of pending operations, one per document.
#[derive(Debug, Clone)]
pub struct PendingQueue {
    ops: VecDeque<PendingOperation>,
    capacity: usize,
}

impl PendingQueue {
    /// Creates an empty queue holding at most `capacity` operations.
    pub fn new(capacity: usize) -> Self {
        Self {
            ops: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Adds `op` at the back, removing any operation for the same document.
    ///
    /// Returns the operations dropped from the front to stay within
    /// capacity.
    pub fn enqueue(&mut self, op: PendingOperation) -> Vec<PendingOperation> {
        self.take(&op.document_id);
        self.ops.push_back(op);
        self.truncate()
    }

    /// Puts back an operation whose attempt failed.
    ///
    /// Returns false, and drops `op`, if a newer operation for the same
    /// document was enqueued in the meantime.
    pub fn requeue(&mut self, op: PendingOperation) -> (bool, Vec<PendingOperation>) {
        if self.contains(&op.document_id) {
            return (false, Vec::new());
        }
        self.ops.push_back(op);
        (true, self.truncate())
    }

    /// Removes and returns the first operation ready at `now`.
    pub fn dequeue_ready(&mut self, now: u64) -> Dequeued {
        let operation = self
            .ops
            .iter()
            .position(|op| op.is_ready(now))
            .and_then(|index| self.ops.remove(index));
        Dequeued {
            operation,
            next_retry_at: self.next_retry_at(),
        }
    }

    /// Removes and returns the operation for `id` regardless of its deadline.
    pub fn take(&mut self, id: &DocumentId) -> Option<PendingOperation> {
        let index = self.position(id)?;
        self.ops.remove(index)
    }

    /// Removes the operation for `id`, if any.
    pub fn remove(&mut self, id: &DocumentId) -> Option<PendingOperation> {
        self.take(id)
    }

    /// Returns true if an operation for `id` is queued.
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.position(id).is_some()
    }

    /// Returns the operation for `id`, if any.
    pub fn get(&self, id: &DocumentId) -> Option<&PendingOperation> {
        self.ops.iter().find(|op| &op.document_id == id)
    }

    /// Moves a queued operation for `id` from version `from` to `to`.
    ///
    /// Used after a write succeeds while a later edit of the same document
    /// was already queued against the old version. Returns true if an
    /// operation was updated.
    pub fn rebase(&mut self, id: &DocumentId, from: u64, to: u64) -> bool {
        match self
            .ops
            .iter_mut()
            .find(|op| &op.document_id == id && op.claimed_version == from)
        {
            Some(op) => {
                op.claimed_version = to;
                true
            }
            None => false,
        }
    }

    /// Earliest `next_retry_at` in the queue.
    pub fn next_retry_at(&self) -> Option<u64> {
        self.ops.iter().map(|op| op.next_retry_at).min()
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Maximum number of queued operations.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates over operations in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingOperation> {
        self.ops.iter()
    }

    fn position(&self, id: &DocumentId) -> Option<usize> {
        self.ops.iter().position(|op| &op.document_id == id)
    }

    fn truncate(&mut self) -> Vec<PendingOperation> {
        let excess = self.ops.len().saturating_sub(self.capacity);
        self.ops.drain(..excess).collect()
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new(100)
    }
}
