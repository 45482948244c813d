//! Versioned record store.

use crate::error::{ServerError, ServerResult};
use docsync_protocol::{
    epoch_millis, CreateRequest, DocumentContent, DocumentId, DocumentMeta, DocumentRecord,
    ListQuery, Scope, UserId, DEFAULT_TITLE,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

/// Authoritative store of document records.
///
/// The store maintains:
/// - The latest committed record of every document
/// - A strictly increasing change stamp used for `updatedAt`
///
/// Content writes are compare-and-increment on `version`; metadata changes
/// (trash, restore, favorite) leave `version` alone.
pub struct RecordStore {
    inner: RwLock<Inner>,
}

struct Inner {
    documents: HashMap<DocumentId, DocumentRecord>,
    last_stamp: u64,
}

impl Inner {
    fn stamp(&mut self) -> u64 {
        self.last_stamp = epoch_millis().max(self.last_stamp + 1);
        self.last_stamp
    }

    fn live_mut(&mut self, id: &DocumentId) -> ServerResult<&mut DocumentRecord> {
        match self.documents.get_mut(id) {
            Some(record) if !record.is_trashed => Ok(record),
            _ => Err(ServerError::NotFound(id.clone())),
        }
    }
}

impl RecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                documents: HashMap::new(),
                last_stamp: 0,
            }),
        }
    }

    /// Creates a document at version 1.
    pub fn create(&self, owner: &UserId, request: CreateRequest) -> DocumentRecord {
        let mut inner = self.inner.write();
        let now = inner.stamp();
        let record = DocumentRecord {
            id: DocumentId::generate(),
            owner_user_id: owner.clone(),
            team_id: request.team_id,
            title: request.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            version: 1,
            content: request.content.unwrap_or_else(DocumentContent::blank),
            created_at: now,
            updated_at: now,
            is_trashed: false,
            trashed_at: None,
            is_favorite: false,
        };
        inner.documents.insert(record.id.clone(), record.clone());
        debug!(document = %record.id, owner = %owner, "document created");
        record
    }

    /// Inserts a record as-is, replacing any record with the same id.
    ///
    /// Used to seed a store from an export or a fixture.
    pub fn insert(&self, record: DocumentRecord) {
        let mut inner = self.inner.write();
        inner.last_stamp = inner.last_stamp.max(record.updated_at);
        inner.documents.insert(record.id.clone(), record);
    }

    /// Returns the latest committed version of a live document.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`] if the document is missing or trashed.
    pub fn read(&self, id: &DocumentId) -> ServerResult<DocumentRecord> {
        match self.inner.read().documents.get(id) {
            Some(record) if !record.is_trashed => Ok(record.clone()),
            _ => Err(ServerError::NotFound(id.clone())),
        }
    }

    /// Returns a record whether or not it is trashed.
    pub fn get(&self, id: &DocumentId) -> Option<DocumentRecord> {
        self.inner.read().documents.get(id).cloned()
    }

    /// Writes new content if `claimed_version` matches the stored version.
    ///
    /// On success the stored version becomes `claimed_version + 1`. On a
    /// mismatch nothing changes and the caller learns the current version.
    ///
    /// # Errors
    ///
    /// - [`ServerError::NotFound`] if the document is missing or trashed
    /// - [`ServerError::VersionConflict`] if the claim is stale
    pub fn write(
        &self,
        id: &DocumentId,
        claimed_version: u64,
        content: DocumentContent,
        title: Option<String>,
    ) -> ServerResult<DocumentRecord> {
        let mut inner = self.inner.write();
        let now = inner.stamp();
        let record = inner.live_mut(id)?;

        if record.version != claimed_version {
            debug!(
                document = %id,
                claimed = claimed_version,
                current = record.version,
                "stale write rejected"
            );
            return Err(ServerError::VersionConflict {
                current_version: record.version,
            });
        }

        record.version += 1;
        record.content = content;
        if let Some(title) = title {
            record.title = title;
        }
        record.updated_at = now;

        info!(document = %id, version = record.version, "write accepted");
        Ok(record.clone())
    }

    /// Lists the documents visible to `user` under `query`, newest first.
    ///
    /// Team membership is not checked here; see [`crate::AccessPolicy`].
    pub fn list(&self, user: &UserId, query: &ListQuery) -> Vec<DocumentMeta> {
        let inner = self.inner.read();
        let mut rows: Vec<DocumentMeta> = inner
            .documents
            .values()
            .filter(|record| match query.scope {
                Scope::Personal => record.team_id.is_none() && &record.owner_user_id == user,
                Scope::Team => query.team_id.is_some() && record.team_id == query.team_id,
            })
            .filter(|record| query.include_trashed || !record.is_trashed)
            .filter(|record| !query.favorites_only || record.is_favorite)
            .map(DocumentRecord::meta)
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        rows
    }

    /// Moves a document to the trash. Trashing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`] if the document does not exist.
    pub fn trash(&self, id: &DocumentId) -> ServerResult<DocumentRecord> {
        let mut inner = self.inner.write();
        let now = inner.stamp();
        let record = inner
            .documents
            .get_mut(id)
            .ok_or_else(|| ServerError::NotFound(id.clone()))?;
        if !record.is_trashed {
            record.is_trashed = true;
            record.trashed_at = Some(now);
            record.updated_at = now;
        }
        Ok(record.clone())
    }

    /// Takes a document out of the trash.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`] if the document does not exist.
    pub fn restore(&self, id: &DocumentId) -> ServerResult<DocumentRecord> {
        let mut inner = self.inner.write();
        let now = inner.stamp();
        let record = inner
            .documents
            .get_mut(id)
            .ok_or_else(|| ServerError::NotFound(id.clone()))?;
        if record.is_trashed {
            record.is_trashed = false;
            record.trashed_at = None;
            record.updated_at = now;
        }
        Ok(record.clone())
    }

    /// Deletes a document permanently.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`] if the document does not exist.
    pub fn purge(&self, id: &DocumentId) -> ServerResult<DocumentRecord> {
        self.inner
            .write()
            .documents
            .remove(id)
            .ok_or_else(|| ServerError::NotFound(id.clone()))
    }

    /// Sets the favorite flag of a live document.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`] if the document is missing or trashed.
    pub fn set_favorite(&self, id: &DocumentId, favorite: bool) -> ServerResult<DocumentRecord> {
        let mut inner = self.inner.write();
        let record = inner.live_mut(id)?;
        record.is_favorite = favorite;
        Ok(record.clone())
    }

    /// Returns the number of documents, trashed ones included.
    pub fn len(&self) -> usize {
        self.inner.read().documents.len()
    }

    /// Returns true if the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.inner.read().documents.is_empty()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_protocol::TeamId;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn content(n: i64) -> DocumentContent {
        DocumentContent::from_value(json!({ "elements": [n] })).unwrap()
    }

    fn alice() -> UserId {
        UserId::new("alice")
    }

    #[test]
    fn create_starts_at_version_one() {
        let store = RecordStore::new();
        let record = store.create(&alice(), CreateRequest::default());

        assert_eq!(record.version, 1);
        assert_eq!(record.title, DEFAULT_TITLE);
        assert_eq!(record.content, DocumentContent::blank());
        assert_eq!(store.read(&record.id).unwrap(), record);
    }

    #[test]
    fn matching_claim_increments_version() {
        let store = RecordStore::new();
        let id = store.create(&alice(), CreateRequest::default()).id;

        let record = store.write(&id, 1, content(1), Some("Plan".into())).unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.title, "Plan");

        let record = store.write(&id, 2, content(2), None).unwrap();
        assert_eq!(record.version, 3);
        assert_eq!(record.title, "Plan");
        assert_eq!(record.content, content(2));
    }

    #[test]
    fn stale_claim_reports_current_version() {
        let store = RecordStore::new();
        let id = store.create(&alice(), CreateRequest::default()).id;
        for v in 1..4 {
            store.write(&id, v, content(v as i64), None).unwrap();
        }

        let result = store.write(&id, 3, content(99), None);
        assert!(matches!(
            result,
            Err(ServerError::VersionConflict { current_version: 4 })
        ));
        assert_eq!(store.read(&id).unwrap().content, content(3));
    }

    #[test]
    fn missing_and_trashed_documents_reject_writes() {
        let store = RecordStore::new();
        let missing = DocumentId::new("nope");
        assert!(matches!(
            store.write(&missing, 1, content(0), None),
            Err(ServerError::NotFound(_))
        ));

        let id = store.create(&alice(), CreateRequest::default()).id;
        store.trash(&id).unwrap();
        assert!(matches!(
            store.write(&id, 1, content(0), None),
            Err(ServerError::NotFound(_))
        ));
        assert!(store.read(&id).is_err());
        assert!(store.get(&id).unwrap().is_trashed);

        store.restore(&id).unwrap();
        assert_eq!(store.write(&id, 1, content(0), None).unwrap().version, 2);
    }

    #[test]
    fn metadata_changes_keep_version() {
        let store = RecordStore::new();
        let id = store.create(&alice(), CreateRequest::default()).id;

        let record = store.set_favorite(&id, true).unwrap();
        assert!(record.is_favorite);
        assert_eq!(record.version, 1);

        let record = store.trash(&id).unwrap();
        assert_eq!(record.version, 1);
        assert!(record.trashed_at.is_some());
    }

    #[test]
    fn purge_removes_record() {
        let store = RecordStore::new();
        let id = store.create(&alice(), CreateRequest::default()).id;
        store.purge(&id).unwrap();
        assert!(store.is_empty());
        assert!(store.purge(&id).is_err());
    }

    #[test]
    fn list_filters_and_orders() {
        let store = RecordStore::new();
        let team = TeamId::new("t1");
        let first = store.create(&alice(), CreateRequest::default()).id;
        let second = store.create(&alice(), CreateRequest::default()).id;
        let shared = store.create(
            &alice(),
            CreateRequest {
                team_id: Some(team.clone()),
                ..CreateRequest::default()
            },
        );
        store.create(&UserId::new("bob"), CreateRequest::default());

        // touching `first` moves it to the top
        store.write(&first, 1, content(1), None).unwrap();

        let rows = store.list(&alice(), &ListQuery::personal());
        let ids: Vec<_> = rows.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![first.clone(), second.clone()]);

        let rows = store.list(&alice(), &ListQuery::team(team));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, shared.id);

        store.set_favorite(&second, true).unwrap();
        let rows = store.list(&alice(), &ListQuery::personal().favorites());
        assert_eq!(rows.len(), 1);

        store.trash(&first).unwrap();
        assert_eq!(store.list(&alice(), &ListQuery::personal()).len(), 1);
        assert_eq!(
            store.list(&alice(), &ListQuery::personal().with_trashed()).len(),
            2
        );
    }

    #[test]
    fn racing_writers_produce_one_winner() {
        let store = Arc::new(RecordStore::new());
        let id = store.create(&alice(), CreateRequest::default()).id;

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                let id = id.clone();
                thread::spawn(move || store.write(&id, 1, content(n), None).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.read(&id).unwrap().version, 2);
    }

    proptest! {
        #[test]
        fn version_counts_accepted_writes(claims in prop::collection::vec(0u64..6, 1..40)) {
            let store = RecordStore::new();
            let id = store.create(&alice(), CreateRequest::default()).id;
            let mut accepted = 0u64;

            for offset in claims {
                let current = store.read(&id).unwrap().version;
                // offsets 0 and 1 claim the current version; the rest go stale
                let claim = if offset < 2 { current } else { current.saturating_sub(offset - 1) };
                match store.write(&id, claim, content(offset as i64), None) {
                    Ok(record) => {
                        accepted += 1;
                        prop_assert_eq!(record.version, current + 1);
                    }
                    Err(ServerError::VersionConflict { current_version }) => {
                        prop_assert_eq!(current_version, current);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }
            }

            prop_assert_eq!(store.read(&id).unwrap().version, 1 + accepted);
        }
    }
}
