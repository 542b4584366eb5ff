//! Search side-index synchronization.
//!
//! The relational store is the source of truth; an external text index
//! mirrors the searchable rows (content entries). Handlers collect their
//! staged entry mutations into a [`ChangeSet`] and hand it to
//! [`SearchSync::apply`] only after the storage write has committed, so
//! the index never learns about rows that were rolled back.
//!
//! Index trouble must never break the primary flow: apply is best-effort,
//! and a missing index client is an explicit degraded mode: logged and
//! counted, not silently skipped.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::storage::EntryRow;

/// Collection holding the content entries.
pub const ENTRY_COLLECTION: &str = "entries";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("index request failed: {0}")]
    Http(String),
    #[error("bad index response: {0}")]
    Decode(String),
    #[error("search indexing disabled")]
    Disabled,
}

/// The searchable projection of an entry.
#[derive(Debug, Clone, Serialize)]
pub struct SearchDoc {
    pub id: i64,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub summary: Option<String>,
    pub city: String,
    pub category: String,
}

impl SearchDoc {
    pub fn from_entry(entry: &EntryRow) -> Self {
        Self {
            id: entry.id,
            kind: entry.kind.as_str().to_string(),
            title: entry.title.clone(),
            body: entry.body.clone(),
            summary: entry.summary.clone(),
            city: entry.city.clone(),
            category: entry.category.clone(),
        }
    }
}

/// Call contract of the external text index. The index itself is an
/// external collaborator; this crate only ships clients for it.
pub trait SearchIndex: Send + Sync {
    fn upsert(&self, collection: &str, id: i64, fields: &serde_json::Value)
        -> Result<(), SearchError>;
    fn remove(&self, collection: &str, id: i64) -> Result<(), SearchError>;
    /// Drop every document in the collection; used by full rebuilds.
    fn clear(&self, collection: &str) -> Result<(), SearchError>;
    /// Returns matching document ids (best first) and the total hit count.
    fn query(
        &self,
        collection: &str,
        text: &str,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<i64>, u64), SearchError>;
}

/// Unit of work for the index: the searchable changes one request staged.
///
/// Upserts cover both newly added and modified entries; the index write
/// is the same either way. Removals apply after all upserts, in capture
/// order within each category.
#[derive(Debug, Default)]
pub struct ChangeSet {
    upserts: Vec<SearchDoc>,
    removals: Vec<i64>,
}

impl ChangeSet {
    pub fn stage_upsert(&mut self, doc: SearchDoc) {
        self.upserts.push(doc);
    }

    pub fn stage_removal(&mut self, id: i64) {
        self.removals.push(id);
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.removals.len()
    }
}

/// Applies committed change sets to the index, tolerating a missing or
/// failing index without disturbing callers.
pub struct SearchSync {
    index: Option<Arc<dyn SearchIndex>>,
    dropped_ops: AtomicU64,
    failed_ops: AtomicU64,
}

impl SearchSync {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self {
            index: Some(index),
            dropped_ops: AtomicU64::new(0),
            failed_ops: AtomicU64::new(0),
        }
    }

    /// Degraded mode: every change set is dropped, observably.
    pub fn disabled() -> Self {
        Self {
            index: None,
            dropped_ops: AtomicU64::new(0),
            failed_ops: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.index.is_some()
    }

    /// Change-set operations dropped because no index is configured.
    pub fn dropped_ops(&self) -> u64 {
        self.dropped_ops.load(Ordering::Relaxed)
    }

    /// Individual index operations that errored and were skipped.
    pub fn failed_ops(&self) -> u64 {
        self.failed_ops.load(Ordering::Relaxed)
    }

    /// Push a committed change set into the index: upserts first, then
    /// removals. Call only after the storage write is durable. Failures
    /// are logged and counted, never propagated.
    pub fn apply(&self, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }
        let Some(index) = self.index.as_deref() else {
            self.dropped_ops
                .fetch_add(changes.len() as u64, Ordering::Relaxed);
            warn!(
                dropped = changes.len(),
                "search indexing disabled; dropping staged change(s)"
            );
            return;
        };

        for doc in &changes.upserts {
            let outcome = serde_json::to_value(doc)
                .map_err(|e| SearchError::Decode(e.to_string()))
                .and_then(|fields| index.upsert(ENTRY_COLLECTION, doc.id, &fields));
            if let Err(e) = outcome {
                self.failed_ops.fetch_add(1, Ordering::Relaxed);
                warn!(entry = doc.id, error = %e, "index upsert failed; continuing");
            }
        }
        for &id in &changes.removals {
            if let Err(e) = index.remove(ENTRY_COLLECTION, id) {
                self.failed_ops.fetch_add(1, Ordering::Relaxed);
                warn!(entry = id, error = %e, "index removal failed; continuing");
            }
        }
    }

    /// Full rebuild for bootstrap or repair after the index and the store
    /// have drifted: clear the collection, then upsert every persisted
    /// entry. Stale documents for rows deleted out-of-band disappear only
    /// here. Not incremental, and holds no lock against concurrent
    /// writers, so readers may briefly see an empty or partial index.
    /// Returns the number of documents pushed.
    pub fn reindex(
        &self,
        docs: impl IntoIterator<Item = SearchDoc>,
    ) -> Result<u64, SearchError> {
        let index = self.index.as_deref().ok_or(SearchError::Disabled)?;
        index.clear(ENTRY_COLLECTION)?;
        let mut pushed = 0u64;
        for doc in docs {
            let fields =
                serde_json::to_value(&doc).map_err(|e| SearchError::Decode(e.to_string()))?;
            index.upsert(ENTRY_COLLECTION, doc.id, &fields)?;
            pushed += 1;
        }
        Ok(pushed)
    }

    /// Query the entry collection. `Err(Disabled)` when no index is
    /// configured; the caller decides how to degrade.
    pub fn query(
        &self,
        text: &str,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<i64>, u64), SearchError> {
        let index = self.index.as_deref().ok_or(SearchError::Disabled)?;
        index.query(ENTRY_COLLECTION, text, page, per_page)
    }
}

/// In-memory index for tests and single-process deployments. Matching is
/// plain substring search over the concatenated string fields; ranking is
/// document id order.
#[derive(Default)]
pub struct MemoryIndex {
    collections: Mutex<HashMap<String, BTreeMap<i64, String>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in a collection.
    pub fn doc_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map_or(0, |docs| docs.len())
    }

    pub fn contains(&self, collection: &str, id: i64) -> bool {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .is_some_and(|docs| docs.contains_key(&id))
    }
}

fn searchable_text(fields: &serde_json::Value) -> String {
    let mut text = String::new();
    if let Some(map) = fields.as_object() {
        for value in map.values() {
            if let Some(s) = value.as_str() {
                text.push_str(&s.to_lowercase());
                text.push(' ');
            }
        }
    }
    text
}

impl SearchIndex for MemoryIndex {
    fn upsert(
        &self,
        collection: &str,
        id: i64,
        fields: &serde_json::Value,
    ) -> Result<(), SearchError> {
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id, searchable_text(fields));
        Ok(())
    }

    fn remove(&self, collection: &str, id: i64) -> Result<(), SearchError> {
        if let Some(docs) = self.collections.lock().unwrap().get_mut(collection) {
            docs.remove(&id);
        }
        Ok(())
    }

    fn clear(&self, collection: &str) -> Result<(), SearchError> {
        if let Some(docs) = self.collections.lock().unwrap().get_mut(collection) {
            docs.clear();
        }
        Ok(())
    }

    fn query(
        &self,
        collection: &str,
        text: &str,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<i64>, u64), SearchError> {
        let needle = text.to_lowercase();
        let terms: Vec<&str> = needle.split_whitespace().collect();
        let collections = self.collections.lock().unwrap();
        let matches: Vec<i64> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, haystack)| terms.iter().all(|t| haystack.contains(t)))
                    .map(|(&id, _)| id)
                    .collect()
            })
            .unwrap_or_default();

        let total = matches.len() as u64;
        let start = ((page.max(1) - 1) * per_page) as usize;
        let ids = matches
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .collect();
        Ok((ids, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: i64, title: &str, body: &str) -> SearchDoc {
        SearchDoc {
            id,
            kind: "post".to_string(),
            title: title.to_string(),
            body: body.to_string(),
            summary: None,
            city: "Delft".to_string(),
            category: "general".to_string(),
        }
    }

    #[test]
    fn test_apply_upserts_then_removes() {
        let index = Arc::new(MemoryIndex::new());
        let sync = SearchSync::new(index.clone());

        let mut changes = ChangeSet::default();
        changes.stage_upsert(doc(1, "hello", "world"));
        changes.stage_upsert(doc(2, "second", "entry"));
        changes.stage_removal(1);
        sync.apply(changes);

        // Removal of id 1 lands after its own upsert.
        assert!(!index.contains(ENTRY_COLLECTION, 1));
        assert!(index.contains(ENTRY_COLLECTION, 2));
        assert_eq!(sync.failed_ops(), 0);
    }

    #[test]
    fn test_disabled_sync_counts_drops() {
        let sync = SearchSync::disabled();
        assert!(!sync.is_enabled());

        let mut changes = ChangeSet::default();
        changes.stage_upsert(doc(1, "a", "b"));
        changes.stage_removal(2);
        sync.apply(changes);

        assert_eq!(sync.dropped_ops(), 2);
        assert!(matches!(sync.query("a", 1, 10), Err(SearchError::Disabled)));
        assert!(matches!(
            sync.reindex(vec![doc(1, "a", "b")]),
            Err(SearchError::Disabled)
        ));
    }

    #[test]
    fn test_empty_changeset_is_free() {
        let sync = SearchSync::disabled();
        sync.apply(ChangeSet::default());
        assert_eq!(sync.dropped_ops(), 0);
    }

    #[test]
    fn test_memory_index_query_terms_and_paging() {
        let index = MemoryIndex::new();
        for id in 1..=5 {
            let fields = serde_json::to_value(doc(id, "city stories", &format!("body {id}")))
                .unwrap();
            index.upsert(ENTRY_COLLECTION, id, &fields).unwrap();
        }
        let fields = serde_json::to_value(doc(6, "unrelated", "noise")).unwrap();
        index.upsert(ENTRY_COLLECTION, 6, &fields).unwrap();

        let (ids, total) = index.query(ENTRY_COLLECTION, "city stories", 1, 3).unwrap();
        assert_eq!(total, 5);
        assert_eq!(ids, vec![1, 2, 3]);

        let (ids, total) = index.query(ENTRY_COLLECTION, "CITY", 2, 3).unwrap();
        assert_eq!(total, 5);
        assert_eq!(ids, vec![4, 5]);

        let (ids, total) = index.query(ENTRY_COLLECTION, "missing term", 1, 10).unwrap();
        assert_eq!(total, 0);
        assert!(ids.is_empty());
    }

    #[test]
    fn test_reindex_counts_documents() {
        let index = Arc::new(MemoryIndex::new());
        let sync = SearchSync::new(index.clone());
        let pushed = sync
            .reindex(vec![doc(1, "a", "b"), doc(2, "c", "d")])
            .unwrap();
        assert_eq!(pushed, 2);
        assert_eq!(index.doc_count(ENTRY_COLLECTION), 2);
    }
}
