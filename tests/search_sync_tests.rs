//! Synchronizer behavior against the in-memory index: normal lifecycle,
//! drift after out-of-band deletes, and the degraded (disabled) mode.

use std::sync::Arc;

use agora::search::{
    ChangeSet, MemoryIndex, SearchDoc, SearchError, SearchSync, ENTRY_COLLECTION,
};
use agora::storage::{EntryKind, EntryUpdate, NewEntry, NewUser, Storage};

fn fixture() -> (Storage, Arc<MemoryIndex>, SearchSync) {
    let storage = Storage::open_in_memory().unwrap();
    storage.seed_roles().unwrap();
    let index = Arc::new(MemoryIndex::new());
    let sync = SearchSync::new(index.clone());
    (storage, index, sync)
}

fn author(storage: &Storage) -> i64 {
    storage
        .create_user(
            &NewUser {
                username: "author".to_string(),
                email: "author@example.com".to_string(),
                password_hash: "00$ff".to_string(),
                first_name: None,
                last_name: None,
            },
            None,
        )
        .unwrap()
        .id
}

fn create_indexed(
    storage: &Storage,
    sync: &SearchSync,
    author_id: i64,
    title: &str,
) -> agora::storage::EntryRow {
    let entry = storage
        .insert_entry(&NewEntry {
            kind: EntryKind::Blog,
            author_id,
            city: "Leiden".to_string(),
            category: "news".to_string(),
            title: title.to_string(),
            body: format!("{title} text"),
            summary: None,
        })
        .unwrap();
    let mut changes = ChangeSet::default();
    changes.stage_upsert(SearchDoc::from_entry(&entry));
    sync.apply(changes);
    entry
}

#[test]
fn entry_lifecycle_is_mirrored() {
    let (storage, index, sync) = fixture();
    let who = author(&storage);

    let entry = create_indexed(&storage, &sync, who, "morning glory");
    assert!(index.contains(ENTRY_COLLECTION, entry.id));
    let (ids, total) = sync.query("morning", 1, 10).unwrap();
    assert_eq!((ids, total), (vec![entry.id], 1));

    // Update re-upserts under the same id with the new text.
    let updated = storage
        .update_entry(
            entry.id,
            &EntryUpdate {
                title: Some("evening star".to_string()),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
    let mut changes = ChangeSet::default();
    changes.stage_upsert(SearchDoc::from_entry(&updated));
    sync.apply(changes);

    let (ids, _) = sync.query("evening", 1, 10).unwrap();
    assert_eq!(ids, vec![entry.id]);
    let (ids, _) = sync.query("morning", 1, 10).unwrap();
    assert!(ids.is_empty());

    // Delete through the normal flow removes the document.
    assert!(storage.delete_entry(entry.id).unwrap());
    let mut changes = ChangeSet::default();
    changes.stage_removal(entry.id);
    sync.apply(changes);
    assert!(!index.contains(ENTRY_COLLECTION, entry.id));
}

#[test]
fn out_of_band_delete_leaves_stale_doc_until_reindex() {
    let (storage, index, sync) = fixture();
    let who = author(&storage);

    let keep = create_indexed(&storage, &sync, who, "alpha keeps");
    let doomed = create_indexed(&storage, &sync, who, "omega leaves");

    // Storage-level delete that never reaches the synchronizer.
    assert!(storage.delete_entry(doomed.id).unwrap());

    // The index is now stale: it still answers for the deleted row, and
    // only the row loader hides the gap.
    assert!(index.contains(ENTRY_COLLECTION, doomed.id));
    let (ids, total) = sync.query("omega", 1, 10).unwrap();
    assert_eq!((ids.clone(), total), (vec![doomed.id], 1));
    assert!(storage.entries_by_ids(&ids).unwrap().is_empty());

    // Rebuild from the store: stale document gone, live one kept.
    let docs: Vec<SearchDoc> = storage
        .all_entries()
        .unwrap()
        .iter()
        .map(SearchDoc::from_entry)
        .collect();
    let pushed = sync.reindex(docs).unwrap();
    assert_eq!(pushed, 1);
    assert!(!index.contains(ENTRY_COLLECTION, doomed.id));
    assert!(index.contains(ENTRY_COLLECTION, keep.id));
    let (ids, _) = sync.query("alpha", 1, 10).unwrap();
    assert_eq!(ids, vec![keep.id]);
}

#[test]
fn disabled_mode_is_observable_and_harmless() {
    let storage = Storage::open_in_memory().unwrap();
    storage.seed_roles().unwrap();
    let sync = SearchSync::disabled();
    let who = author(&storage);

    // The primary write still succeeds; the staged change is dropped and
    // counted instead of silently vanishing.
    let entry = storage
        .insert_entry(&NewEntry {
            kind: EntryKind::Post,
            author_id: who,
            city: "Gouda".to_string(),
            category: "food".to_string(),
            title: "cheese".to_string(),
            body: "wheel".to_string(),
            summary: None,
        })
        .unwrap();
    let mut changes = ChangeSet::default();
    changes.stage_upsert(SearchDoc::from_entry(&entry));
    sync.apply(changes);

    assert_eq!(sync.dropped_ops(), 1);
    assert!(storage.get_entry(entry.id).unwrap().is_some());
    assert!(matches!(
        sync.query("cheese", 1, 10),
        Err(SearchError::Disabled)
    ));
}
