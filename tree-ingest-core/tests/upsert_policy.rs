use std::sync::Arc;

use serde_json::{json, Map};
use tree_ingest_core::config::ChangeDetection;
use tree_ingest_core::contract::{Item, ItemId, MockStore, Record, RecordUpdate, Tree};
use tree_ingest_core::error::StoreError;
use tree_ingest_core::memory::MemoryStore;
use tree_ingest_core::upsert::{UpsertOutcome, UpsertPolicy};

fn story_tree(descendants: u64, kid_ids: &[u64]) -> Tree {
    Tree {
        item: Item::new(100u64)
            .with_children(kid_ids.iter().copied())
            .with_descendants(descendants)
            .with_field("title", json!("Show HN: a tree")),
        children: kid_ids.iter().map(|&id| Tree::leaf(Item::new(id))).collect(),
    }
}

fn stored_record(descendants: u64, kid_ids: &[u64]) -> Record {
    let mut fields = Map::new();
    fields.insert("title".into(), json!("Show HN: a tree"));
    fields.insert("annotated_by".into(), json!("curation-bot"));
    Record {
        id: ItemId(100),
        descendant_count: descendants,
        children: kid_ids.iter().map(|&id| Tree::leaf(Item::new(id))).collect(),
        fields,
    }
}

#[tokio::test]
async fn test_apply_inserts_when_absent() {
    let mut store = MockStore::new();
    store
        .expect_find_by_key()
        .withf(|id| *id == ItemId(100))
        .times(1)
        .returning(|_| Ok(None));
    store
        .expect_insert_record()
        .withf(|tree: &Tree| tree.id() == ItemId(100) && tree.children.len() == 2)
        .times(1)
        .returning(|_| Ok(()));
    store.expect_update_partial().times(0);

    let policy = UpsertPolicy::new(Arc::new(store), ChangeDetection::DescendantCount);
    let outcome = policy.apply(&story_tree(2, &[1, 2])).await.expect("apply");

    assert_eq!(outcome, UpsertOutcome::Inserted);
}

#[tokio::test]
async fn test_apply_skips_when_descendant_count_unchanged() {
    let mut store = MockStore::new();
    store
        .expect_find_by_key()
        .times(1)
        .returning(|_| Ok(Some(stored_record(3, &[1, 2, 3]))));
    store.expect_insert_record().times(0);
    store.expect_update_partial().times(0);

    let policy = UpsertPolicy::new(Arc::new(store), ChangeDetection::DescendantCount);
    let outcome = policy
        .apply(&story_tree(3, &[1, 2, 3]))
        .await
        .expect("apply");

    assert_eq!(outcome, UpsertOutcome::Skipped);
}

#[tokio::test]
async fn test_apply_updates_only_descendants_and_children() {
    let mut store = MockStore::new();
    store
        .expect_find_by_key()
        .times(1)
        .returning(|_| Ok(Some(stored_record(3, &[1, 2, 3]))));
    store.expect_insert_record().times(0);
    store
        .expect_update_partial()
        .withf(|id, update: &RecordUpdate| {
            *id == ItemId(100)
                && update.descendant_count == 5
                && update.children.iter().map(Tree::id).collect::<Vec<_>>()
                    == vec![ItemId(1), ItemId(2), ItemId(3), ItemId(4), ItemId(5)]
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let policy = UpsertPolicy::new(Arc::new(store), ChangeDetection::DescendantCount);
    let outcome = policy
        .apply(&story_tree(5, &[1, 2, 3, 4, 5]))
        .await
        .expect("apply");

    assert_eq!(outcome, UpsertOutcome::Updated);
}

#[tokio::test]
async fn test_partial_update_preserves_out_of_band_fields() {
    let store = Arc::new(MemoryStore::new().with_record(stored_record(3, &[1, 2, 3])));
    let policy = UpsertPolicy::new(Arc::clone(&store), ChangeDetection::DescendantCount);

    let outcome = policy
        .apply(&story_tree(5, &[1, 2, 3, 4, 5]))
        .await
        .expect("apply");
    assert_eq!(outcome, UpsertOutcome::Updated);
    assert_eq!(store.update_count(), 1);
    assert_eq!(store.insert_count(), 0);

    let record = store.get(ItemId(100)).expect("record still present");
    assert_eq!(record.descendant_count, 5);
    assert_eq!(record.children.len(), 5);
    assert_eq!(record.fields.get("annotated_by"), Some(&json!("curation-bot")));
    assert_eq!(record.fields.get("title"), Some(&json!("Show HN: a tree")));
}

#[tokio::test]
async fn test_structure_detection_updates_on_same_count_different_kids() {
    let mut store = MockStore::new();
    store
        .expect_find_by_key()
        .returning(|_| Ok(Some(stored_record(3, &[1, 2, 3]))));
    store
        .expect_update_partial()
        .times(1)
        .returning(|_, _| Ok(()));

    let policy = UpsertPolicy::new(Arc::new(store), ChangeDetection::Structure);
    let outcome = policy
        .apply(&story_tree(3, &[1, 2, 9]))
        .await
        .expect("apply");

    assert_eq!(outcome, UpsertOutcome::Updated);
}

#[tokio::test]
async fn test_count_detection_misses_same_count_different_kids() {
    let mut store = MockStore::new();
    store
        .expect_find_by_key()
        .returning(|_| Ok(Some(stored_record(3, &[1, 2, 3]))));
    store.expect_update_partial().times(0);

    let policy = UpsertPolicy::new(Arc::new(store), ChangeDetection::DescendantCount);
    let outcome = policy
        .apply(&story_tree(3, &[1, 2, 9]))
        .await
        .expect("apply");

    assert_eq!(outcome, UpsertOutcome::Skipped);
}

#[tokio::test]
async fn test_store_read_failure_is_returned() {
    let mut store = MockStore::new();
    store
        .expect_find_by_key()
        .returning(|_| Err(StoreError::Other("connection refused".into())));
    store.expect_insert_record().times(0);

    let policy = UpsertPolicy::new(Arc::new(store), ChangeDetection::DescendantCount);
    let err = policy
        .apply(&story_tree(1, &[1]))
        .await
        .expect_err("read failure must surface");

    assert!(err.to_string().contains("connection refused"));
}
