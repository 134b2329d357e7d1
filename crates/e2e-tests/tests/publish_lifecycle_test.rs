//! Publish lifecycle E2E tests.
//!
//! A draft article stays out of the index, publishing adds it with its
//! projected fields, unpublishing removes it again.

use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::json;

use e2e_tests::{create_tags, TestHarness};
use searchsync_scheduler::Dispatch;
use searchsync_search::SearchBackend;
use searchsync_types::{DocumentRef, Record};

fn draft_article(harness: &TestHarness) {
    create_tags(harness, 2);
    harness.write(
        Record::new("Article", 1)
            .with_attribute("title", "Hello search")
            .with_link("tags", vec![1, 2]),
    );
}

#[test]
fn test_draft_publish_unpublish() {
    let harness = TestHarness::default();
    draft_article(&harness);

    // Indexing a draft removes rather than adds
    let dispatch = harness
        .processor()
        .add_documents("main", vec![DocumentRef::new("Article", 1)])
        .unwrap();
    assert!(matches!(dispatch, Dispatch::Ran(_)));
    assert!(harness.backend.ids("main").is_empty());

    harness.store.publish("Article", 1).unwrap();
    harness.lifecycle().on_after_publish("Article", 1).unwrap();

    let payload = harness
        .backend
        .get_document("main", "page_1")
        .unwrap()
        .expect("published article should be indexed");
    assert_eq!(
        serde_json::Value::Object(payload),
        json!({
            "id": "page_1",
            "source_type": "Article",
            "record_base_type": "Page",
            "record_id": 1,
            "title": "Hello search",
            "tags": ["tag-1", "tag-2"],
        })
    );

    let at = Utc::now();
    harness.store.unpublish_at("Article", 1, at).unwrap();
    harness.lifecycle().on_after_unpublish_at("Article", 1, at).unwrap();
    assert!(harness.backend.ids("main").is_empty());
}

#[test]
fn test_republish_updates_fields() {
    let harness = TestHarness::default();
    draft_article(&harness);
    harness.store.publish("Article", 1).unwrap();
    harness.lifecycle().on_after_publish("Article", 1).unwrap();

    harness.write(
        Record::new("Article", 1)
            .with_attribute("title", "Renamed")
            .with_link("tags", vec![2]),
    );
    // Draft edits are invisible until published
    harness.lifecycle().on_after_publish("Article", 1).unwrap();
    let payload = harness.backend.get_document("main", "page_1").unwrap().unwrap();
    assert_eq!(payload["title"], json!("Hello search"));

    harness.store.publish("Article", 1).unwrap();
    harness.lifecycle().on_after_publish("Article", 1).unwrap();
    let payload = harness.backend.get_document("main", "page_1").unwrap().unwrap();
    assert_eq!(payload["title"], json!("Renamed"));
    assert_eq!(payload["tags"], json!(["tag-2"]));
}

#[test]
fn test_hidden_article_is_removed() {
    let harness = TestHarness::default();
    draft_article(&harness);
    harness.store.publish("Article", 1).unwrap();
    harness.lifecycle().on_after_publish("Article", 1).unwrap();
    assert_eq!(harness.backend.ids("main"), vec!["page_1"]);

    harness.publish(
        Record::new("Article", 1)
            .with_attribute("title", "Hello search")
            .with_attribute("show_in_search", false),
    );
    harness.lifecycle().on_after_publish("Article", 1).unwrap();
    assert!(harness.backend.ids("main").is_empty());
}

#[test]
fn test_publish_marks_record_indexed() {
    let harness = TestHarness::default();
    draft_article(&harness);
    assert!(harness.store.indexed_at("Article", 1).is_none());

    harness.store.publish("Article", 1).unwrap();
    harness.lifecycle().on_after_publish("Article", 1).unwrap();
    assert!(harness.store.indexed_at("Article", 1).is_some());
}
