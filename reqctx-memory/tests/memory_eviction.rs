//! Tests for `MapBackend` entry-count eviction and expiry semantics.

use std::time::{Duration, SystemTime};

use reqctx_backend::{CacheBackend, CachedEntry};
use reqctx_core::key::Key;
use reqctx_core::props::Props;
use reqctx_memory::MapBackend;
use serde_json::json;

fn make_key(id: u32) -> Key {
    Key::new("test", &Props::from_value(json!({ "id": id })))
}

#[tokio::test]
async fn entries_fit_under_capacity() {
    let backend = MapBackend::builder().max_entries(3).build();
    for i in 1..=3 {
        backend.set(&make_key(i), CachedEntry::new(json!(i))).await.unwrap();
    }
    for i in 1..=3 {
        assert!(backend.get(&make_key(i)).await.unwrap().is_some(), "entry {i} should exist");
    }
}

#[tokio::test]
async fn inserting_past_capacity_evicts_oldest() {
    let backend = MapBackend::builder().max_entries(3).build();
    for i in 1..=3 {
        backend.set(&make_key(i), CachedEntry::new(json!(i))).await.unwrap();
    }
    backend.set(&make_key(4), CachedEntry::new(json!(4))).await.unwrap();

    assert!(backend.get(&make_key(1)).await.unwrap().is_none(), "oldest entry should be evicted");
    for i in 2..=4 {
        assert!(backend.get(&make_key(i)).await.unwrap().is_some(), "entry {i} should remain");
    }
    assert_eq!(backend.entry_count(), 3);
}

#[tokio::test]
async fn overwriting_an_existing_key_does_not_count_twice() {
    let backend = MapBackend::builder().max_entries(2).build();
    backend.set(&make_key(1), CachedEntry::new(json!("a"))).await.unwrap();
    backend.set(&make_key(1), CachedEntry::new(json!("b"))).await.unwrap();
    backend.set(&make_key(2), CachedEntry::new(json!("c"))).await.unwrap();

    assert_eq!(backend.entry_count(), 2);
    assert_eq!(backend.get(&make_key(1)).await.unwrap().unwrap().value, json!("b"));
}

#[tokio::test]
async fn expired_entry_is_treated_as_a_miss_and_evicted() {
    let backend = MapBackend::builder().build();
    let now = SystemTime::now();
    let entry = CachedEntry::new(json!("stale")).with_expiry(now - Duration::from_secs(1));
    backend.set(&make_key(1), entry).await.unwrap();

    assert!(backend.get(&make_key(1)).await.unwrap().is_none());
    assert_eq!(backend.entry_count(), 0);
}

#[tokio::test]
async fn unbounded_backend_never_evicts() {
    let backend = MapBackend::builder().build();
    for i in 0..50 {
        backend.set(&make_key(i), CachedEntry::new(json!(i))).await.unwrap();
    }
    assert_eq!(backend.entry_count(), 50);
}
