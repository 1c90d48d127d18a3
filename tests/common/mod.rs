//! Shared `CacheStore` contract checks, run against every backend.

#![allow(dead_code)]

use std::collections::HashSet;

use hotfeed_core::models::{now_ms, Item};
use hotfeed_core::store::CacheStore;

pub fn item(id: i64, rank: i64) -> Item {
    Item {
        id,
        title: format!("Topic {id}"),
        source: "V2EX".into(),
        display_time: "12:34".into(),
        link: format!("https://example.test/t/{id}"),
        summary: vec![format!("point about {id}"), "another point".into()],
        rank,
    }
}

pub async fn fresh_store_is_empty_and_never_refreshed(store: &dyn CacheStore) {
    store.migrate_schema().await.unwrap();
    let snap = store.read_all().await.unwrap();
    assert!(snap.items.is_empty());
    assert_eq!(snap.last_refreshed, 0);
    assert_eq!(store.last_refreshed().await.unwrap(), 0);
}

pub async fn upsert_inserts_replaces_and_advances(store: &dyn CacheStore) {
    store.migrate_schema().await.unwrap();
    let before = now_ms();

    store.upsert_one(&item(1, 2)).await.unwrap();
    store.upsert_one(&item(2, 1)).await.unwrap();

    let snap = store.read_all().await.unwrap();
    assert_eq!(snap.ids(), vec![2, 1], "display order is by rank");
    assert!(snap.last_refreshed >= before);
    assert_eq!(snap.items[1], item(1, 2));

    let mut changed = item(1, 1);
    changed.title = "Renamed".into();
    changed.summary = vec!["only point".into()];
    store.upsert_one(&changed).await.unwrap();

    let snap = store.read_all().await.unwrap();
    assert_eq!(snap.items.len(), 2);
    let one = snap.items.iter().find(|i| i.id == 1).unwrap();
    assert_eq!(one, &changed);
    // rank tie broken by id
    assert_eq!(snap.ids(), vec![1, 2]);
}

pub async fn delete_not_in_reconciles(store: &dyn CacheStore) {
    store.migrate_schema().await.unwrap();
    for id in [2, 3, 4] {
        store.upsert_one(&item(id, id)).await.unwrap();
    }

    let keep: HashSet<i64> = [1, 2, 3].into_iter().collect();
    assert_eq!(store.delete_not_in(&keep).await.unwrap(), 1);

    let mut ids = store.read_all().await.unwrap().ids();
    ids.sort();
    assert_eq!(ids, vec![2, 3]);

    // nothing more to remove
    assert_eq!(store.delete_not_in(&keep).await.unwrap(), 0);

    // an empty keep-set removes everything
    assert_eq!(store.delete_not_in(&HashSet::new()).await.unwrap(), 2);
    assert!(store.read_all().await.unwrap().items.is_empty());
}

pub async fn timestamp_is_monotonic(store: &dyn CacheStore) {
    store.migrate_schema().await.unwrap();

    let future = now_ms() + 60_000;
    store.mark_refreshed(future).await.unwrap();
    assert_eq!(store.last_refreshed().await.unwrap(), future);

    // neither an older mark nor an upsert at "now" moves it back
    store.mark_refreshed(1).await.unwrap();
    store.upsert_one(&item(1, 1)).await.unwrap();
    assert_eq!(store.last_refreshed().await.unwrap(), future);

    // migration does not reset it either
    store.migrate_schema().await.unwrap();
    assert_eq!(store.last_refreshed().await.unwrap(), future);
}

pub async fn migration_is_repeatable(store: &dyn CacheStore) {
    store.migrate_schema().await.unwrap();
    store.upsert_one(&item(7, 1)).await.unwrap();
    store.migrate_schema().await.unwrap();
    store.migrate_schema().await.unwrap();
    assert_eq!(store.read_all().await.unwrap().ids(), vec![7]);
}
