mod common;

use common::{contribution, init_tracing, FlakyStore};
use friend_ratings::{KeyValueStore, MemoryStore, RatingAggregator, RunState};
use serde_json::json;
use std::sync::Arc;
use tokio_test::assert_ok;

#[tokio::test]
async fn merge_creates_record_then_adds_friends() {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let aggregator = RatingAggregator::new(store.clone());

    assert_ok!(aggregator.merge("alice", &contribution(42, "X", 8)).await);
    assert_ok!(aggregator.merge("bob", &contribution(42, "X (renamed)", 6)).await);

    let record = store.get(42).await.unwrap().unwrap();
    assert_eq!(record.subject_name, "X");
    assert_eq!(record.ratings.len(), 2);
    assert_eq!(record.ratings["alice"], json!(8));
    assert_eq!(record.ratings["bob"], json!(6));
}

#[tokio::test]
async fn merge_order_does_not_matter() {
    let forward = Arc::new(MemoryStore::new());
    let backward = Arc::new(MemoryStore::new());
    let contributions = [("a", 7u8), ("b", 9), ("c", 0), ("d", 4)];

    let aggregator = RatingAggregator::new(forward.clone());
    for (friend, rate) in contributions {
        aggregator.merge(friend, &contribution(1, "S", rate)).await.unwrap();
    }
    let aggregator = RatingAggregator::new(backward.clone());
    for (friend, rate) in contributions.iter().rev() {
        aggregator.merge(friend, &contribution(1, "S", *rate)).await.unwrap();
    }

    assert_eq!(forward.get_all().await.unwrap(), backward.get_all().await.unwrap());
}

#[tokio::test]
async fn re_merging_the_same_rating_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let aggregator = RatingAggregator::new(store.clone());
    let c = contribution(7, "Seven", 5);

    let first = aggregator.merge("alice", &c).await.unwrap();
    let second = aggregator.merge("alice", &c).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.get(7).await.unwrap().unwrap().ratings.len(), 1);
}

#[tokio::test]
async fn concurrent_merges_to_one_subject_keep_every_friend() {
    let store = Arc::new(MemoryStore::new());
    let aggregator = Arc::new(RatingAggregator::new(store.clone()));

    let handles: Vec<_> = (0..32u8)
        .map(|i| {
            let aggregator = aggregator.clone();
            tokio::spawn(async move {
                aggregator
                    .merge(&format!("friend-{}", i), &contribution(99, "Shared", i % 10 + 1))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let record = store.get(99).await.unwrap().unwrap();
    assert_eq!(record.ratings.len(), 32);
    assert_eq!(aggregator.active_subjects().await, 0);
}

#[tokio::test]
async fn failed_write_releases_the_subject_lock() {
    let store = Arc::new(FlakyStore::new().reject_put(7));
    let aggregator = RatingAggregator::new(store.clone());

    assert!(aggregator.merge("a", &contribution(7, "Broken", 6)).await.is_err());
    assert_ok!(aggregator.merge("a", &contribution(8, "Fine", 6)).await);

    assert_eq!(aggregator.active_subjects().await, 0);
    assert!(store.get(7).await.unwrap().is_none());
}

#[tokio::test]
async fn counted_merges_report_running_total() {
    let store = Arc::new(MemoryStore::new());
    let aggregator = RatingAggregator::new(store);
    let run = RunState::new();

    assert_eq!(aggregator.merge_counted(&run, "a", &contribution(1, "A", 8)).await.unwrap(), 1);
    assert_eq!(aggregator.merge_counted(&run, "a", &contribution(2, "B", 8)).await.unwrap(), 2);
    assert_eq!(run.total_saved(), 2);
}
