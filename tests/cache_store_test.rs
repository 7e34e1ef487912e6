//! Integration tests for the SQLite cache repository.

mod common;

use common::setup_test_db;
use datawise::adapters::sqlite::SqliteCacheRepository;
use datawise::domain::models::{CacheEntry, CostScope, DataRef, TerminationOutcome};
use datawise::domain::ports::CacheRepository;
use datawise::Fingerprint;

fn entry(query: &str, data_ref: Option<DataRef>) -> CacheEntry {
    let fingerprint = Fingerprint::compute(query, data_ref.as_ref());
    CacheEntry::new(
        fingerprint,
        query.to_string(),
        data_ref,
        "the answer".to_string(),
        TerminationOutcome::GoalSatisfied,
        0.42,
    )
}

#[tokio::test]
async fn put_get_round_trip() {
    let repo = SqliteCacheRepository::new(setup_test_db().await);
    let e = entry("plot sales by month", Some(DataRef::new("sales.csv", "v1")));

    repo.put(&e).await.unwrap();

    let loaded = repo.get(&e.fingerprint).await.unwrap().unwrap();
    assert_eq!(loaded.answer, "the answer");
    assert_eq!(loaded.outcome, TerminationOutcome::GoalSatisfied);
    assert_eq!(loaded.data_ref, Some(DataRef::new("sales.csv", "v1")));
    assert!((loaded.cost_usd - 0.42).abs() < 1e-9);
}

#[tokio::test]
async fn outcome_variants_survive_round_trip() {
    let repo = SqliteCacheRepository::new(setup_test_db().await);

    let mut e = entry("q one two three", None);
    e.outcome = TerminationOutcome::CostThresholdExceeded {
        scope: CostScope::Daily,
    };
    repo.put(&e).await.unwrap();

    let loaded = repo.get(&e.fingerprint).await.unwrap().unwrap();
    assert_eq!(
        loaded.outcome,
        TerminationOutcome::CostThresholdExceeded {
            scope: CostScope::Daily
        }
    );
}

#[tokio::test]
async fn put_replaces_wholesale() {
    let repo = SqliteCacheRepository::new(setup_test_db().await);

    let mut e = entry("same question again", None);
    repo.put(&e).await.unwrap();

    e.answer = "a fresher answer".to_string();
    repo.put(&e).await.unwrap();

    let loaded = repo.get(&e.fingerprint).await.unwrap().unwrap();
    assert_eq!(loaded.answer, "a fresher answer");
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn miss_delete_clear_count() {
    let repo = SqliteCacheRepository::new(setup_test_db().await);

    let missing = Fingerprint::compute("never stored", None);
    assert!(repo.get(&missing).await.unwrap().is_none());

    let e1 = entry("first question here", None);
    let e2 = entry("second question here", None);
    repo.put(&e1).await.unwrap();
    repo.put(&e2).await.unwrap();
    assert_eq!(repo.count().await.unwrap(), 2);

    repo.delete(&e1.fingerprint).await.unwrap();
    assert!(repo.get(&e1.fingerprint).await.unwrap().is_none());

    assert_eq!(repo.clear().await.unwrap(), 1);
    assert_eq!(repo.count().await.unwrap(), 0);
}
