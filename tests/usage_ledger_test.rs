//! Integration tests for the SQLite usage ledger.

mod common;

use chrono::NaiveDate;
use common::setup_test_db;
use datawise::adapters::sqlite::SqliteUsageRepository;
use datawise::domain::models::UsageDelta;
use datawise::domain::ports::UsageRepository;

fn day(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

#[tokio::test]
async fn deltas_accumulate_within_a_day() {
    let repo = SqliteUsageRepository::new(setup_test_db().await);
    let d = day("2026-08-06");

    repo.add(d, UsageDelta::new(1000, 500, 1.2)).await.unwrap();
    repo.add(d, UsageDelta::new(200, 100, 0.3)).await.unwrap();

    let total = repo.day_total(d).await.unwrap();
    assert!((total.cost_usd - 1.5).abs() < 1e-9);
    assert_eq!(total.input_tokens, 1200);
    assert_eq!(total.output_tokens, 600);
}

#[tokio::test]
async fn crossing_the_day_boundary_preserves_the_archive() {
    let repo = SqliteUsageRepository::new(setup_test_db().await);

    repo.add(day("2026-08-05"), UsageDelta::new(0, 0, 2.0))
        .await
        .unwrap();
    repo.add(day("2026-08-06"), UsageDelta::new(0, 0, 0.5))
        .await
        .unwrap();

    // The new day starts from zero plus its own deltas.
    let today = repo.day_total(day("2026-08-06")).await.unwrap();
    assert!((today.cost_usd - 0.5).abs() < 1e-9);

    // The prior day's row is archived, not discarded.
    let yesterday = repo.day_total(day("2026-08-05")).await.unwrap();
    assert!((yesterday.cost_usd - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn unknown_day_reads_as_zero() {
    let repo = SqliteUsageRepository::new(setup_test_db().await);
    let total = repo.day_total(day("1999-01-01")).await.unwrap();
    assert!(total.cost_usd.abs() < f64::EPSILON);
    assert_eq!(total.input_tokens, 0);
}

#[tokio::test]
async fn history_is_most_recent_first() {
    let repo = SqliteUsageRepository::new(setup_test_db().await);

    for (d, cost) in [("2026-08-04", 1.0), ("2026-08-06", 3.0), ("2026-08-05", 2.0)] {
        repo.add(day(d), UsageDelta::new(0, 0, cost)).await.unwrap();
    }

    let history = repo.history(2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].day, day("2026-08-06"));
    assert_eq!(history[1].day, day("2026-08-05"));
}
