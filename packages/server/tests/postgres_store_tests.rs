//! Integration tests for the Postgres document store.
//!
//! Uses a shared testcontainers Postgres; run with
//! `cargo test -- --ignored` on a machine with Docker.

mod common;

use std::collections::BTreeSet;

use crate::common::{create_issue, new_issue, PostgresHarness, ALICE, BOB};
use engagement_core::common::IssueId;
use engagement_core::domains::issues::IssueStatus;
use engagement_core::domains::status_ledger::HistoryOrder;
use engagement_core::kernel::{DocumentStore, Precondition, Write};
use serde_json::json;
use test_context::test_context;

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn precondition_failure_leaves_batch_unapplied(ctx: &PostgresHarness) {
    let prefix = format!("test:{}:", IssueId::new());
    let a = format!("{}a", prefix);
    let b = format!("{}b", prefix);

    ctx.store.put(&a, json!(1), Precondition::DoesNotExist).await.unwrap();

    let outcome = ctx
        .store
        .commit(vec![
            Write::put(b.clone(), json!(2), Precondition::DoesNotExist),
            Write::put(a.clone(), json!(3), Precondition::DoesNotExist),
        ])
        .await
        .unwrap();
    assert!(!outcome.is_committed());
    assert!(ctx.store.get(&b).await.unwrap().is_none());
    assert_eq!(ctx.store.get(&a).await.unwrap().unwrap().value, json!(1));

    let keys: Vec<String> = ctx
        .store
        .scan(&prefix)
        .await
        .unwrap()
        .into_iter()
        .map(|(key, _)| key)
        .collect();
    assert_eq!(keys, vec![a]);
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn counter_is_unique_under_concurrency(ctx: &PostgresHarness) {
    let counter = format!("test_counter_{}", IssueId::new());

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let store = ctx.store.clone();
            let counter = counter.clone();
            tokio::spawn(async move { store.atomic_increment(&counter).await })
        })
        .collect();

    let mut values = BTreeSet::new();
    for handle in handles {
        assert!(values.insert(handle.await.unwrap().unwrap()));
    }
    assert_eq!(values, (1..=25).collect::<BTreeSet<i64>>());
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn engine_round_trip_against_postgres(ctx: &PostgresHarness) {
    let issue = create_issue(&ctx.engine, ALICE, "Persisted").await;

    let first = ctx.engine.upvote(issue.id, BOB).await.unwrap();
    let second = ctx.engine.upvote(issue.id, BOB).await.unwrap();
    assert!(first.success);
    assert!(second.already_acted);

    ctx.engine
        .change_status(issue.id, IssueStatus::Closed, BOB, Some("Done"))
        .await
        .unwrap();
    let history = ctx
        .engine
        .status_history(issue.id, HistoryOrder::Asc)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    let stored = ctx.engine.get_issue(issue.id).await.unwrap();
    assert_eq!(stored.upvote_count, 1);
    assert_eq!(stored.status, IssueStatus::Closed);

    ctx.engine.delete_issue(issue.id).await.unwrap();
    assert!(ctx.engine.get_issue(issue.id).await.is_err());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn issue_numbers_increase_across_engines() {
    let ctx = PostgresHarness::new().await.unwrap();
    let other = PostgresHarness::new().await.unwrap();

    let (a, b) = tokio::join!(
        ctx.engine.create_issue(new_issue("From A"), ALICE),
        other.engine.create_issue(new_issue("From B"), BOB),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.issue_number, b.issue_number);
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn scan_treats_like_wildcards_literally(ctx: &PostgresHarness) {
    let run = IssueId::new();
    let literal = format!("test_{}:a_b%", run);
    let lookalike = format!("test_{}:axb%", run);

    ctx.store.put(&literal, json!(1), Precondition::None).await.unwrap();
    ctx.store.put(&lookalike, json!(2), Precondition::None).await.unwrap();

    let keys: Vec<String> = ctx
        .store
        .scan(&format!("test_{}:a_", run))
        .await
        .unwrap()
        .into_iter()
        .map(|(key, _)| key)
        .collect();
    assert_eq!(keys, vec![literal]);
}
