//! Lease exclusivity under genuinely concurrent acquirers, against both
//! store implementations.

use std::sync::Arc;

use chrono::Duration;
use durable_core::store::{AcquireOutcome, StepStore};
use durable_runtime::{MemoryStepStore, SqliteStepStore};

const WF: &str = "wf-race";
const KEY: &str = "hot#0";

/// Race `contenders` tasks for one key and count how many were granted
/// the lease.
async fn race(store: Arc<dyn StepStore>, contenders: usize) -> usize {
    let mut handles = Vec::with_capacity(contenders);
    for i in 0..contenders {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.acquire(WF, KEY, &format!("run-{i}")).await
        }));
    }

    let mut acquired = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            AcquireOutcome::Acquired => acquired += 1,
            AcquireOutcome::OwnedElsewhere => {}
            other => panic!("unexpected outcome in race: {other:?}"),
        }
    }
    acquired
}

#[tokio::test]
async fn memory_store_grants_exactly_one_lease() {
    let store = Arc::new(MemoryStepStore::new(Duration::seconds(300)));
    assert_eq!(race(store, 8).await, 1);
}

#[tokio::test]
async fn sqlite_store_grants_exactly_one_lease() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStepStore::open(&dir.path().join("steps.sqlite"), Duration::seconds(300))
        .await
        .unwrap();
    assert_eq!(race(Arc::new(store), 8).await, 1);
}

#[tokio::test]
async fn stale_lease_is_reclaimed_by_exactly_one_contender() {
    let store = Arc::new(MemoryStepStore::new(Duration::milliseconds(20)));
    store.acquire(WF, KEY, "run-owner").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(40)).await;

    assert_eq!(race(store, 4).await, 1);
}

#[tokio::test]
async fn young_lease_blocks_every_contender() {
    let store = Arc::new(MemoryStepStore::new(Duration::seconds(300)));
    store.acquire(WF, KEY, "run-owner").await.unwrap();

    assert_eq!(race(store, 4).await, 0);
}
