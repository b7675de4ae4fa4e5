//! In-memory implementation of `StepStore`.
//!
//! Stores records in a HashMap behind an RwLock. Nothing survives the
//! process, so it is useful for tests and as a reference implementation
//! of the acquisition protocol; durable deployments use
//! [`SqliteStepStore`](crate::SqliteStepStore).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Duration;
use durable_core::record::{now_epoch_ms, StepRecord, StepStatus};
use durable_core::store::{AcquireOutcome, StepStore, StoreError};

type RowKey = (String, String);

/// Thread-safe in-memory step table.
#[derive(Clone)]
pub struct MemoryStepStore {
    rows: Arc<RwLock<HashMap<RowKey, StepRecord>>>,
    zombie_timeout: Duration,
}

impl MemoryStepStore {
    pub fn new(zombie_timeout: Duration) -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            zombie_timeout,
        }
    }

    fn row_key(workflow_id: &str, step_key: &str) -> RowKey {
        (workflow_id.to_string(), step_key.to_string())
    }
}

impl Default for MemoryStepStore {
    fn default() -> Self {
        Self::new(Duration::zero())
    }
}

#[async_trait]
impl StepStore for MemoryStepStore {
    async fn read(
        &self,
        workflow_id: &str,
        step_key: &str,
    ) -> Result<Option<StepRecord>, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;
        Ok(rows.get(&Self::row_key(workflow_id, step_key)).cloned())
    }

    async fn acquire(
        &self,
        workflow_id: &str,
        step_key: &str,
        run_id: &str,
    ) -> Result<AcquireOutcome, StoreError> {
        let now = now_epoch_ms();
        let timeout_ms = self.zombie_timeout.num_milliseconds();
        let mut rows = self
            .rows
            .write()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;

        let entry = rows
            .entry(Self::row_key(workflow_id, step_key))
            .or_insert_with(|| StepRecord::running(run_id, now));

        match entry.status {
            StepStatus::Completed => Ok(AcquireOutcome::AlreadyCompleted(entry.clone())),
            StepStatus::Running => {
                // A row this run already holds counts as acquired, so the
                // create-if-absent above cannot lock out its own creator.
                if entry.run_id != run_id && now - entry.updated_at_ms < timeout_ms {
                    return Ok(AcquireOutcome::OwnedElsewhere);
                }
                *entry = StepRecord::running(run_id, now);
                Ok(AcquireOutcome::Acquired)
            }
            StepStatus::Failed => {
                // Only a fresh run id, or a timeout-qualified takeover,
                // may retry a failed step.
                if entry.run_id == run_id && now - entry.updated_at_ms < timeout_ms {
                    return Ok(AcquireOutcome::PreviouslyFailed(
                        entry.error.clone().unwrap_or_default(),
                    ));
                }
                *entry = StepRecord::running(run_id, now);
                Ok(AcquireOutcome::Acquired)
            }
        }
    }

    async fn complete(
        &self,
        workflow_id: &str,
        step_key: &str,
        run_id: &str,
        output_tag: Option<&str>,
        output_json: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;
        match rows.get_mut(&Self::row_key(workflow_id, step_key)) {
            Some(rec) if rec.run_id == run_id => {
                rec.status = StepStatus::Completed;
                rec.output_tag = output_tag.map(str::to_string);
                rec.output_json = output_json.map(str::to_string);
                rec.error = None;
                rec.updated_at_ms = now_epoch_ms();
                Ok(())
            }
            _ => Err(StoreError::LeaseLost(step_key.to_string())),
        }
    }

    async fn fail(
        &self,
        workflow_id: &str,
        step_key: &str,
        run_id: &str,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;
        // Best-effort: a lost lease here is swallowed, the caller is
        // already erroring.
        if let Some(rec) = rows.get_mut(&Self::row_key(workflow_id, step_key)) {
            if rec.run_id == run_id {
                rec.status = StepStatus::Failed;
                rec.error = Some(error.to_string());
                rec.updated_at_ms = now_epoch_ms();
            }
        }
        Ok(())
    }

    async fn purge(&self, workflow_id: &str) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;
        rows.retain(|(wf, _), _| wf != workflow_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WF: &str = "wf-1";

    #[tokio::test]
    async fn fresh_key_is_acquired_with_zero_timeout() {
        let store = MemoryStepStore::default();
        let outcome = store.acquire(WF, "a#0", "run-1").await.unwrap();
        assert!(matches!(outcome, AcquireOutcome::Acquired));
    }

    #[tokio::test]
    async fn own_fresh_insert_is_acquired_with_nonzero_timeout() {
        let store = MemoryStepStore::new(Duration::seconds(300));
        let outcome = store.acquire(WF, "a#0", "run-1").await.unwrap();
        assert!(matches!(outcome, AcquireOutcome::Acquired));
    }

    #[tokio::test]
    async fn live_foreign_lease_blocks_acquisition() {
        let store = MemoryStepStore::new(Duration::seconds(300));
        store.acquire(WF, "a#0", "run-1").await.unwrap();
        let outcome = store.acquire(WF, "a#0", "run-2").await.unwrap();
        assert!(matches!(outcome, AcquireOutcome::OwnedElsewhere));
    }

    #[tokio::test]
    async fn stale_lease_is_taken_over() {
        let store = MemoryStepStore::new(Duration::milliseconds(20));
        store.acquire(WF, "a#0", "run-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        let outcome = store.acquire(WF, "a#0", "run-2").await.unwrap();
        assert!(matches!(outcome, AcquireOutcome::Acquired));

        let rec = store.read(WF, "a#0").await.unwrap().unwrap();
        assert_eq!(rec.run_id, "run-2");
        assert_eq!(rec.status, StepStatus::Running);
    }

    #[tokio::test]
    async fn completed_row_reports_cached_payload() {
        let store = MemoryStepStore::default();
        store.acquire(WF, "a#0", "run-1").await.unwrap();
        store
            .complete(WF, "a#0", "run-1", Some("tag"), Some("\"x\""))
            .await
            .unwrap();

        match store.acquire(WF, "a#0", "run-2").await.unwrap() {
            AcquireOutcome::AlreadyCompleted(rec) => {
                assert_eq!(rec.output_json.as_deref(), Some("\"x\""));
                assert!(rec.error.is_none());
            }
            other => panic!("expected AlreadyCompleted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_row_is_retried_by_a_fresh_run() {
        let store = MemoryStepStore::new(Duration::seconds(300));
        store.acquire(WF, "a#0", "run-1").await.unwrap();
        store.fail(WF, "a#0", "run-1", "boom").await.unwrap();

        let outcome = store.acquire(WF, "a#0", "run-2").await.unwrap();
        assert!(matches!(outcome, AcquireOutcome::Acquired));

        // Takeover cleared the prior error.
        let rec = store.read(WF, "a#0").await.unwrap().unwrap();
        assert!(rec.error.is_none());
    }

    #[tokio::test]
    async fn failed_row_blocks_its_own_run_within_timeout() {
        let store = MemoryStepStore::new(Duration::seconds(300));
        store.acquire(WF, "a#0", "run-1").await.unwrap();
        store.fail(WF, "a#0", "run-1", "boom").await.unwrap();

        match store.acquire(WF, "a#0", "run-1").await.unwrap() {
            AcquireOutcome::PreviouslyFailed(message) => assert_eq!(message, "boom"),
            other => panic!("expected PreviouslyFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_with_lost_lease_is_fatal() {
        let store = MemoryStepStore::default();
        store.acquire(WF, "a#0", "run-1").await.unwrap();
        // run-2 takes the lease over (zero timeout).
        store.acquire(WF, "a#0", "run-2").await.unwrap();

        let err = store
            .complete(WF, "a#0", "run-1", Some("tag"), Some("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LeaseLost(_)));
    }

    #[tokio::test]
    async fn fail_with_lost_lease_is_swallowed() {
        let store = MemoryStepStore::default();
        store.acquire(WF, "a#0", "run-1").await.unwrap();
        store.acquire(WF, "a#0", "run-2").await.unwrap();

        store.fail(WF, "a#0", "run-1", "boom").await.unwrap();
        // The live lease is untouched.
        let rec = store.read(WF, "a#0").await.unwrap().unwrap();
        assert_eq!(rec.status, StepStatus::Running);
        assert_eq!(rec.run_id, "run-2");
    }

    #[tokio::test]
    async fn purge_removes_only_the_given_workflow() {
        let store = MemoryStepStore::default();
        store.acquire("wf-a", "a#0", "run-1").await.unwrap();
        store.acquire("wf-b", "a#0", "run-1").await.unwrap();

        store.purge("wf-a").await.unwrap();

        assert!(store.read("wf-a", "a#0").await.unwrap().is_none());
        assert!(store.read("wf-b", "a#0").await.unwrap().is_some());
    }
}
