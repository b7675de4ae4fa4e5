//! Durable step table and its lease protocol.
//!
//! The trait abstracts the storage engine; implementations live in
//! `durable-runtime` (SQLite, in-memory). Any engine works provided it
//! supports atomic create-if-absent-or-update and keeps previously
//! committed rows intact across a crash.

use async_trait::async_trait;

use crate::record::StepRecord;

/// Error from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `complete` found the lease held by someone else, or no record at
    /// all. Fatal: the attempt lost its claim mid-execution.
    #[error("lease lost or missing record for step {0}")]
    LeaseLost(String),
    /// A persisted row could not be interpreted.
    #[error("corrupt step record for {key}: {detail}")]
    Corrupt { key: String, detail: String },
    /// I/O error in the storage engine.
    #[error("storage error: {0}")]
    Backend(String),
}

/// Outcome of one lease acquisition attempt.
///
/// Computed entirely inside the store's critical section, so callers
/// never need a follow-up read to classify a refusal.
#[derive(Debug)]
pub enum AcquireOutcome {
    /// The caller now holds the lease and must run the step.
    Acquired,
    /// The step already finished; the record carries the cached payload.
    AlreadyCompleted(StepRecord),
    /// Another live attempt holds the lease.
    OwnedElsewhere,
    /// The step failed under this same run id and was not reclaimed.
    PreviouslyFailed(String),
}

/// Durable table of step execution records with at-most-one-active-lease
/// semantics per (workflow id, step key).
///
/// All mutating operations execute within a per-store mutual-exclusion
/// critical section, serializing concurrent callers inside one process.
/// Cross-process sharing of the same persisted store relies on the
/// storage engine's own locking and durability.
#[async_trait]
pub trait StepStore: Send + Sync {
    /// Point lookup, no side effect.
    async fn read(
        &self,
        workflow_id: &str,
        step_key: &str,
    ) -> Result<Option<StepRecord>, StoreError>;

    /// Acquisition/takeover protocol:
    ///
    /// 1. Create the row RUNNING under `run_id` if absent (concurrent
    ///    creators race; at most one row results).
    /// 2. Classify the row as it now exists:
    ///    - COMPLETED yields [`AcquireOutcome::AlreadyCompleted`];
    ///    - RUNNING under `run_id` itself counts as already owned and is
    ///      acquired with a refreshed timestamp;
    ///    - RUNNING under another run, younger than the zombie timeout,
    ///      yields [`AcquireOutcome::OwnedElsewhere`];
    ///    - FAILED under `run_id` itself, younger than the timeout,
    ///      yields [`AcquireOutcome::PreviouslyFailed`];
    ///    - anything else (stale lease, foreign failure, zero timeout)
    ///      is reclaimed: lease holder and timestamp overwritten, prior
    ///      payload and error cleared.
    ///
    /// With a zero zombie timeout nothing is ever "young", so every
    /// non-completed row falls through to takeover.
    async fn acquire(
        &self,
        workflow_id: &str,
        step_key: &str,
        run_id: &str,
    ) -> Result<AcquireOutcome, StoreError>;

    /// Mark the step COMPLETED with its payload, only while `run_id`
    /// still holds the lease; otherwise [`StoreError::LeaseLost`].
    async fn complete(
        &self,
        workflow_id: &str,
        step_key: &str,
        run_id: &str,
        output_tag: Option<&str>,
        output_json: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Mark the step FAILED with a message, scoped to a matching lease.
    /// Best-effort: a lost-lease mismatch is swallowed since the caller
    /// is already on an error path; real I/O errors still surface.
    async fn fail(
        &self,
        workflow_id: &str,
        step_key: &str,
        run_id: &str,
        error: &str,
    ) -> Result<(), StoreError>;

    /// Delete every row for the workflow id.
    async fn purge(&self, workflow_id: &str) -> Result<(), StoreError>;
}
