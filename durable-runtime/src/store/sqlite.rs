//! SQLite-backed implementation of `StepStore`.
//!
//! One `steps` table keyed by (workflow_id, step_key). WAL journal mode
//! with NORMAL synchronous matches the durability stance of the engine:
//! committed rows survive a process kill, and a bounded busy timeout
//! covers contention from other processes sharing the file. Mutating
//! operations additionally run under a per-store mutex so concurrent
//! in-process callers serialize their read-classify-write sections.

use std::path::Path;

use async_trait::async_trait;
use chrono::Duration;
use durable_core::record::{now_epoch_ms, StepRecord, StepStatus};
use durable_core::store::{AcquireOutcome, StepStore, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::debug;

const DDL: &str = "CREATE TABLE IF NOT EXISTS steps (
    workflow_id TEXT NOT NULL,
    step_key TEXT NOT NULL,
    status TEXT NOT NULL,
    run_id TEXT NOT NULL,
    output_tag TEXT,
    output_json TEXT,
    error TEXT,
    updated_at_ms INTEGER NOT NULL,
    PRIMARY KEY (workflow_id, step_key)
)";

const SELECT_ROW: &str = "SELECT status, run_id, output_tag, output_json, error, updated_at_ms
    FROM steps WHERE workflow_id = ? AND step_key = ?";

/// Durable step table on a SQLite file.
pub struct SqliteStepStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
    zombie_timeout: Duration,
}

impl SqliteStepStore {
    /// Open (creating if missing) the step table at `path`.
    pub async fn open(path: &Path, zombie_timeout: Duration) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        // A single connection keeps SQLite's one-writer rule trivially
        // satisfied; the write_lock serializes multi-statement sections.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(backend_err)?;

        sqlx::query(DDL).execute(&pool).await.map_err(backend_err)?;

        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
            zombie_timeout,
        })
    }

    pub fn zombie_timeout(&self) -> Duration {
        self.zombie_timeout
    }

    /// Close the underlying pool. Idempotent.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn read_row(
        &self,
        workflow_id: &str,
        step_key: &str,
    ) -> Result<Option<StepRecord>, StoreError> {
        let row = sqlx::query(SELECT_ROW)
            .bind(workflow_id)
            .bind(step_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;
        row.map(|r| record_from_row(&r, step_key)).transpose()
    }
}

#[async_trait]
impl StepStore for SqliteStepStore {
    async fn read(
        &self,
        workflow_id: &str,
        step_key: &str,
    ) -> Result<Option<StepRecord>, StoreError> {
        self.read_row(workflow_id, step_key).await
    }

    async fn acquire(
        &self,
        workflow_id: &str,
        step_key: &str,
        run_id: &str,
    ) -> Result<AcquireOutcome, StoreError> {
        let now = now_epoch_ms();
        let timeout_ms = self.zombie_timeout.num_milliseconds();
        let _guard = self.write_lock.lock().await;

        sqlx::query(
            "INSERT OR IGNORE INTO steps (workflow_id, step_key, status, run_id, updated_at_ms)
             VALUES (?, ?, 'RUNNING', ?, ?)",
        )
        .bind(workflow_id)
        .bind(step_key)
        .bind(run_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        let Some(rec) = self.read_row(workflow_id, step_key).await? else {
            // Only reachable if a purge raced the insert.
            return Err(StoreError::Backend(format!(
                "step row vanished during acquisition: {step_key}"
            )));
        };

        match rec.status {
            StepStatus::Completed => return Ok(AcquireOutcome::AlreadyCompleted(rec)),
            StepStatus::Running => {
                // A row this run already holds counts as acquired, so the
                // create-if-absent above cannot lock out its own creator.
                if rec.run_id != run_id && now - rec.updated_at_ms < timeout_ms {
                    return Ok(AcquireOutcome::OwnedElsewhere);
                }
            }
            StepStatus::Failed => {
                // Only a fresh run id, or a timeout-qualified takeover,
                // may retry a failed step.
                if rec.run_id == run_id && now - rec.updated_at_ms < timeout_ms {
                    return Ok(AcquireOutcome::PreviouslyFailed(
                        rec.error.unwrap_or_default(),
                    ));
                }
            }
        }

        if rec.run_id != run_id {
            debug!(step = %step_key, from = %rec.run_id, to = %run_id, "taking over step lease");
        }
        sqlx::query(
            "UPDATE steps SET status = 'RUNNING', run_id = ?, error = NULL,
                 output_tag = NULL, output_json = NULL, updated_at_ms = ?
             WHERE workflow_id = ? AND step_key = ?",
        )
        .bind(run_id)
        .bind(now)
        .bind(workflow_id)
        .bind(step_key)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        Ok(AcquireOutcome::Acquired)
    }

    async fn complete(
        &self,
        workflow_id: &str,
        step_key: &str,
        run_id: &str,
        output_tag: Option<&str>,
        output_json: Option<&str>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            "UPDATE steps SET status = 'COMPLETED', output_tag = ?, output_json = ?,
                 error = NULL, updated_at_ms = ?
             WHERE workflow_id = ? AND step_key = ? AND run_id = ?",
        )
        .bind(output_tag)
        .bind(output_json)
        .bind(now_epoch_ms())
        .bind(workflow_id)
        .bind(step_key)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        if result.rows_affected() != 1 {
            return Err(StoreError::LeaseLost(step_key.to_string()));
        }
        Ok(())
    }

    async fn fail(
        &self,
        workflow_id: &str,
        step_key: &str,
        run_id: &str,
        error: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        // Best-effort: a zero-row update means the lease moved on, which
        // the erroring caller does not need to hear about.
        sqlx::query(
            "UPDATE steps SET status = 'FAILED', error = ?, updated_at_ms = ?
             WHERE workflow_id = ? AND step_key = ? AND run_id = ?",
        )
        .bind(error)
        .bind(now_epoch_ms())
        .bind(workflow_id)
        .bind(step_key)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    async fn purge(&self, workflow_id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM steps WHERE workflow_id = ?")
            .bind(workflow_id)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }
}

fn backend_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn record_from_row(row: &SqliteRow, step_key: &str) -> Result<StepRecord, StoreError> {
    let status_text: String = row.try_get("status").map_err(backend_err)?;
    let status = StepStatus::parse(&status_text).ok_or_else(|| StoreError::Corrupt {
        key: step_key.to_string(),
        detail: format!("unknown status '{status_text}'"),
    })?;
    Ok(StepRecord {
        status,
        run_id: row.try_get("run_id").map_err(backend_err)?,
        output_tag: row.try_get("output_tag").map_err(backend_err)?,
        output_json: row.try_get("output_json").map_err(backend_err)?,
        error: row.try_get("error").map_err(backend_err)?,
        updated_at_ms: row.try_get("updated_at_ms").map_err(backend_err)?,
    })
}
