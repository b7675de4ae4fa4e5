//! Run lifecycle: one store, one run id, one workflow attempt.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use durable_core::codec::JsonCodec;
use durable_core::context::DurableContext;
use durable_core::registry::TypeRegistry;
use durable_core::store::StepStore;
use durable_core::workflow::Workflow;
use tracing::info;
use uuid::Uuid;

use crate::store::sqlite::SqliteStepStore;

/// Per-attempt options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Purge the workflow's persisted history before running.
    pub reset: bool,
}

/// Owns the lifecycle of workflow attempts against one SQLite file.
///
/// Each [`run`](Self::run) call is exactly one attempt: it opens a fresh
/// store, mints a new run id, invokes the workflow against a root
/// context, and closes the store on every exit path. No retry logic
/// lives here; restarting after a crash is simply another `run` with the
/// same workflow id.
pub struct WorkflowRunner {
    db_path: PathBuf,
    zombie_timeout: Duration,
    registry: TypeRegistry,
}

impl WorkflowRunner {
    pub fn new(db_path: impl Into<PathBuf>, zombie_timeout: Duration) -> Self {
        Self {
            db_path: db_path.into(),
            zombie_timeout,
            registry: TypeRegistry::new(),
        }
    }

    /// Install the decoder registry handed to every run's context.
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Run one attempt of `workflow` under `workflow_id`.
    pub async fn run(&self, workflow_id: &str, workflow: &dyn Workflow) -> anyhow::Result<()> {
        self.run_with_options(workflow_id, workflow, RunOptions::default())
            .await
    }

    /// Run one attempt, optionally purging prior history first.
    pub async fn run_with_options(
        &self,
        workflow_id: &str,
        workflow: &dyn Workflow,
        options: RunOptions,
    ) -> anyhow::Result<()> {
        let store = Arc::new(SqliteStepStore::open(&self.db_path, self.zombie_timeout).await?);
        let run_id = Uuid::new_v4().to_string();
        info!(
            workflow = %workflow_id,
            run = %run_id,
            db = %self.db_path.display(),
            reset = options.reset,
            "starting workflow attempt"
        );

        let ctx = DurableContext::root(
            workflow_id,
            &run_id,
            Arc::clone(&store) as Arc<dyn StepStore>,
            Arc::new(JsonCodec),
        )
        .with_registry(self.registry.clone());

        let result = async {
            if options.reset {
                ctx.reset_workflow_state().await?;
            }
            workflow.run(&ctx).await
        }
        .await;

        // Closed on every exit path, success or failure.
        store.close().await;

        match &result {
            Ok(()) => info!(workflow = %workflow_id, run = %run_id, "workflow attempt completed"),
            Err(e) => info!(workflow = %workflow_id, run = %run_id, "workflow attempt failed: {e:#}"),
        }
        result
    }
}
