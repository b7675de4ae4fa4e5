//! Employee-onboarding demo for the durable step engine.
//!
//! Run it once with `--crash-at` to die mid-workflow, then run it again
//! with the same `--workflow-id` and watch the finished steps replay
//! from SQLite instead of re-executing.

mod activities;
mod faults;
mod onboarding;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use clap::Parser;
use durable_runtime::{RunOptions, WorkflowRunner};
use tracing_subscriber::EnvFilter;

use crate::faults::{CrashAt, FaultHook, NoFault};
use crate::onboarding::EmployeeOnboarding;

#[derive(Debug, Parser)]
#[command(name = "durable-app", about = "Durable employee-onboarding demo")]
struct Args {
    /// Identity of the workflow instance; reruns with the same id resume
    /// its history.
    #[arg(long, default_value = "onboarding-001")]
    workflow_id: String,

    /// Employee to onboard.
    #[arg(long, default_value = "Alice")]
    employee: String,

    /// Fault point to crash at: `after-create-record` or
    /// `after-provisioning`.
    #[arg(long)]
    crash_at: Option<String>,

    /// SQLite file holding step state.
    #[arg(long, default_value = "./state.sqlite")]
    db: PathBuf,

    /// Discard the workflow's persisted history before running.
    #[arg(long)]
    reset: bool,

    /// Age in milliseconds after which a RUNNING lease from another run
    /// is considered abandoned. Zero means take over immediately.
    #[arg(long, default_value_t = 0)]
    zombie_timeout_ms: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Some(parent) = args.db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let faults: Arc<dyn FaultHook> = match &args.crash_at {
        Some(point) => Arc::new(CrashAt::new(point.clone())),
        None => Arc::new(NoFault),
    };
    let workflow = EmployeeOnboarding::new(args.employee.clone(), faults);

    let runner = WorkflowRunner::new(
        &args.db,
        Duration::milliseconds(args.zombie_timeout_ms),
    );
    runner
        .run_with_options(&args.workflow_id, &workflow, RunOptions { reset: args.reset })
        .await
}
