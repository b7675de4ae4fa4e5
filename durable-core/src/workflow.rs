//! The business-logic collaborator boundary.

use async_trait::async_trait;

use crate::context::DurableContext;

/// A workflow executed under a durable context.
///
/// Requirements on the author: every non-deterministic or externally
/// visible effect must go through [`DurableContext::step`], and every
/// concurrently-running branch must use a distinct
/// [`DurableContext::scoped`] namespace. Given that, the workflow may be
/// killed at any point and re-run against the same store and workflow id
/// to resume where it left off.
#[async_trait]
pub trait Workflow: Send + Sync {
    async fn run(&self, ctx: &DurableContext) -> anyhow::Result<()>;
}
