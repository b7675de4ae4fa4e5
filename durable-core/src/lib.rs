//! Step-memoization and lease engine for durable workflow execution.
//!
//! Workflow code is written as ordinary async Rust, but every discrete
//! unit of work goes through [`DurableContext::step`], which records the
//! result durably before returning it. A killed process can be restarted
//! against the same store and workflow id: completed steps replay from
//! their persisted payloads without re-running side effects, and
//! execution resumes at the first step lacking a durable result.
//!
//! The crate is the engine core only. Store implementations and the run
//! lifecycle live in `durable-runtime`; workflow business logic is
//! supplied by the caller through the [`Workflow`] trait.

pub mod codec;
pub mod context;
pub mod error;
pub mod key;
pub mod record;
pub mod registry;
pub mod store;
pub mod workflow;

pub use codec::{Codec, CodecError, JsonCodec};
pub use context::DurableContext;
pub use error::StepError;
pub use key::StepKey;
pub use record::{StepRecord, StepStatus};
pub use registry::TypeRegistry;
pub use store::{AcquireOutcome, StepStore, StoreError};
pub use workflow::Workflow;
