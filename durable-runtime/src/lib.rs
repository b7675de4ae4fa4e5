//! Store implementations and run lifecycle for the durable step engine.
//!
//! `durable-core` defines the [`StepStore`](durable_core::StepStore)
//! protocol; this crate provides the SQLite-backed store used in
//! production, an in-memory reference store for tests, and the
//! [`WorkflowRunner`] that owns one store instance per run attempt.

pub mod runner;
pub mod store;

pub use runner::{RunOptions, WorkflowRunner};
pub use store::memory::MemoryStepStore;
pub use store::sqlite::SqliteStepStore;
