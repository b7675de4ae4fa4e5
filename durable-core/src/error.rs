//! Errors raised by the durable context itself.
//!
//! Step work errors are never wrapped in these: they re-raise verbatim
//! through the `anyhow::Result` returned by
//! [`step`](crate::DurableContext::step).

use crate::codec::CodecError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// Malformed argument; nothing was persisted.
    #[error("scope name must be non-empty")]
    EmptyScope,
    /// The step is owned by another live attempt. No automatic retry;
    /// a fresh run or a stale-lease takeover may claim it later.
    #[error("step {0} is currently owned by a live attempt")]
    LeaseConflict(String),
    /// The step terminally failed under a prior attempt and was not
    /// reclaimed.
    #[error("step {key} previously failed and was not retried: {message}")]
    PreviousFailure { key: String, message: String },
    /// Payload could not be encoded or decoded.
    #[error("step {key} payload: {source}")]
    Codec {
        key: String,
        #[source]
        source: CodecError,
    },
    /// The persistence layer failed; always fatal for the call.
    #[error(transparent)]
    Storage(#[from] StoreError),
}
