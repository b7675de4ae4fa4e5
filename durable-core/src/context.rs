//! The per-run execution handle offered to workflow code.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::codec::{Codec, CodecError};
use crate::error::StepError;
use crate::key::StepKey;
use crate::record::{StepRecord, StepStatus, NO_VALUE_TAG};
use crate::registry::TypeRegistry;
use crate::store::{AcquireOutcome, StepStore};

/// Per-run durable execution context.
///
/// Holds one store handle, a codec, the workflow id, the attempt's run
/// id, a hierarchical scope prefix and a sequence-counter map shared by
/// reference across every scope cloned from the same root. Cloning is
/// cheap; clones passed to spawned tasks keep sequencing and the store
/// handle consistent across parallel branches.
#[derive(Clone)]
pub struct DurableContext {
    workflow_id: String,
    run_id: String,
    scope_prefix: String,
    store: Arc<dyn StepStore>,
    codec: Arc<dyn Codec>,
    registry: Arc<TypeRegistry>,
    sequences: Arc<Mutex<HashMap<String, u32>>>,
}

impl DurableContext {
    /// Create the root context for one run attempt.
    pub fn root(
        workflow_id: impl Into<String>,
        run_id: impl Into<String>,
        store: Arc<dyn StepStore>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
            scope_prefix: String::new(),
            store,
            codec,
            registry: Arc::new(TypeRegistry::new()),
            sequences: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attach a decoder registry for [`step_any`](Self::step_any) calls.
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Derive a context whose step ids live under `scope`.
    ///
    /// The clone shares workflow id, run id, store, codec and the
    /// sequence-counter map; only the prefix grows, giving concurrent
    /// branches disjoint id namespaces.
    pub fn scoped(&self, scope: &str) -> Result<DurableContext, StepError> {
        let normalized = scope.trim();
        if normalized.is_empty() {
            return Err(StepError::EmptyScope);
        }
        let mut child = self.clone();
        child.scope_prefix = format!("{}{}/", self.scope_prefix, normalized);
        Ok(child)
    }

    /// Purge every persisted step for this workflow id.
    ///
    /// Intended for use before the first `step()` of a fresh run. Calling
    /// it mid-run leaves the in-memory sequence counters ahead of the
    /// now-empty store; that reconciliation is the caller's
    /// responsibility.
    pub async fn reset_workflow_state(&self) -> Result<(), StepError> {
        self.store.purge(&self.workflow_id).await?;
        Ok(())
    }

    /// Execute `work` durably, or replay its cached result.
    ///
    /// The step's persisted identity is the scope-qualified `id` plus a
    /// call sequence number, so repeated calls under one id (e.g. inside
    /// a loop) each get their own record. If a COMPLETED record exists
    /// the payload is decoded and returned without invoking `work`.
    /// Otherwise the call acquires the lease, runs `work`, and persists
    /// exactly one transition: COMPLETED with the encoded result, or
    /// FAILED with a description before the original error re-raises
    /// verbatim.
    pub async fn step<T, F, Fut>(&self, id: &str, work: F) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<T>> + Send,
    {
        let key = self.next_key(id);
        let step_key = key.key_string();

        if let Some(rec) = self
            .store
            .read(&self.workflow_id, &step_key)
            .await
            .map_err(StepError::from)?
        {
            if rec.status == StepStatus::Completed {
                debug!(step = %step_key, run = %self.run_id, "replaying completed step");
                return Ok(self.decode_typed(&step_key, &rec)?);
            }
        }

        match self
            .store
            .acquire(&self.workflow_id, &step_key, &self.run_id)
            .await
            .map_err(StepError::from)?
        {
            AcquireOutcome::AlreadyCompleted(rec) => {
                // Another attempt finished between the read above and the
                // acquisition; its payload is just as good.
                debug!(step = %step_key, run = %self.run_id, "replaying step completed during acquire");
                Ok(self.decode_typed(&step_key, &rec)?)
            }
            AcquireOutcome::OwnedElsewhere => Err(StepError::LeaseConflict(step_key).into()),
            AcquireOutcome::PreviouslyFailed(message) => Err(StepError::PreviousFailure {
                key: step_key,
                message,
            }
            .into()),
            AcquireOutcome::Acquired => {
                debug!(step = %step_key, run = %self.run_id, "executing step");
                let outcome = match work().await {
                    Ok(value) => self
                        .encode_typed(&step_key, &value)
                        .map(|payload| (value, payload))
                        .map_err(anyhow::Error::from),
                    Err(err) => Err(err),
                };
                match outcome {
                    Ok((value, (tag, payload))) => {
                        self.store
                            .complete(
                                &self.workflow_id,
                                &step_key,
                                &self.run_id,
                                Some(&tag),
                                payload.as_deref(),
                            )
                            .await
                            .map_err(StepError::from)?;
                        Ok(value)
                    }
                    Err(err) => {
                        debug!(step = %step_key, run = %self.run_id, "step failed: {err:#}");
                        self.store
                            .fail(&self.workflow_id, &step_key, &self.run_id, &format!("{err:#}"))
                            .await
                            .map_err(StepError::from)?;
                        Err(err)
                    }
                }
            }
        }
    }

    /// Dynamically-typed variant of [`step`](Self::step).
    ///
    /// The result type is erased; encoding and replay decoding go through
    /// the [`TypeRegistry`] attached at root construction. `None` results
    /// persist under the reserved no-value tag.
    pub async fn step_any<F, Fut>(
        &self,
        id: &str,
        work: F,
    ) -> anyhow::Result<Option<Box<dyn Any + Send>>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<Option<Box<dyn Any + Send>>>> + Send,
    {
        let key = self.next_key(id);
        let step_key = key.key_string();

        if let Some(rec) = self
            .store
            .read(&self.workflow_id, &step_key)
            .await
            .map_err(StepError::from)?
        {
            if rec.status == StepStatus::Completed {
                debug!(step = %step_key, run = %self.run_id, "replaying completed step");
                return Ok(self.decode_any(&step_key, &rec)?);
            }
        }

        match self
            .store
            .acquire(&self.workflow_id, &step_key, &self.run_id)
            .await
            .map_err(StepError::from)?
        {
            AcquireOutcome::AlreadyCompleted(rec) => Ok(self.decode_any(&step_key, &rec)?),
            AcquireOutcome::OwnedElsewhere => Err(StepError::LeaseConflict(step_key).into()),
            AcquireOutcome::PreviouslyFailed(message) => Err(StepError::PreviousFailure {
                key: step_key,
                message,
            }
            .into()),
            AcquireOutcome::Acquired => {
                let outcome = match work().await {
                    Ok(value) => self
                        .encode_any(&step_key, value.as_deref())
                        .map(|payload| (value, payload))
                        .map_err(anyhow::Error::from),
                    Err(err) => Err(err),
                };
                match outcome {
                    Ok((value, (tag, payload))) => {
                        self.store
                            .complete(
                                &self.workflow_id,
                                &step_key,
                                &self.run_id,
                                Some(&tag),
                                payload.as_deref(),
                            )
                            .await
                            .map_err(StepError::from)?;
                        Ok(value)
                    }
                    Err(err) => {
                        self.store
                            .fail(&self.workflow_id, &step_key, &self.run_id, &format!("{err:#}"))
                            .await
                            .map_err(StepError::from)?;
                        Err(err)
                    }
                }
            }
        }
    }

    fn next_key(&self, id: &str) -> StepKey {
        let full_id = format!("{}{}", self.scope_prefix, id);
        // A panicking step poisons nothing meaningful here; the counters
        // are plain integers, so recover the lock and keep sequencing.
        let mut sequences = self
            .sequences
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let seq = sequences.entry(full_id.clone()).or_insert(0);
        let current = *seq;
        *seq += 1;
        StepKey::new(full_id, current)
    }

    fn decode_typed<T: DeserializeOwned>(
        &self,
        step_key: &str,
        rec: &StepRecord,
    ) -> Result<T, StepError> {
        let value = match rec.output_json.as_deref() {
            // No payload is the persisted form of an absent result.
            None => Value::Null,
            Some(json) => self
                .codec
                .decode(json)
                .map_err(|source| StepError::Codec {
                    key: step_key.to_string(),
                    source,
                })?,
        };
        serde_json::from_value(value).map_err(|e| StepError::Codec {
            key: step_key.to_string(),
            source: CodecError(e.to_string()),
        })
    }

    fn encode_typed<T: Serialize>(
        &self,
        step_key: &str,
        value: &T,
    ) -> Result<(String, Option<String>), StepError> {
        let json = serde_json::to_value(value).map_err(|e| StepError::Codec {
            key: step_key.to_string(),
            source: CodecError(e.to_string()),
        })?;
        if json.is_null() {
            return Ok((NO_VALUE_TAG.to_string(), None));
        }
        let payload = self.codec.encode(&json).map_err(|source| StepError::Codec {
            key: step_key.to_string(),
            source,
        })?;
        Ok((type_name::<T>().to_string(), Some(payload)))
    }

    fn decode_any(
        &self,
        step_key: &str,
        rec: &StepRecord,
    ) -> Result<Option<Box<dyn Any + Send>>, StepError> {
        let (tag, json) = match (rec.output_tag.as_deref(), rec.output_json.as_deref()) {
            (None, _) | (Some(NO_VALUE_TAG), _) | (_, None) => return Ok(None),
            (Some(tag), Some(json)) => (tag, json),
        };
        let value = self.codec.decode(json).map_err(|source| StepError::Codec {
            key: step_key.to_string(),
            source,
        })?;
        let decoded = self
            .registry
            .decode_value(tag, value)
            .map_err(|source| StepError::Codec {
                key: step_key.to_string(),
                source,
            })?;
        Ok(Some(decoded))
    }

    fn encode_any(
        &self,
        step_key: &str,
        value: Option<&(dyn Any + Send)>,
    ) -> Result<(String, Option<String>), StepError> {
        let Some(value) = value else {
            return Ok((NO_VALUE_TAG.to_string(), None));
        };
        let (tag, json) = self
            .registry
            .encode_value(value)
            .map_err(|source| StepError::Codec {
                key: step_key.to_string(),
                source,
            })?;
        let payload = self.codec.encode(&json).map_err(|source| StepError::Codec {
            key: step_key.to_string(),
            source,
        })?;
        Ok((tag, Some(payload)))
    }
}
