//! Decoder registry for dynamically-typed step outputs.
//!
//! A replayed step has to rebuild its cached value from a stored type
//! tag. For statically-typed [`step`](crate::DurableContext::step) calls
//! the call site supplies the type; for [`step_any`] calls the tag is
//! resolved through this registry, populated once at workflow
//! registration time.
//!
//! [`step_any`]: crate::DurableContext::step_any

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::codec::CodecError;

type EncodeFn = Arc<dyn Fn(&(dyn Any + Send)) -> Result<Value, CodecError> + Send + Sync>;
type DecodeFn = Arc<dyn Fn(Value) -> Result<Box<dyn Any + Send>, CodecError> + Send + Sync>;

/// Bidirectional mapping between type tags and payload types.
///
/// `register::<T>(tag)` installs an encoder keyed by `TypeId` and a
/// decoder keyed by the tag string, so dynamic steps can be persisted on
/// first execution and rebuilt on replay without reflection.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    by_tag: HashMap<String, DecodeFn>,
    by_type: HashMap<TypeId, (String, EncodeFn)>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `tag`. Re-registering a tag replaces the
    /// previous entry.
    pub fn register<T>(&mut self, tag: &str)
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let decode: DecodeFn = Arc::new(|value| {
            let typed: T = serde_json::from_value(value).map_err(|e| CodecError(e.to_string()))?;
            Ok(Box::new(typed) as Box<dyn Any + Send>)
        });
        let encode: EncodeFn = Arc::new(|any| {
            let typed = any
                .downcast_ref::<T>()
                .ok_or_else(|| CodecError("registered encoder got a mismatched type".into()))?;
            serde_json::to_value(typed).map_err(|e| CodecError(e.to_string()))
        });
        self.by_tag.insert(tag.to_string(), decode);
        self.by_type
            .insert(TypeId::of::<T>(), (tag.to_string(), encode));
    }

    pub fn contains_tag(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    /// Encode a dynamic value, returning its registered tag and payload.
    pub(crate) fn encode_value(
        &self,
        value: &(dyn Any + Send),
    ) -> Result<(String, Value), CodecError> {
        let (tag, encode) = self
            .by_type
            .get(&value.type_id())
            .ok_or_else(|| CodecError("step output type is not registered".into()))?;
        Ok((tag.clone(), encode(value)?))
    }

    /// Decode a payload by its stored tag.
    pub(crate) fn decode_value(
        &self,
        tag: &str,
        value: Value,
    ) -> Result<Box<dyn Any + Send>, CodecError> {
        let decode = self
            .by_tag
            .get(tag)
            .ok_or_else(|| CodecError(format!("no decoder registered for tag '{tag}'")))?;
        decode(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ticket {
        id: String,
        approved: bool,
    }

    #[test]
    fn registered_type_round_trips() {
        let mut registry = TypeRegistry::new();
        registry.register::<Ticket>("ticket");

        let ticket = Ticket {
            id: "laptop_1".into(),
            approved: true,
        };
        let (tag, value) = registry.encode_value(&ticket).unwrap();
        assert_eq!(tag, "ticket");

        let decoded = registry.decode_value(&tag, value).unwrap();
        assert_eq!(decoded.downcast_ref::<Ticket>(), Some(&ticket));
    }

    #[test]
    fn unregistered_type_is_a_codec_error() {
        let registry = TypeRegistry::new();
        assert!(registry.encode_value(&"orphan".to_string()).is_err());
    }

    #[test]
    fn unknown_tag_is_a_codec_error() {
        let registry = TypeRegistry::new();
        let err = registry
            .decode_value("ghost", Value::Null)
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn reregistering_a_tag_replaces_the_decoder() {
        let mut registry = TypeRegistry::new();
        registry.register::<u32>("n");
        registry.register::<String>("n");
        let decoded = registry
            .decode_value("n", Value::String("hi".into()))
            .unwrap();
        assert!(decoded.downcast_ref::<String>().is_some());
    }
}
