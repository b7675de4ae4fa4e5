//! Serialization boundary for step payloads.
//!
//! The store persists payloads as text; the codec converts between that
//! text and `serde_json::Value`, which the context bridges to concrete
//! Rust types. Bridging through `Value` keeps the trait object-safe so a
//! context can hold `Arc<dyn Codec>`.

use serde_json::Value;

/// Error from encoding or decoding a step payload.
#[derive(Debug, thiserror::Error)]
#[error("codec error: {0}")]
pub struct CodecError(pub String);

/// A codec that serializes step payloads for the store.
///
/// Implementations must round-trip every value a workflow produces:
/// `decode(encode(v))` yields `v` again.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<String, CodecError>;
    fn decode(&self, payload: &str) -> Result<Value, CodecError>;
}

/// JSON codec, the default payload format.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|e| CodecError(e.to_string()))
    }

    fn decode(&self, payload: &str) -> Result<Value, CodecError> {
        serde_json::from_str(payload).map_err(|e| CodecError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_representative_values() {
        let codec = JsonCodec;
        for value in [
            json!("x"),
            json!(42),
            json!(2.5),
            json!(true),
            json!(null),
            json!({"employee": {"id": "emp_1", "tickets": ["laptop", "access"]}}),
        ] {
            let encoded = codec.encode(&value).unwrap();
            assert_eq!(codec.decode(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        assert!(JsonCodec.decode("{not json").is_err());
    }
}
