//! Payload codecs for queue elements.
//!
//! Elements are stored as opaque bytes. A [`Codec`] maps between those bytes
//! and a [`serde_json::Value`], which is what queue callers work with.

use crate::error::CodecError;
use bytes::Bytes;
use serde_json::Value;

/// Field name under which [`KeepSerialized`] attaches the stored payload
pub const SERIALIZED_FIELD: &str = "serialized_json";

/// Encoding of queue elements to and from stored bytes
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Bytes, CodecError>;

    fn decode(&self, payload: &[u8]) -> Result<Value, CodecError>;
}

/// Stores strings as their UTF-8 bytes, untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl Codec for PlainCodec {
    fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        match value {
            Value::String(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            other => Err(CodecError::Unsupported {
                codec: "plain".to_string(),
                found: json_type(other).to_string(),
            }),
        }
    }

    fn decode(&self, payload: &[u8]) -> Result<Value, CodecError> {
        std::str::from_utf8(payload)
            .map(|s| Value::String(s.to_string()))
            .map_err(|_| CodecError::InvalidUtf8)
    }
}

/// Stores any value as its JSON serialization
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn decode(&self, payload: &[u8]) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Wraps a codec so decoded objects carry the exact payload they came from.
///
/// On decode, object values gain a [`SERIALIZED_FIELD`] entry holding the
/// stored payload. On encode the entry is stripped again, so re-pushing a
/// decoded element does not nest payloads.
#[derive(Debug, Clone, Default)]
pub struct KeepSerialized<C> {
    inner: C,
}

impl<C: Codec> KeepSerialized<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Codec> Codec for KeepSerialized<C> {
    fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        match value {
            Value::Object(map) if map.contains_key(SERIALIZED_FIELD) => {
                let mut stripped = map.clone();
                stripped.remove(SERIALIZED_FIELD);
                self.inner.encode(&Value::Object(stripped))
            }
            other => self.inner.encode(other),
        }
    }

    fn decode(&self, payload: &[u8]) -> Result<Value, CodecError> {
        let mut value = self.inner.decode(payload)?;
        if let Value::Object(map) = &mut value {
            let raw = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)?;
            map.insert(SERIALIZED_FIELD.to_string(), Value::String(raw.to_string()));
        }
        Ok(value)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
