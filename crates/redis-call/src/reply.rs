//! Typed replies returned by the store.

use crate::error::RedisCallError;
use bytes::Bytes;
use serde_json::Value;

/// Status text the store returns for every command queued inside `MULTI`
pub const QUEUED: &str = "QUEUED";

/// A single reply from the store.
///
/// Everything except [`Reply::Decoded`] arrives over the wire. `Decoded` is
/// produced by payload transforms and keeps the raw bytes next to the value
/// they decoded into, so that a claimed element can later be acknowledged by
/// its exact stored form.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Status(String),
    Integer(i64),
    Bulk(Bytes),
    Array(Vec<Reply>),
    Error(String),
    Decoded { raw: Bytes, value: Value },
}

impl Reply {
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Check for the `OK` status reply
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Status(s) if s == "OK")
    }

    /// Check for the placeholder returned while a transaction accumulates
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Status(s) if s == QUEUED)
    }

    pub fn as_integer(&self) -> Result<i64, RedisCallError> {
        match self {
            Self::Integer(n) => Ok(*n),
            other => Err(RedisCallError::unexpected(format!(
                "expected integer reply, received {}",
                other.describe()
            ))),
        }
    }

    /// Take a bulk string reply, treating nil as absent
    pub fn into_bulk(self) -> Result<Option<Bytes>, RedisCallError> {
        match self {
            Self::Nil => Ok(None),
            Self::Bulk(bytes) => Ok(Some(bytes)),
            Self::Status(s) => Ok(Some(Bytes::from(s))),
            other => Err(RedisCallError::unexpected(format!(
                "expected bulk reply, received {}",
                other.describe()
            ))),
        }
    }

    /// Take a multi-bulk reply, treating nil as empty
    pub fn into_array(self) -> Result<Vec<Reply>, RedisCallError> {
        match self {
            Self::Nil => Ok(Vec::new()),
            Self::Array(items) => Ok(items),
            other => Err(RedisCallError::unexpected(format!(
                "expected array reply, received {}",
                other.describe()
            ))),
        }
    }

    /// Short human-readable rendering used in error messages and logs
    pub fn describe(&self) -> String {
        match self {
            Self::Nil => "nil".to_string(),
            Self::Status(s) => format!("status {:?}", s),
            Self::Integer(n) => format!("integer {}", n),
            Self::Bulk(b) => format!("bulk {:?}", String::from_utf8_lossy(b)),
            Self::Array(items) => format!("array of {}", items.len()),
            Self::Error(e) => format!("error {:?}", e),
            Self::Decoded { value, .. } => format!("decoded {}", value),
        }
    }
}

impl From<i64> for Reply {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Self::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Bytes> for Reply {
    fn from(bytes: Bytes) -> Self {
        Self::Bulk(bytes)
    }
}

#[cfg(test)]
#[path = "reply_tests.rs"]
mod tests;
