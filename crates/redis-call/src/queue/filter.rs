//! Requeue filters applied while restoring a backup list.

use crate::error::CodecError;
use bytes::Bytes;
use serde_json::Value;

/// Field that counts how often an element was restored from backup
pub const RETRY_COUNT_FIELD: &str = "redis_queue_backup_retry_count";

/// Restores allowed before an element is dead-lettered
pub const DEFAULT_RETRY_LIMIT: u64 = 3;

/// What to do with one element taken off the backup list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requeue {
    /// Push this payload back onto the main list
    Requeue(Bytes),
    /// Push this payload onto the error list
    DeadLetter(Bytes),
    /// Drop the element
    Discard,
}

/// Decides the fate of backup elements during restore
pub trait RequeueFilter: Send + Sync {
    fn filter(&self, element: Bytes) -> Result<Requeue, CodecError>;
}

/// Requeues every element unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl RequeueFilter for Identity {
    fn filter(&self, element: Bytes) -> Result<Requeue, CodecError> {
        Ok(Requeue::Requeue(element))
    }
}

/// Counts restores inside JSON object payloads and dead-letters elements
/// that exceed the limit.
///
/// Payloads that are not JSON objects carry no counter and are requeued
/// unchanged. A counter that is not a non-negative integer counts as zero.
#[derive(Debug, Clone)]
pub struct RetryLimit {
    limit: u64,
}

impl RetryLimit {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

impl Default for RetryLimit {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_LIMIT)
    }
}

impl RequeueFilter for RetryLimit {
    fn filter(&self, element: Bytes) -> Result<Requeue, CodecError> {
        let mut map = match serde_json::from_slice::<Value>(&element) {
            Ok(Value::Object(map)) => map,
            _ => return Ok(Requeue::Requeue(element)),
        };

        let count = map
            .get(RETRY_COUNT_FIELD)
            .and_then(Value::as_u64)
            .unwrap_or(0)
            .saturating_add(1);
        map.insert(RETRY_COUNT_FIELD.to_string(), Value::from(count));
        let payload = Bytes::from(serde_json::to_vec(&Value::Object(map))?);

        if count > self.limit {
            Ok(Requeue::DeadLetter(payload))
        } else {
            Ok(Requeue::Requeue(payload))
        }
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
