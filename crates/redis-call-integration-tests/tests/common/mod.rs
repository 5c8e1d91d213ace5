//! Common test utilities for redis-call integration tests
//!
//! This module provides:
//! - A shared in-memory store with connection helpers
//! - Fixtures for queues filled with numbered jobs

use redis_call::{Connection, ConnectionPool, Endpoint, MemoryStore, Queue};
use serde_json::{json, Value};
use std::sync::Arc;

// ============================================================================
// Store Fixture
// ============================================================================

/// One in-memory store plus the endpoint every helper connects to
#[derive(Clone)]
#[allow(dead_code)]
pub struct TestStore {
    pub store: MemoryStore,
    pub endpoint: Endpoint,
}

impl TestStore {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            endpoint: Endpoint::default(),
        }
    }

    /// Open a dedicated connection
    #[allow(dead_code)]
    pub async fn connect(&self) -> Connection {
        Connection::open(&self.store, &self.endpoint)
            .await
            .expect("memory store accepts connections")
    }

    /// Pool that opens connections against this store
    #[allow(dead_code)]
    pub fn pool(&self) -> ConnectionPool {
        ConnectionPool::new(Arc::new(self.store.clone()))
    }

    /// Raw contents of one of a queue's lists, head first
    #[allow(dead_code)]
    pub fn raw_list(&self, queue: &Queue, list: redis_call::QueueList) -> Vec<bytes::Bytes> {
        self.store.list(&queue.key(list).to_string())
    }
}

// ============================================================================
// Job Fixtures
// ============================================================================

/// A JSON job with a numeric id
#[allow(dead_code)]
pub fn job(id: u64) -> Value {
    json!({ "id": id, "kind": "test" })
}

/// Push `count` numbered jobs, ids starting at zero
#[allow(dead_code)]
pub async fn fill(conn: &mut Connection, queue: &Queue, count: u64) {
    for id in 0..count {
        queue
            .push(conn, &job(id))
            .await
            .expect("push succeeds")
            .ready()
            .expect("push outside a transaction is immediate");
    }
}

/// Id of a job produced by [`job`]
#[allow(dead_code)]
pub fn job_id(value: &Value) -> u64 {
    value["id"].as_u64().expect("job carries a numeric id")
}
