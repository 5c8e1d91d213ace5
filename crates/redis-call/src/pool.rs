//! Connections reused per worker and endpoint.
//!
//! A worker is whatever unit of concurrency owns a connection at a time,
//! usually one task. Two workers never share a pooled connection, so a
//! worker can keep a transaction open across awaits without interference.

use crate::config::Endpoint;
use crate::connection::Connection;
use crate::error::RedisCallError;
use crate::transport::Connector;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Identity of the worker a pooled connection belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generate a unique worker identity
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a pooled connection, locked by its worker while in use
pub type PooledConnection = Arc<tokio::sync::Mutex<Connection>>;

/// Pool of connections keyed by worker and endpoint
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    entries: Mutex<HashMap<(WorkerId, Endpoint), PooledConnection>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get the worker's connection to `endpoint`, opening one if there is
    /// none or the cached one is no longer connected
    pub async fn connection(
        &self,
        worker: &WorkerId,
        endpoint: &Endpoint,
    ) -> Result<PooledConnection, RedisCallError> {
        let key = (worker.clone(), endpoint.clone());

        let cached = self.entries().get(&key).cloned();
        if let Some(connection) = cached {
            // A connection locked by its worker is in use and therefore live.
            let live = match connection.try_lock() {
                Ok(guard) => guard.is_connected(),
                Err(_) => true,
            };
            if live {
                return Ok(connection);
            }
            debug!(
                worker = %worker,
                endpoint = %endpoint,
                "Replacing disconnected pooled connection"
            );
        }

        let opened = Connection::open(self.connector.as_ref(), endpoint).await?;
        let connection = Arc::new(tokio::sync::Mutex::new(opened));
        self.entries().insert(key, Arc::clone(&connection));
        Ok(connection)
    }

    /// Drop the worker's connection to `endpoint` and close it
    pub async fn disconnect(
        &self,
        worker: &WorkerId,
        endpoint: &Endpoint,
    ) -> Result<(), RedisCallError> {
        let removed = self.entries().remove(&(worker.clone(), endpoint.clone()));
        match removed {
            Some(connection) => connection.lock().await.disconnect().await,
            None => Ok(()),
        }
    }

    /// Close every pooled connection; the first failure is returned after
    /// all connections were attempted
    pub async fn disconnect_all(&self) -> Result<(), RedisCallError> {
        let drained: Vec<PooledConnection> = self.entries().drain().map(|(_, c)| c).collect();

        let mut first_error = None;
        for connection in drained {
            if let Err(e) = connection.lock().await.disconnect().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<(WorkerId, Endpoint), PooledConnection>> {
        // A poisoned map is still structurally valid.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connections", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
