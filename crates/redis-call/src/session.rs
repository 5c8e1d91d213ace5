//! Scoped use of a connection that is always closed afterwards.

use crate::config::Endpoint;
use crate::connection::Connection;
use crate::error::RedisCallError;
use crate::pool::{ConnectionPool, WorkerId};
use crate::transport::Connector;
use futures::future::BoxFuture;
use tracing::warn;

/// Where a session gets its connection from
pub enum Session<'a> {
    /// A fresh connection opened for this session only
    Dedicated {
        connector: &'a dyn Connector,
        endpoint: Endpoint,
    },
    /// The worker's pooled connection, dropped from the pool afterwards
    Pooled {
        pool: &'a ConnectionPool,
        worker: WorkerId,
        endpoint: Endpoint,
    },
}

impl<'a> Session<'a> {
    pub fn dedicated(connector: &'a dyn Connector, endpoint: Endpoint) -> Self {
        Self::Dedicated {
            connector,
            endpoint,
        }
    }

    pub fn pooled(pool: &'a ConnectionPool, worker: WorkerId, endpoint: Endpoint) -> Self {
        Self::Pooled {
            pool,
            worker,
            endpoint,
        }
    }

    /// Run `body` with the session's connection, then disconnect it whether
    /// the body succeeded or not. A body error takes precedence over a
    /// failure to disconnect.
    pub async fn run<T, F>(self, body: F) -> Result<T, RedisCallError>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<T, RedisCallError>>,
    {
        match self {
            Self::Dedicated {
                connector,
                endpoint,
            } => {
                let mut connection = Connection::open(connector, &endpoint).await?;
                let result = body(&mut connection).await;
                let closed = connection.disconnect().await;
                settle(result, closed)
            }
            Self::Pooled {
                pool,
                worker,
                endpoint,
            } => {
                let connection = pool.connection(&worker, &endpoint).await?;
                let result = {
                    let mut guard = connection.lock().await;
                    body(&mut guard).await
                };
                let closed = pool.disconnect(&worker, &endpoint).await;
                settle(result, closed)
            }
        }
    }
}

/// Run `body` on a dedicated connection to `endpoint`
pub async fn query<T, F>(
    connector: &dyn Connector,
    endpoint: &Endpoint,
    body: F,
) -> Result<T, RedisCallError>
where
    F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<T, RedisCallError>>,
{
    Session::dedicated(connector, endpoint.clone()).run(body).await
}

fn settle<T>(
    result: Result<T, RedisCallError>,
    closed: Result<(), RedisCallError>,
) -> Result<T, RedisCallError> {
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_error)) => Err(close_error),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(close_error)) => {
            warn!(error = %close_error, cause = %error, "Failed to disconnect after error");
            Err(error)
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
