//! Transport over a live Redis server, built on the `redis` crate.

use super::{Connector, Transport};
use crate::config::Endpoint;
use crate::error::TransportError;
use crate::reply::Reply;
use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError, RedisResult, Value};
use tracing::{debug, warn};

#[cfg(test)]
#[path = "network_tests.rs"]
mod tests;

/// One dedicated server connection.
///
/// The connection is dropped on the first I/O or client-side failure, so a
/// link whose reply stream can no longer be trusted is never reused.
pub struct RedisTransport {
    connection: Option<MultiplexedConnection>,
}

impl RedisTransport {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    fn fail(&mut self, error: RedisError) -> Result<Reply, TransportError> {
        if error.code().is_some() {
            return Ok(Reply::Error(server_error_message(&error)));
        }

        self.connection = None;
        if error.is_connection_dropped() || error.is_io_error() {
            debug!(error = %error, "Server connection dropped");
            return Err(TransportError::NotConnected);
        }
        warn!(error = %error, "Closing server connection after client error");
        Err(TransportError::Client(error))
    }
}

#[async_trait]
impl Transport for RedisTransport {
    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn request(&mut self, frame: &[Bytes]) -> Result<Reply, TransportError> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        let Some((name, args)) = frame.split_first() else {
            return Err(TransportError::protocol("empty command frame"));
        };

        let mut cmd = redis::cmd(&String::from_utf8_lossy(name));
        for arg in args {
            cmd.arg(&arg[..]);
        }

        let result: RedisResult<Value> = cmd.query_async(connection).await;
        match result {
            Ok(value) => reply_from_value(value),
            Err(error) => self.fail(error),
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connection = None;
        Ok(())
    }
}

/// Convert a server value into a [`Reply`]; RESP3-only shapes are refused
pub fn reply_from_value(value: Value) -> Result<Reply, TransportError> {
    let reply = match value {
        Value::Nil => Reply::Nil,
        Value::Okay => Reply::Status("OK".to_string()),
        Value::SimpleString(status) => Reply::Status(status),
        Value::Int(n) => Reply::Integer(n),
        Value::BulkString(bytes) => Reply::Bulk(Bytes::from(bytes)),
        Value::Array(items) => Reply::Array(
            items
                .into_iter()
                .map(reply_from_value)
                .collect::<Result<_, _>>()?,
        ),
        Value::ServerError(error) => Reply::Error(server_error_message(&RedisError::from(error))),
        other => {
            return Err(TransportError::protocol(format!(
                "unsupported reply {:?}",
                other
            )))
        }
    };
    Ok(reply)
}

/// Error text as the server sent it: code first, then the detail
fn server_error_message(error: &RedisError) -> String {
    match (error.code(), error.detail()) {
        (Some(code), Some(detail)) => format!("{} {}", code, detail),
        (Some(code), None) => code.to_string(),
        _ => error.to_string(),
    }
}

/// Server address for an endpoint, database 0, no credentials
pub fn connection_info(endpoint: &Endpoint) -> ConnectionInfo {
    let addr = match endpoint {
        Endpoint::Tcp { host, port } => ConnectionAddr::Tcp(host.clone(), *port),
        Endpoint::Unix { path } => ConnectionAddr::Unix(path.clone()),
    };
    ConnectionInfo {
        addr,
        redis: RedisConnectionInfo::default(),
    }
}

/// Opens [`RedisTransport`]s over TCP or Unix domain sockets
#[derive(Debug, Clone, Default)]
pub struct RedisConnector;

impl RedisConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, TransportError> {
        debug!(endpoint = %endpoint, "Opening store connection");
        let client = redis::Client::open(connection_info(endpoint))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| {
                if error.is_connection_refusal() || error.is_io_error() {
                    TransportError::NotConnected
                } else {
                    TransportError::Client(error)
                }
            })?;
        Ok(Box::new(RedisTransport::new(connection)))
    }
}
