//! A single store connection with re-entrant transaction support.
//!
//! [`Connection`] wraps one [`Transport`] and layers on top of it:
//! - translation of store and transport failures into [`RedisCallError`]
//! - nested `begin`/`commit`/`abort` where only the outermost level talks
//!   to the store
//! - deferred result transforms for commands issued inside a transaction
//!
//! Commands issued inside a transaction do not have a result until commit.
//! Operations that interpret their result therefore return an [`Outcome`],
//! which is either the interpreted value or the position at which it will
//! appear in the committed result.

use crate::command::Command;
use crate::config::Endpoint;
use crate::error::{RedisCallError, TransportError};
use crate::key::Key;
use crate::reply::Reply;
use crate::transaction::TransactionState;
use crate::transport::{Connector, Transport};
use bytes::Bytes;
use futures::future::BoxFuture;
use tracing::{debug, warn};

/// Result of an operation that may have been deferred by a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The call ran immediately and this is its interpreted result
    Ready(T),
    /// The call was queued; its result lands at this position on commit
    Queued(usize),
}

impl<T> Outcome<T> {
    /// Take the immediate result, failing if the call was queued
    pub fn ready(self) -> Result<T, RedisCallError> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::Queued(position) => Err(RedisCallError::unexpected(format!(
                "result is deferred to position {} of the transaction",
                position
            ))),
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }

    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Ready(_) => None,
            Self::Queued(position) => Some(*position),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Ready(value) => Outcome::Ready(f(value)),
            Self::Queued(position) => Outcome::Queued(position),
        }
    }

    pub fn try_map<U>(
        self,
        f: impl FnOnce(T) -> Result<U, RedisCallError>,
    ) -> Result<Outcome<U>, RedisCallError> {
        match self {
            Self::Ready(value) => Ok(Outcome::Ready(f(value)?)),
            Self::Queued(position) => Ok(Outcome::Queued(position)),
        }
    }
}

/// Body run inside [`Connection::multi`]
pub type TransactionBody<'c> = BoxFuture<'c, Result<(), RedisCallError>>;

/// One connection to the store
pub struct Connection {
    transport: Box<dyn Transport>,
    endpoint: Endpoint,
    transaction: TransactionState,
}

impl Connection {
    /// Open a connection to `endpoint` through `connector`
    pub async fn open(
        connector: &dyn Connector,
        endpoint: &Endpoint,
    ) -> Result<Self, RedisCallError> {
        let transport = connector
            .connect(endpoint)
            .await
            .map_err(|e| translate(e, endpoint))?;
        debug!(endpoint = %endpoint, "Opened connection");
        Ok(Self::from_transport(transport, endpoint.clone()))
    }

    /// Wrap an already established transport
    pub fn from_transport(transport: Box<dyn Transport>, endpoint: Endpoint) -> Self {
        Self {
            transport,
            endpoint,
            transaction: TransactionState::default(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Current transaction nesting depth, zero when idle
    pub fn transaction_depth(&self) -> u32 {
        self.transaction.depth()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_active()
    }

    /// Close the transport and forget any open transaction
    pub async fn disconnect(&mut self) -> Result<(), RedisCallError> {
        self.transaction.reset();
        self.transport
            .disconnect()
            .await
            .map_err(|e| translate(e, &self.endpoint))
    }

    /// Issue a command and return its raw reply.
    ///
    /// Inside a transaction the reply is the store's placeholder and the
    /// command occupies the next position of the committed result.
    pub async fn call(&mut self, command: Command) -> Result<Reply, RedisCallError> {
        debug!(
            command = %command.name(),
            depth = self.transaction.depth(),
            "Calling store"
        );

        let reply = self
            .transport
            .request(&command.to_frame())
            .await
            .map_err(|e| translate(e, &self.endpoint))?;
        self.transaction.advance();

        match reply {
            Reply::Error(message) => Err(RedisCallError::Command {
                command: command.name().to_string(),
                message,
            }),
            reply => Ok(reply),
        }
    }

    /// Issue a command and interpret its result with `transform`.
    ///
    /// Outside a transaction the transform runs at once. Inside one it is
    /// registered against the command's position and runs on commit.
    pub async fn call_with<F>(
        &mut self,
        command: Command,
        transform: F,
    ) -> Result<Outcome<Reply>, RedisCallError>
    where
        F: FnOnce(Reply) -> Result<Reply, RedisCallError> + Send + 'static,
    {
        match self.transaction.next_position() {
            Some(position) => {
                self.call(command).await?;
                self.transaction.register(position, Box::new(transform))?;
                Ok(Outcome::Queued(position))
            }
            None => {
                let reply = self.call(command).await?;
                Ok(Outcome::Ready(transform(reply)?))
            }
        }
    }

    /// Issue a command whose result is dropped from the committed result
    pub async fn call_discarded(
        &mut self,
        command: Command,
    ) -> Result<Outcome<Reply>, RedisCallError> {
        match self.transaction.next_position() {
            Some(position) => {
                self.call(command).await?;
                self.transaction.remove_result(position)?;
                Ok(Outcome::Queued(position))
            }
            None => Ok(Outcome::Ready(self.call(command).await?)),
        }
    }

    /// Chain another transform onto a command already queued at `position`
    pub fn then<F>(&mut self, position: usize, transform: F) -> Result<(), RedisCallError>
    where
        F: FnOnce(Reply) -> Result<Reply, RedisCallError> + Send + 'static,
    {
        self.transaction.register(position, Box::new(transform))
    }

    /// Enter a transaction level; only the outermost level sends `MULTI`
    pub async fn begin(&mut self) -> Result<(), RedisCallError> {
        if !self.transaction.is_active() {
            let reply = self.call(Command::multi()).await?;
            if !reply.is_ok() {
                return Err(RedisCallError::unexpected(format!(
                    "MULTI returned {}, expected OK",
                    reply.describe()
                )));
            }
        }
        self.transaction.enter();
        Ok(())
    }

    /// Leave a transaction level.
    ///
    /// Nested levels return `None`. The outermost level sends `EXEC`,
    /// applies the registered transforms and returns the combined result.
    pub async fn commit(&mut self) -> Result<Option<Reply>, RedisCallError> {
        let Some(pending) = self.transaction.leave()? else {
            return Ok(None);
        };

        match self.call(Command::exec()).await? {
            Reply::Nil => {
                debug!(endpoint = %self.endpoint, "Transaction aborted by watched key change");
                Err(RedisCallError::TransactionAborted)
            }
            Reply::Array(results) => pending.finish(results).map(Some),
            other => Err(RedisCallError::unexpected(format!(
                "EXEC returned {}",
                other.describe()
            ))),
        }
    }

    /// Leave a transaction level, discarding the transaction at the
    /// outermost level.
    ///
    /// Bookkeeping is always cleared; `DISCARD` is only sent while the
    /// transport is still connected.
    pub async fn abort(&mut self) -> Result<(), RedisCallError> {
        if self.transaction.leave()?.is_none() {
            return Ok(());
        }
        if !self.transport.is_connected() {
            debug!(endpoint = %self.endpoint, "Skipping DISCARD on closed connection");
            return Ok(());
        }
        self.call(Command::discard()).await?;
        Ok(())
    }

    /// Run `body` inside a transaction, watching `watch` first.
    ///
    /// The transaction commits when the body succeeds and aborts when it
    /// fails; the body's error is returned even if the abort itself fails.
    /// Returns the committed result, or `None` when nested inside an outer
    /// transaction.
    pub async fn multi<F>(
        &mut self,
        watch: &[Key],
        body: F,
    ) -> Result<Option<Reply>, RedisCallError>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> TransactionBody<'c>,
    {
        if !watch.is_empty() {
            self.watch(watch).await?;
        }
        self.begin().await?;

        match body(self).await {
            Ok(()) => self.commit().await,
            Err(error) => {
                if let Err(abort_error) = self.abort().await {
                    warn!(
                        error = %abort_error,
                        cause = %error,
                        "Failed to abort transaction after error"
                    );
                }
                Err(error)
            }
        }
    }

    /// Watch keys for optimistic locking; only valid outside a transaction
    pub async fn watch(&mut self, keys: &[Key]) -> Result<(), RedisCallError> {
        self.ensure_idle("WATCH")?;
        self.assert_ok(Command::watch(keys)).await?;
        Ok(())
    }

    /// Issue a command that must reply `OK`
    pub async fn assert_ok(&mut self, command: Command) -> Result<Reply, RedisCallError> {
        let name = command.to_string();
        let reply = self.call(command).await?;
        if !reply.is_ok() {
            return Err(RedisCallError::unexpected(format!(
                "{} returned {}, expected OK",
                name,
                reply.describe()
            )));
        }
        Ok(reply)
    }

    /// Issue a command that must not reply nil
    pub async fn assert_not_nil(&mut self, command: Command) -> Result<Reply, RedisCallError> {
        let name = command.to_string();
        let reply = self.call(command).await?;
        if reply.is_nil() {
            return Err(RedisCallError::unexpected(format!(
                "{} returned nil",
                name
            )));
        }
        Ok(reply)
    }

    // Immediate helpers. These read their reply straight away and refuse to
    // run inside a transaction, where no reply exists yet.

    pub async fn ping(&mut self) -> Result<(), RedisCallError> {
        self.ensure_idle("PING")?;
        match self.call(Command::ping()).await? {
            Reply::Status(ref s) if s == "PONG" => Ok(()),
            other => Err(RedisCallError::unexpected(format!(
                "PING returned {}",
                other.describe()
            ))),
        }
    }

    pub async fn llen(&mut self, key: &Key) -> Result<i64, RedisCallError> {
        self.ensure_idle("LLEN")?;
        self.call(Command::llen(key)).await?.as_integer()
    }

    pub async fn lrange(
        &mut self,
        key: &Key,
        start: i64,
        stop: i64,
    ) -> Result<Vec<Bytes>, RedisCallError> {
        self.ensure_idle("LRANGE")?;
        self.call(Command::lrange(key, start, stop))
            .await?
            .into_array()?
            .into_iter()
            .map(|item| {
                item.into_bulk()?
                    .ok_or_else(|| RedisCallError::unexpected("LRANGE returned a nil element"))
            })
            .collect()
    }

    pub async fn keys(&mut self, pattern: &str) -> Result<Vec<Key>, RedisCallError> {
        self.ensure_idle("KEYS")?;
        self.call(Command::keys(pattern))
            .await?
            .into_array()?
            .into_iter()
            .map(|item| {
                let bytes = item
                    .into_bulk()?
                    .ok_or_else(|| RedisCallError::unexpected("KEYS returned a nil element"))?;
                Ok(Key::new(String::from_utf8_lossy(&bytes).into_owned()))
            })
            .collect()
    }

    pub async fn del(&mut self, keys: &[Key]) -> Result<i64, RedisCallError> {
        self.ensure_idle("DEL")?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.call(Command::del(keys)).await?.as_integer()
    }

    pub async fn decr(&mut self, key: &Key) -> Result<i64, RedisCallError> {
        self.ensure_idle("DECR")?;
        self.call(Command::decr(key)).await?.as_integer()
    }

    pub(crate) fn ensure_idle(&self, operation: &str) -> Result<(), RedisCallError> {
        if self.transaction.is_active() {
            return Err(RedisCallError::non_transactional(operation));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.transport.is_connected())
            .field("depth", &self.transaction.depth())
            .finish()
    }
}

fn translate(error: TransportError, endpoint: &Endpoint) -> RedisCallError {
    match error {
        TransportError::NotConnected => RedisCallError::Disconnected {
            endpoint: endpoint.to_string(),
        },
        other => RedisCallError::Transport(other),
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
