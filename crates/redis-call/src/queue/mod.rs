//! Reliable work queues on top of store lists.
//!
//! A queue named `jobs` owns three lists:
//! - `queue.jobs` holds pending elements; producers push on the left and
//!   consumers take from the right, so the oldest element leaves first
//! - `queue.jobs.backup` holds elements a consumer has claimed but not yet
//!   acknowledged
//! - `queue.jobs.error` holds dead-lettered elements
//!
//! Claiming moves an element from main to backup in one store command, so a
//! consumer that crashes mid-job leaves the element in backup where
//! [`Queue::restore_backup`] can find it.
//!
//! Operations that only issue one command work inside a transaction and
//! then return [`Outcome::Queued`]; their decoding runs at commit.

use crate::codec::{Codec, JsonCodec, PlainCodec};
use crate::command::Command;
use crate::connection::{Connection, Outcome};
use crate::error::RedisCallError;
use crate::key::Key;
use crate::reply::Reply;
use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod filter;

pub use filter::{
    Identity, Requeue, RequeueFilter, RetryLimit, DEFAULT_RETRY_LIMIT, RETRY_COUNT_FIELD,
};

/// Namespace shared by every queue's lists
pub const QUEUE_PREFIX: &str = "queue";

/// One of the three lists a queue owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueList {
    Main,
    Backup,
    Error,
}

impl std::str::FromStr for QueueList {
    type Err = RedisCallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(Self::Main),
            "backup" => Ok(Self::Backup),
            "error" => Ok(Self::Error),
            other => Err(RedisCallError::unexpected(format!(
                "unknown queue list '{}', expected main, backup or error",
                other
            ))),
        }
    }
}

/// An element moved to backup, with the exact bytes needed to acknowledge it
#[derive(Debug, Clone, PartialEq)]
pub struct Claimed {
    pub raw: Bytes,
    pub value: Value,
}

/// Tally of one backup restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub requeued: usize,
    pub dead_lettered: usize,
    pub discarded: usize,
}

impl RestoreReport {
    pub fn total(&self) -> usize {
        self.requeued + self.dead_lettered + self.discarded
    }
}

/// A named queue with its payload codec and restore filter
#[derive(Clone)]
pub struct Queue {
    name: String,
    main: Key,
    backup: Key,
    error: Key,
    codec: Arc<dyn Codec>,
    filter: Arc<dyn RequeueFilter>,
}

impl Queue {
    /// Queue of plain string elements, restored unchanged
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let main = Key::new(QUEUE_PREFIX) / &name;
        Self {
            backup: &main / "backup",
            error: &main / "error",
            main,
            name,
            codec: Arc::new(PlainCodec),
            filter: Arc::new(filter::Identity),
        }
    }

    /// Queue of JSON elements with the default retry limit on restore
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name)
            .with_codec(JsonCodec)
            .with_filter(RetryLimit::default())
    }

    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn with_filter(mut self, filter: impl RequeueFilter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self, list: QueueList) -> &Key {
        match list {
            QueueList::Main => &self.main,
            QueueList::Backup => &self.backup,
            QueueList::Error => &self.error,
        }
    }

    /// Push an element; returns the new length of the main list
    pub async fn push(
        &self,
        conn: &mut Connection,
        element: &Value,
    ) -> Result<Outcome<i64>, RedisCallError> {
        let payload = self.codec.encode(element)?;
        self.push_raw(conn, QueueList::Main, payload).await
    }

    /// Push an element straight onto the error list
    pub async fn push_error(
        &self,
        conn: &mut Connection,
        element: &Value,
    ) -> Result<Outcome<i64>, RedisCallError> {
        let payload = self.codec.encode(element)?;
        self.push_raw(conn, QueueList::Error, payload).await
    }

    /// Take the oldest element, `None` when the queue is empty
    pub async fn pop(
        &self,
        conn: &mut Connection,
    ) -> Result<Outcome<Option<Value>>, RedisCallError> {
        let codec = Arc::clone(&self.codec);
        let outcome = conn
            .call_with(Command::rpop(&self.main), move |reply| {
                decode_reply(codec.as_ref(), reply)
            })
            .await?;
        outcome.try_map(into_value)
    }

    /// Take the oldest element, waiting up to `timeout` (zero waits forever)
    pub async fn blocking_pop(
        &self,
        conn: &mut Connection,
        timeout: Duration,
    ) -> Result<Outcome<Option<Value>>, RedisCallError> {
        let codec = Arc::clone(&self.codec);
        let outcome = conn
            .call_with(Command::brpop(&self.main, timeout), move |reply| {
                decode_reply(codec.as_ref(), popped_element(reply)?)
            })
            .await?;
        outcome.try_map(into_value)
    }

    /// Move the oldest element to backup and return it
    pub async fn claim(
        &self,
        conn: &mut Connection,
    ) -> Result<Outcome<Option<Claimed>>, RedisCallError> {
        let codec = Arc::clone(&self.codec);
        let outcome = conn
            .call_with(Command::rpoplpush(&self.main, &self.backup), move |reply| {
                decode_reply(codec.as_ref(), reply)
            })
            .await?;
        outcome.try_map(into_claimed)
    }

    /// Move the oldest element to backup, waiting up to `timeout` (zero
    /// waits forever)
    pub async fn blocking_claim(
        &self,
        conn: &mut Connection,
        timeout: Duration,
    ) -> Result<Outcome<Option<Claimed>>, RedisCallError> {
        let codec = Arc::clone(&self.codec);
        let outcome = conn
            .call_with(
                Command::brpoplpush(&self.main, &self.backup, timeout),
                move |reply| decode_reply(codec.as_ref(), reply),
            )
            .await?;
        outcome.try_map(into_claimed)
    }

    /// Remove a claimed element from backup by its exact stored bytes.
    ///
    /// Fails with [`RedisCallError::BackupElementNotFound`] unless exactly
    /// one element was removed; inside a transaction the check runs at
    /// commit.
    pub async fn acknowledge(
        &self,
        conn: &mut Connection,
        raw: &[u8],
    ) -> Result<Outcome<()>, RedisCallError> {
        let element = String::from_utf8_lossy(raw).into_owned();
        let list = self.backup.to_string();
        let outcome = conn
            .call_with(Command::lrem(&self.backup, -1, raw), move |reply| {
                let removed = reply.as_integer()?;
                if removed != 1 {
                    return Err(RedisCallError::BackupElementNotFound { element, list });
                }
                Ok(Reply::Integer(removed))
            })
            .await?;
        Ok(outcome.map(|_| ()))
    }

    /// Claim one element, hand it to `handler`, and acknowledge it once the
    /// handler succeeds.
    ///
    /// Returns `None` when nothing arrived within `timeout`. A handler error
    /// is returned as is and leaves the element in backup.
    pub async fn process<T, E, F, Fut>(
        &self,
        conn: &mut Connection,
        timeout: Duration,
        handler: F,
    ) -> Result<Option<T>, E>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RedisCallError>,
    {
        conn.ensure_idle("process")?;

        let Some(claimed) = self.blocking_claim(conn, timeout).await?.ready()? else {
            return Ok(None);
        };
        let output = handler(claimed.value).await?;
        self.acknowledge(conn, &claimed.raw).await?.ready()?;
        Ok(Some(output))
    }

    /// Claim every element currently in main, oldest first
    pub async fn drain_to_backup(
        &self,
        conn: &mut Connection,
    ) -> Result<Vec<Claimed>, RedisCallError> {
        conn.ensure_idle("drain_to_backup")?;

        let mut claimed = Vec::new();
        while let Some(element) = self.claim(conn).await?.ready()? {
            claimed.push(element);
        }
        debug!(queue = %self.name, count = claimed.len(), "Drained queue to backup");
        Ok(claimed)
    }

    /// Move every backup element back to main through the requeue filter.
    ///
    /// Meant for recovery while no consumer of this queue is running.
    pub async fn restore_backup(
        &self,
        conn: &mut Connection,
    ) -> Result<RestoreReport, RedisCallError> {
        conn.ensure_idle("restore_backup")?;

        let mut report = RestoreReport::default();
        while let Some(element) = conn.lrange(&self.backup, -1, -1).await?.pop() {
            let requeue = self.filter.filter(element)?;
            let destination = match &requeue {
                Requeue::Requeue(payload) => Some((self.main.clone(), payload.clone())),
                Requeue::DeadLetter(payload) => Some((self.error.clone(), payload.clone())),
                Requeue::Discard => None,
            };
            self.replace_backup_tail(conn, destination).await?;

            match requeue {
                Requeue::Requeue(_) => report.requeued += 1,
                Requeue::DeadLetter(payload) => {
                    warn!(
                        queue = %self.name,
                        element = %String::from_utf8_lossy(&payload),
                        "Moved element to error list"
                    );
                    report.dead_lettered += 1;
                }
                Requeue::Discard => report.discarded += 1,
            }
        }

        info!(
            queue = %self.name,
            requeued = report.requeued,
            dead_lettered = report.dead_lettered,
            discarded = report.discarded,
            "Restored backup"
        );
        Ok(report)
    }

    /// Decoded contents of one list, head (newest) first
    pub async fn elements(
        &self,
        conn: &mut Connection,
        list: QueueList,
    ) -> Result<Vec<Value>, RedisCallError> {
        conn.lrange(self.key(list), 0, -1)
            .await?
            .iter()
            .map(|raw| Ok(self.codec.decode(raw)?))
            .collect()
    }

    pub async fn len(&self, conn: &mut Connection, list: QueueList) -> Result<i64, RedisCallError> {
        conn.llen(self.key(list)).await
    }

    /// Delete all three lists; returns how many existed
    pub async fn delete(&self, conn: &mut Connection) -> Result<i64, RedisCallError> {
        conn.del(&[self.main.clone(), self.backup.clone(), self.error.clone()])
            .await
    }

    /// Every queue list in the store with its length
    pub async fn list(conn: &mut Connection) -> Result<BTreeMap<String, i64>, RedisCallError> {
        let pattern = format!("{}.*", QUEUE_PREFIX);
        let mut lengths = BTreeMap::new();
        for key in conn.keys(&pattern).await? {
            let len = conn.llen(&key).await?;
            lengths.insert(key.to_string(), len);
        }
        Ok(lengths)
    }

    /// Delete the lists of every named queue; returns how many existed
    pub async fn delete_all<S: AsRef<str>>(
        conn: &mut Connection,
        names: &[S],
    ) -> Result<i64, RedisCallError> {
        let keys: Vec<Key> = names
            .iter()
            .map(|name| Queue::new(name.as_ref()))
            .flat_map(|queue| [queue.main, queue.backup, queue.error])
            .collect();
        conn.del(&keys).await
    }

    /// Drop the oldest backup element and push its filtered form in the same
    /// transaction, so a failure leaves it in backup
    async fn replace_backup_tail(
        &self,
        conn: &mut Connection,
        destination: Option<(Key, Bytes)>,
    ) -> Result<(), RedisCallError> {
        let backup = self.backup.clone();
        conn.multi(&[], move |c| {
            Box::pin(async move {
                if let Some((list, payload)) = destination {
                    c.call(Command::lpush(&list, payload)).await?;
                }
                c.call(Command::rpop(&backup)).await?;
                Ok::<_, RedisCallError>(())
            })
        })
        .await?;
        Ok(())
    }

    async fn push_raw(
        &self,
        conn: &mut Connection,
        list: QueueList,
        payload: Bytes,
    ) -> Result<Outcome<i64>, RedisCallError> {
        let outcome = conn
            .call_with(Command::lpush(self.key(list), payload), |reply| {
                reply.as_integer().map(Reply::Integer)
            })
            .await?;
        outcome.try_map(|reply| reply.as_integer())
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").field("name", &self.name).finish()
    }
}

/// Second element of a `BRPOP` reply, nil on timeout
fn popped_element(reply: Reply) -> Result<Reply, RedisCallError> {
    if reply.is_nil() {
        return Ok(Reply::Nil);
    }
    let mut items = reply.into_array()?;
    if items.len() != 2 {
        return Err(RedisCallError::unexpected(format!(
            "blocking pop returned {} items, expected 2",
            items.len()
        )));
    }
    Ok(items.swap_remove(1))
}

fn decode_reply(codec: &dyn Codec, reply: Reply) -> Result<Reply, RedisCallError> {
    match reply.into_bulk()? {
        None => Ok(Reply::Nil),
        Some(raw) => {
            let value = codec.decode(&raw)?;
            Ok(Reply::Decoded { raw, value })
        }
    }
}

fn into_value(reply: Reply) -> Result<Option<Value>, RedisCallError> {
    Ok(into_claimed(reply)?.map(|claimed| claimed.value))
}

fn into_claimed(reply: Reply) -> Result<Option<Claimed>, RedisCallError> {
    match reply {
        Reply::Nil => Ok(None),
        Reply::Decoded { raw, value } => Ok(Some(Claimed { raw, value })),
        other => Err(RedisCallError::unexpected(format!(
            "expected decoded element, received {}",
            other.describe()
        ))),
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
