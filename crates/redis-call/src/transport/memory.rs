//! In-memory store for testing and development.
//!
//! This module provides an in-process store that answers the command surface
//! the client consumes, with:
//! - String and list values
//! - `MULTI`/`EXEC`/`DISCARD` queuing, executed atomically under one lock
//! - `WATCH` optimistic locking via per-key versions
//! - Blocking list pops that wake on pushes from any connection
//! - A kill switch that disconnects every open transport
//!
//! It is intended for:
//! - Unit and integration testing of connection and queue code
//! - Local development without a server
//! - A readable reference for the store semantics the client relies on

use super::{Connector, Transport};
use crate::config::Endpoint;
use crate::error::TransportError;
use crate::reply::{Reply, QUEUED};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
}

/// Keyspace plus a version per key for `WATCH`
#[derive(Default)]
struct Database {
    entries: HashMap<Bytes, Value>,
    versions: HashMap<Bytes, u64>,
    clock: u64,
}

impl Database {
    fn version(&self, key: &[u8]) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &Bytes) {
        self.clock += 1;
        self.versions.insert(key.clone(), self.clock);
    }

    fn list(&self, key: &[u8]) -> Result<Option<&VecDeque<Bytes>>, Reply> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Value::List(list)) => Ok(Some(list)),
            Some(Value::String(_)) => Err(wrong_type()),
        }
    }

    fn list_mut(&mut self, key: &Bytes) -> Result<&mut VecDeque<Bytes>, Reply> {
        match self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Value::List(VecDeque::new()))
        {
            Value::List(list) => Ok(list),
            Value::String(_) => Err(wrong_type()),
        }
    }

    /// Empty lists do not exist in the store
    fn drop_if_empty(&mut self, key: &[u8]) {
        if matches!(self.entries.get(key), Some(Value::List(l)) if l.is_empty()) {
            self.entries.remove(key);
        }
    }

    fn pop_tail(&mut self, key: &Bytes) -> Result<Option<Bytes>, Reply> {
        if self.list(key)?.is_none() {
            return Ok(None);
        }
        let popped = self.list_mut(key)?.pop_back();
        self.drop_if_empty(key);
        if popped.is_some() {
            self.touch(key);
        }
        Ok(popped)
    }
}

struct Shared {
    db: Mutex<Database>,
    pushed: Notify,
    epoch: AtomicU64,
    opened: AtomicUsize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-process store shared by every transport opened from it
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                db: Mutex::new(Database::default()),
                pushed: Notify::new(),
                epoch: AtomicU64::new(0),
                opened: AtomicUsize::new(0),
            }),
        }
    }

    /// Open a new client connection to this store
    pub fn open(&self) -> MemoryTransport {
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        MemoryTransport {
            shared: Arc::clone(&self.shared),
            epoch: self.shared.epoch.load(Ordering::SeqCst),
            closed: false,
            multi: None,
            watched: HashMap::new(),
        }
    }

    /// Drop every currently open client, like a server restart would
    pub fn kill_clients(&self) {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        self.shared.pushed.notify_waiters();
    }

    /// Number of transports opened so far
    pub fn connections_opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Snapshot of a list, head first; empty when absent
    pub fn list(&self, key: &str) -> Vec<Bytes> {
        match self.shared.lock().entries.get(key.as_bytes()) {
            Some(Value::List(list)) => list.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Value of a string key
    pub fn get(&self, key: &str) -> Option<Bytes> {
        match self.shared.lock().entries.get(key.as_bytes()) {
            Some(Value::String(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.shared.lock().entries.contains_key(key.as_bytes())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryStore {
    async fn connect(&self, _endpoint: &Endpoint) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(self.open()))
    }
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// One client connection to a [`MemoryStore`]
pub struct MemoryTransport {
    shared: Arc<Shared>,
    epoch: u64,
    closed: bool,
    multi: Option<Transaction>,
    watched: HashMap<Bytes, u64>,
}

#[derive(Default)]
struct Transaction {
    queued: Vec<Vec<Bytes>>,
    dirty: bool,
}

impl MemoryTransport {
    async fn execute(&mut self, frame: Vec<Bytes>) -> Result<Reply, TransportError> {
        let Some(name) = frame.first().map(|n| String::from_utf8_lossy(n).to_uppercase()) else {
            return Ok(Reply::Error("ERR empty command".to_string()));
        };

        if self.multi.is_some() {
            return Ok(self.execute_in_multi(&name, frame));
        }

        match name.as_str() {
            "MULTI" => {
                self.multi = Some(Transaction::default());
                Ok(ok())
            }
            "EXEC" | "DISCARD" => Ok(Reply::Error(format!("ERR {} without MULTI", name))),
            "WATCH" => {
                if frame.len() < 2 {
                    return Ok(arity_error(&name));
                }
                let db = self.shared.lock();
                for key in &frame[1..] {
                    self.watched.insert(key.clone(), db.version(key));
                }
                Ok(ok())
            }
            "UNWATCH" => {
                self.watched.clear();
                Ok(ok())
            }
            "BRPOP" | "BRPOPLPUSH" => self.blocking(&name, frame).await,
            _ => {
                let reply = {
                    let mut db = self.shared.lock();
                    apply(&mut db, &name, &frame)
                };
                self.shared.pushed.notify_waiters();
                Ok(reply)
            }
        }
    }

    /// Inside `MULTI` everything but the transaction verbs is only queued
    fn execute_in_multi(&mut self, name: &str, frame: Vec<Bytes>) -> Reply {
        match name {
            "EXEC" => self.exec(),
            "DISCARD" => {
                self.multi = None;
                self.watched.clear();
                ok()
            }
            "MULTI" => Reply::Error("ERR MULTI calls can not be nested".to_string()),
            "WATCH" => Reply::Error("ERR WATCH inside MULTI is not allowed".to_string()),
            _ => {
                let checked = check_arity(name, frame.len());
                let Some(transaction) = self.multi.as_mut() else {
                    return Reply::Error(format!("ERR {} without MULTI", name));
                };
                match checked {
                    Ok(()) => {
                        transaction.queued.push(frame);
                        Reply::Status(QUEUED.to_string())
                    }
                    Err(error) => {
                        transaction.dirty = true;
                        error
                    }
                }
            }
        }
    }

    fn exec(&mut self) -> Reply {
        let Some(transaction) = self.multi.take() else {
            return Reply::Error("ERR EXEC without MULTI".to_string());
        };
        let watched = std::mem::take(&mut self.watched);

        if transaction.dirty {
            return Reply::Error(
                "EXECABORT Transaction discarded because of previous errors.".to_string(),
            );
        }

        let replies = {
            let mut db = self.shared.lock();
            if watched.iter().any(|(key, version)| db.version(key) != *version) {
                return Reply::Nil;
            }
            transaction
                .queued
                .iter()
                .map(|frame| {
                    let name = String::from_utf8_lossy(&frame[0]).to_uppercase();
                    apply(&mut db, &name, frame)
                })
                .collect()
        };
        self.shared.pushed.notify_waiters();
        Reply::Array(replies)
    }

    /// Blocking pops: try, then sleep until some connection pushes, the
    /// timeout passes, or the store kills its clients.
    async fn blocking(&mut self, name: &str, frame: Vec<Bytes>) -> Result<Reply, TransportError> {
        if let Err(error) = check_arity(name, frame.len()) {
            return Ok(error);
        }
        let timeout = match parse_timeout(&frame[frame.len() - 1]) {
            Ok(timeout) => timeout,
            Err(error) => return Ok(error),
        };
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let notified = self.shared.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_connected() {
                return Err(TransportError::NotConnected);
            }

            let reply = {
                let mut db = self.shared.lock();
                apply(&mut db, name, &frame)
            };
            if !reply.is_nil() {
                self.shared.pushed.notify_waiters();
                return Ok(reply);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(Reply::Nil);
                    }
                }
                None => notified.await,
            }
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn is_connected(&self) -> bool {
        !self.closed && self.epoch == self.shared.epoch.load(Ordering::SeqCst)
    }

    async fn request(&mut self, frame: &[Bytes]) -> Result<Reply, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.execute(frame.to_vec()).await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.multi = None;
        self.watched.clear();
        Ok(())
    }
}

// ============================================================================
// Command Execution
// ============================================================================

fn ok() -> Reply {
    Reply::Status("OK".to_string())
}

fn wrong_type() -> Reply {
    Reply::Error("WRONGTYPE Operation against a key holding the wrong kind of value".to_string())
}

fn not_integer() -> Reply {
    Reply::Error("ERR value is not an integer or out of range".to_string())
}

fn arity_error(name: &str) -> Reply {
    Reply::Error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_lowercase()
    ))
}

/// Minimum frame length (name included) and whether more is allowed
fn arity(name: &str) -> Option<(usize, bool)> {
    let arity = match name {
        "PING" => (1, true),
        "GET" | "RPOP" | "LPOP" | "LLEN" | "INCR" | "DECR" | "KEYS" => (2, false),
        "SET" | "RPOPLPUSH" => (3, false),
        "DEL" => (2, true),
        "LPUSH" | "RPUSH" | "BRPOP" => (3, true),
        "BRPOPLPUSH" | "LRANGE" | "LREM" => (4, false),
        _ => return None,
    };
    Some(arity)
}

fn check_arity(name: &str, len: usize) -> Result<(), Reply> {
    match arity(name) {
        None => Err(Reply::Error(format!(
            "ERR unknown command '{}'",
            name.to_lowercase()
        ))),
        Some((min, variadic)) if len < min || (!variadic && len != min) => {
            Err(arity_error(name))
        }
        Some(_) => Ok(()),
    }
}

fn parse_i64(arg: &[u8]) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

fn parse_timeout(arg: &[u8]) -> Result<Option<Duration>, Reply> {
    let seconds: f64 = std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|s: &f64| s.is_finite() && *s >= 0.0)
        .ok_or_else(|| Reply::Error("ERR timeout is not a float or out of range".to_string()))?;
    if seconds == 0.0 {
        Ok(None)
    } else {
        Ok(Some(Duration::from_secs_f64(seconds)))
    }
}

/// Execute one non-transactional command against the keyspace.
///
/// Blocking pops run their non-blocking form here; waiting is the caller's
/// business (and never happens inside `EXEC`).
fn apply(db: &mut Database, name: &str, frame: &[Bytes]) -> Reply {
    if let Err(error) = check_arity(name, frame.len()) {
        return error;
    }
    let args = &frame[1..];

    let result = match name {
        "PING" => Ok(match args.first() {
            Some(message) => Reply::Bulk(message.clone()),
            None => Reply::Status("PONG".to_string()),
        }),
        "GET" => match db.entries.get(&args[0]) {
            None => Ok(Reply::Nil),
            Some(Value::String(value)) => Ok(Reply::Bulk(value.clone())),
            Some(Value::List(_)) => Err(wrong_type()),
        },
        "SET" => {
            db.entries
                .insert(args[0].clone(), Value::String(args[1].clone()));
            db.touch(&args[0]);
            Ok(ok())
        }
        "DEL" => {
            let mut removed = 0;
            for key in args {
                if db.entries.remove(key).is_some() {
                    db.touch(key);
                    removed += 1;
                }
            }
            Ok(Reply::Integer(removed))
        }
        "KEYS" => {
            let mut matched: Vec<Bytes> = db
                .entries
                .keys()
                .filter(|key| glob_match(&args[0], key))
                .cloned()
                .collect();
            matched.sort();
            Ok(Reply::Array(matched.into_iter().map(Reply::Bulk).collect()))
        }
        "INCR" | "DECR" => {
            let delta = if name == "INCR" { 1 } else { -1 };
            let current = match db.entries.get(&args[0]) {
                None => Ok(0),
                Some(Value::String(value)) => parse_i64(value).ok_or_else(not_integer),
                Some(Value::List(_)) => Err(wrong_type()),
            };
            current.and_then(|n| n.checked_add(delta).ok_or_else(not_integer)).map(|n| {
                db.entries
                    .insert(args[0].clone(), Value::String(Bytes::from(n.to_string())));
                db.touch(&args[0]);
                Reply::Integer(n)
            })
        }
        "LPUSH" | "RPUSH" => db.list_mut(&args[0]).map(|list| {
            for value in &args[1..] {
                if name == "LPUSH" {
                    list.push_front(value.clone());
                } else {
                    list.push_back(value.clone());
                }
            }
            list.len() as i64
        })
        .map(|len| {
            db.touch(&args[0]);
            Reply::Integer(len)
        }),
        "RPOP" => db
            .pop_tail(&args[0])
            .map(|popped| popped.map_or(Reply::Nil, Reply::Bulk)),
        "LPOP" => lpop(db, &args[0]),
        "BRPOP" => {
            let keys = &args[..args.len() - 1];
            let mut outcome = Ok(Reply::Nil);
            for key in keys {
                match db.pop_tail(key) {
                    Err(error) => {
                        outcome = Err(error);
                        break;
                    }
                    Ok(Some(value)) => {
                        outcome = Ok(Reply::Array(vec![
                            Reply::Bulk(key.clone()),
                            Reply::Bulk(value),
                        ]));
                        break;
                    }
                    Ok(None) => {}
                }
            }
            outcome
        }
        "RPOPLPUSH" | "BRPOPLPUSH" => rpoplpush(db, &args[0], &args[1]),
        "LREM" => match parse_i64(&args[1]) {
            None => Err(not_integer()),
            Some(count) => lrem(db, &args[0], count, &args[2]),
        },
        "LLEN" => db
            .list(&args[0])
            .map(|list| Reply::Integer(list.map_or(0, |l| l.len() as i64))),
        "LRANGE" => match (parse_i64(&args[1]), parse_i64(&args[2])) {
            (Some(start), Some(stop)) => db
                .list(&args[0])
                .map(|list| Reply::Array(list.map_or_else(Vec::new, |l| lrange(l, start, stop)))),
            _ => Err(not_integer()),
        },
        _ => Err(Reply::Error(format!(
            "ERR unknown command '{}'",
            name.to_lowercase()
        ))),
    };

    result.unwrap_or_else(|error| error)
}

fn rpoplpush(db: &mut Database, source: &Bytes, destination: &Bytes) -> Result<Reply, Reply> {
    // Type-check the destination before touching the source
    db.list(destination)?;
    let Some(value) = db.pop_tail(source)? else {
        return Ok(Reply::Nil);
    };
    db.list_mut(destination)?.push_front(value.clone());
    db.touch(destination);
    Ok(Reply::Bulk(value))
}

fn lpop(db: &mut Database, key: &Bytes) -> Result<Reply, Reply> {
    if db.list(key)?.is_none() {
        return Ok(Reply::Nil);
    }
    let popped = db.list_mut(key)?.pop_front();
    db.drop_if_empty(key);
    db.touch(key);
    Ok(popped.map_or(Reply::Nil, Reply::Bulk))
}

fn lrem(db: &mut Database, key: &Bytes, count: i64, value: &Bytes) -> Result<Reply, Reply> {
    if db.list(key)?.is_none() {
        return Ok(Reply::Integer(0));
    }
    let list = db.list_mut(key)?;
    let limit = if count == 0 {
        usize::MAX
    } else {
        count.unsigned_abs() as usize
    };

    let mut removed = 0;
    if count >= 0 {
        let mut index = 0;
        while index < list.len() && removed < limit {
            if &list[index] == value {
                list.remove(index);
                removed += 1;
            } else {
                index += 1;
            }
        }
    } else {
        let mut index = list.len();
        while index > 0 && removed < limit {
            index -= 1;
            if &list[index] == value {
                list.remove(index);
                removed += 1;
            }
        }
    }

    db.drop_if_empty(key);
    if removed > 0 {
        db.touch(key);
    }
    Ok(Reply::Integer(removed as i64))
}

fn lrange(list: &VecDeque<Bytes>, start: i64, stop: i64) -> Vec<Reply> {
    let len = list.len() as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return Vec::new();
    }
    (start..=stop)
        .map(|i| Reply::Bulk(list[i as usize].clone()))
        .collect()
}

/// Glob matching as used by `KEYS`: `*`, `?`, and `\` escapes
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((&b'*', rest)) => (0..=text.len()).any(|skip| glob_match(rest, &text[skip..])),
        Some((&b'?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((&b'\\', rest)) if !rest.is_empty() => {
            text.first() == Some(&rest[0]) && glob_match(&rest[1..], &text[1..])
        }
        Some((c, rest)) => text.first() == Some(c) && glob_match(rest, &text[1..]),
    }
}
