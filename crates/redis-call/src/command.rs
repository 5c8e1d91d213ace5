//! Store commands consumed by the client.
//!
//! Each primitive the connection and queue layers rely on has a named
//! constructor. Anything else goes through [`Command::new`] plus
//! [`Command::arg`].

use crate::key::Key;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// A command name with its arguments, ready to be written to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Bytes>,
}

impl Command {
    /// Start an arbitrary command
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl IntoArg) -> Self {
        self.args.push(arg.into_arg());
        self
    }

    /// Append several arguments
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: IntoArg,
    {
        self.args.extend(args.into_iter().map(IntoArg::into_arg));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Bytes] {
        &self.args
    }

    /// Full frame: the command name followed by its arguments
    pub fn to_frame(&self) -> Vec<Bytes> {
        let mut frame = Vec::with_capacity(self.args.len() + 1);
        frame.push(Bytes::copy_from_slice(self.name.as_bytes()));
        frame.extend(self.args.iter().cloned());
        frame
    }

    pub fn multi() -> Self {
        Self::new("MULTI")
    }

    pub fn exec() -> Self {
        Self::new("EXEC")
    }

    pub fn discard() -> Self {
        Self::new("DISCARD")
    }

    pub fn watch<'a>(keys: impl IntoIterator<Item = &'a Key>) -> Self {
        Self::new("WATCH").args(keys.into_iter().map(Key::as_str))
    }

    pub fn ping() -> Self {
        Self::new("PING")
    }

    pub fn lpush(key: &Key, value: impl IntoArg) -> Self {
        Self::new("LPUSH").arg(key).arg(value)
    }

    pub fn rpop(key: &Key) -> Self {
        Self::new("RPOP").arg(key)
    }

    pub fn brpop(key: &Key, timeout: Duration) -> Self {
        Self::new("BRPOP").arg(key).arg(timeout_seconds(timeout))
    }

    pub fn rpoplpush(source: &Key, destination: &Key) -> Self {
        Self::new("RPOPLPUSH").arg(source).arg(destination)
    }

    pub fn brpoplpush(source: &Key, destination: &Key, timeout: Duration) -> Self {
        Self::new("BRPOPLPUSH")
            .arg(source)
            .arg(destination)
            .arg(timeout_seconds(timeout))
    }

    /// Remove `count` occurrences of `value`; negative counts scan from the tail
    pub fn lrem(key: &Key, count: i64, value: impl IntoArg) -> Self {
        Self::new("LREM").arg(key).arg(count).arg(value)
    }

    pub fn llen(key: &Key) -> Self {
        Self::new("LLEN").arg(key)
    }

    pub fn lrange(key: &Key, start: i64, stop: i64) -> Self {
        Self::new("LRANGE").arg(key).arg(start).arg(stop)
    }

    pub fn del<'a>(keys: impl IntoIterator<Item = &'a Key>) -> Self {
        Self::new("DEL").args(keys.into_iter().map(Key::as_str))
    }

    pub fn keys(pattern: &str) -> Self {
        Self::new("KEYS").arg(pattern)
    }

    pub fn decr(key: &Key) -> Self {
        Self::new("DECR").arg(key)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {:?}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

/// Blocking timeouts travel as whole seconds; a sub-second wait rounds up so
/// that it never turns into "wait forever".
fn timeout_seconds(timeout: Duration) -> u64 {
    let secs = timeout.as_secs();
    if timeout.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Conversion into a single binary-safe command argument
pub trait IntoArg {
    fn into_arg(self) -> Bytes;
}

impl IntoArg for Bytes {
    fn into_arg(self) -> Bytes {
        self
    }
}

impl IntoArg for &Bytes {
    fn into_arg(self) -> Bytes {
        self.clone()
    }
}

impl IntoArg for &[u8] {
    fn into_arg(self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl IntoArg for Vec<u8> {
    fn into_arg(self) -> Bytes {
        Bytes::from(self)
    }
}

impl IntoArg for &str {
    fn into_arg(self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl IntoArg for String {
    fn into_arg(self) -> Bytes {
        Bytes::from(self)
    }
}

impl IntoArg for &String {
    fn into_arg(self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl IntoArg for &Key {
    fn into_arg(self) -> Bytes {
        Bytes::copy_from_slice(self.as_str().as_bytes())
    }
}

impl IntoArg for i64 {
    fn into_arg(self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl IntoArg for u64 {
    fn into_arg(self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
