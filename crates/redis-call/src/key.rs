//! Namespaced store keys.

use std::fmt;
use std::ops::Div;

/// Separator placed between key segments
pub const KEY_DELIMITER: char = '.';

/// Immutable dotted path addressing an entity in the store.
///
/// Keys compose with `/`; every join produces a new key and leaves the
/// operands untouched:
///
/// ```rust
/// use redis_call::Key;
///
/// let queue = Key::new("queue") / "orders";
/// let backup = &queue / "backup";
///
/// assert_eq!(queue.as_str(), "queue.orders");
/// assert_eq!(backup.as_str(), "queue.orders.backup");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    /// Create a key from a single segment or an already dotted path
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Append a segment, returning the joined key
    pub fn join(&self, segment: impl fmt::Display) -> Self {
        Self(format!("{}{}{}", self.0, KEY_DELIMITER, segment))
    }

    /// Get key as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the key back into its segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(KEY_DELIMITER)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<S: fmt::Display> Div<S> for Key {
    type Output = Key;

    fn div(self, segment: S) -> Key {
        self.join(segment)
    }
}

impl<S: fmt::Display> Div<S> for &Key {
    type Output = Key;

    fn div(self, segment: S) -> Key {
        self.join(segment)
    }
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod tests;
