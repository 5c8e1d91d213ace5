//! Bookkeeping for re-entrant transactions with deferred result transforms.
//!
//! While a transaction accumulates, the store answers every command with a
//! placeholder and only produces real results on commit. Callers that need
//! to interpret a result register a [`Transform`] against the command's
//! position; the chain for each position runs once the committed results
//! are known.

use crate::error::RedisCallError;
use crate::reply::Reply;
use std::collections::{BTreeMap, BTreeSet};

/// Deferred interpretation of one queued command's result
pub type Transform = Box<dyn FnOnce(Reply) -> Result<Reply, RedisCallError> + Send>;

/// Transaction nesting depth plus, while it is non-zero, the pending calls
#[derive(Default)]
pub(crate) struct TransactionState {
    depth: u32,
    pending: Option<Pending>,
}

impl TransactionState {
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    /// Enter one nesting level; the outermost entry starts fresh bookkeeping
    pub fn enter(&mut self) {
        self.depth += 1;
        if self.depth == 1 {
            self.pending = Some(Pending::default());
        }
    }

    /// Leave one nesting level.
    ///
    /// Returns the pending calls when the outermost level was left, `None`
    /// while still nested.
    pub fn leave(&mut self) -> Result<Option<Pending>, RedisCallError> {
        if self.depth == 0 {
            return Err(RedisCallError::unexpected("no transaction is open"));
        }
        self.depth -= 1;
        if self.depth > 0 {
            return Ok(None);
        }
        Ok(Some(self.pending.take().unwrap_or_default()))
    }

    /// Forget everything, e.g. after the connection went away
    pub fn reset(&mut self) {
        self.depth = 0;
        self.pending = None;
    }

    /// Position the next issued command will occupy in the committed result
    pub fn next_position(&self) -> Option<usize> {
        self.pending.as_ref().map(|p| p.next_position)
    }

    /// Record that one more command was issued
    pub fn advance(&mut self) {
        if let Some(pending) = self.pending.as_mut() {
            pending.next_position += 1;
        }
    }

    pub fn register(
        &mut self,
        position: usize,
        transform: Transform,
    ) -> Result<(), RedisCallError> {
        let pending = self.pending_mut()?;
        if position >= pending.next_position {
            return Err(RedisCallError::unexpected(format!(
                "no command has been queued at position {}",
                position
            )));
        }
        pending.transforms.entry(position).or_default().push(transform);
        Ok(())
    }

    pub fn remove_result(&mut self, position: usize) -> Result<(), RedisCallError> {
        self.pending_mut()?.removed.insert(position);
        Ok(())
    }

    fn pending_mut(&mut self) -> Result<&mut Pending, RedisCallError> {
        self.pending
            .as_mut()
            .ok_or_else(|| RedisCallError::unexpected("no transaction is open"))
    }
}

/// Calls issued inside the outermost transaction
#[derive(Default)]
pub(crate) struct Pending {
    next_position: usize,
    transforms: BTreeMap<usize, Vec<Transform>>,
    removed: BTreeSet<usize>,
}

impl Pending {
    /// Turn the store's raw commit results into the caller-visible result.
    ///
    /// Each position's chain runs in registration order. Positions marked
    /// for removal are dropped highest first so lower indexes stay valid. A
    /// single remaining result is returned unwrapped.
    pub fn finish(self, mut results: Vec<Reply>) -> Result<Reply, RedisCallError> {
        let total = results.len();

        for (position, chain) in self.transforms {
            let Some(slot) = results.get_mut(position) else {
                return Err(RedisCallError::unexpected(format!(
                    "transaction returned {} results, none at position {}",
                    total, position
                )));
            };
            let mut value = std::mem::replace(slot, Reply::Nil);
            if let Reply::Error(message) = value {
                return Err(RedisCallError::Command {
                    command: format!("queued command #{}", position),
                    message,
                });
            }
            for transform in chain {
                value = transform(value)?;
            }
            *slot = value;
        }

        for position in self.removed.into_iter().rev() {
            if position < results.len() {
                results.remove(position);
            }
        }

        if results.len() == 1 {
            if let Some(single) = results.pop() {
                return Ok(single);
            }
        }
        Ok(Reply::Array(results))
    }
}

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod tests;
