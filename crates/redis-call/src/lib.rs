//! # Redis Call
//!
//! Transactional command sessions and reliable list-backed work queues for
//! Redis.
//!
//! This library provides:
//! - A connection with re-entrant transactions whose results are
//!   interpreted by deferred transforms at commit
//! - Per-worker connection pooling and scoped sessions
//! - Reliable queues with claim/acknowledge semantics, a backup list for
//!   crash recovery and an error list for dead letters
//! - Retrying of optimistic transactions that lose a watch race
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all operations
//! - [`key`] - Hierarchical key names
//! - [`command`] / [`reply`] - Command frames and typed replies
//! - [`transport`] - Server and in-memory transports
//! - [`connection`] - Command execution and the transaction engine
//! - [`pool`] / [`session`] - Connection reuse and scoped use
//! - [`codec`] - Payload encodings
//! - [`queue`] - Reliable queues and requeue filters
//! - [`retry`] - The `insist` retry wrapper
//! - [`config`] - Endpoints and client configuration

// Module declarations
pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod key;
pub mod pool;
pub mod queue;
pub mod reply;
pub mod retry;
pub mod session;
mod transaction;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use codec::{Codec, JsonCodec, KeepSerialized, PlainCodec, SERIALIZED_FIELD};
pub use command::Command;
pub use config::{ClientConfig, ConnectionConfig, Endpoint, QueueOptions};
pub use connection::{Connection, Outcome, TransactionBody};
pub use error::{CodecError, ConfigurationError, ErrorKind, RedisCallError, TransportError};
pub use key::Key;
pub use pool::{ConnectionPool, PooledConnection, WorkerId};
pub use queue::{
    Claimed, Identity, Queue, QueueList, Requeue, RequeueFilter, RestoreReport, RetryLimit,
    DEFAULT_RETRY_LIMIT, RETRY_COUNT_FIELD,
};
pub use reply::Reply;
pub use retry::{insist, InsistPolicy};
pub use session::{query, Session};
pub use transaction::Transform;
pub use transport::{Connector, MemoryStore, RedisConnector, Transport};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
