//! Store transports.
//!
//! A [`Transport`] sends one command frame to the store and returns its typed
//! reply; it knows nothing about transactions or queues. A [`Connector`]
//! opens transports for an [`Endpoint`].
//!
//! Two implementations ship with the crate:
//! - [`RedisTransport`] holds a dedicated `redis` crate connection over TCP
//!   or a Unix socket (opened by [`RedisConnector`])
//! - [`MemoryTransport`] talks to an in-process [`MemoryStore`], used for
//!   tests and local development

use crate::config::Endpoint;
use crate::error::TransportError;
use crate::reply::Reply;
use async_trait::async_trait;
use bytes::Bytes;

pub mod memory;
pub mod network;

pub use memory::{MemoryStore, MemoryTransport};
pub use network::{RedisConnector, RedisTransport};

/// One live link to the store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Whether the link is still believed usable
    fn is_connected(&self) -> bool;

    /// Send a command frame (name followed by arguments) and wait for its
    /// reply; store-side errors arrive as [`Reply::Error`]
    async fn request(&mut self, frame: &[Bytes]) -> Result<Reply, TransportError>;

    /// Close the link; closing an already closed link is not an error
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Factory for transports bound to an endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, TransportError>;
}
