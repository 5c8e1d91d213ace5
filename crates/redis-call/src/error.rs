//! Error types for connection, transaction, and queue operations.

use std::time::Duration;
use thiserror::Error;

/// Comprehensive error type for all client and queue operations
#[derive(Debug, Error)]
pub enum RedisCallError {
    #[error("Not connected to {endpoint}")]
    Disconnected { endpoint: String },

    #[error("Command {command} failed: {message}")]
    Command { command: String, message: String },

    #[error("Transaction aborted: a watched key was modified")]
    TransactionAborted,

    #[error("Unexpected result: {message}")]
    UnexpectedResult { message: String },

    #[error("Element {element} not found in {list}")]
    BackupElementNotFound { element: String, list: String },

    #[error("{operation} must not be called inside a transaction")]
    NonTransactional { operation: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Discriminant of [`RedisCallError`], used to name retryable conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Disconnected,
    Command,
    TransactionAborted,
    UnexpectedResult,
    BackupElementNotFound,
    NonTransactional,
    Transport,
    Codec,
    Configuration,
}

impl RedisCallError {
    /// Get the error discriminant
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Disconnected { .. } => ErrorKind::Disconnected,
            Self::Command { .. } => ErrorKind::Command,
            Self::TransactionAborted => ErrorKind::TransactionAborted,
            Self::UnexpectedResult { .. } => ErrorKind::UnexpectedResult,
            Self::BackupElementNotFound { .. } => ErrorKind::BackupElementNotFound,
            Self::NonTransactional { .. } => ErrorKind::NonTransactional,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Codec(_) => ErrorKind::Codec,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Check if error is transient and the operation may succeed when repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Disconnected { .. } => true,
            Self::Command { .. } => false,
            Self::TransactionAborted => true,
            Self::UnexpectedResult { .. } => false,
            Self::BackupElementNotFound { .. } => false,
            Self::NonTransactional { .. } => false,
            Self::Transport(e) => e.is_transient(),
            Self::Codec(_) => false,
            Self::Configuration(_) => false,
        }
    }

    /// Get suggested retry delay
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Disconnected { .. } => Some(Duration::from_secs(1)),
            Self::TransactionAborted => Some(Duration::ZERO),
            _ => None,
        }
    }

    pub(crate) fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResult {
            message: message.into(),
        }
    }

    pub(crate) fn non_transactional(operation: &str) -> Self {
        Self::NonTransactional {
            operation: operation.to_string(),
        }
    }
}

/// Failures below the reply level: the link, or the client driving it
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Redis client failure: {0}")]
    Client(#[from] redis::RedisError),

    #[error("Protocol violation: {message}")]
    Protocol { message: String },
}

impl TransportError {
    /// Check if the failure is worth a reconnect and retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotConnected => true,
            Self::Io(_) => true,
            Self::Client(e) => e.is_io_error() || e.is_timeout(),
            Self::Protocol { .. } => false,
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// Errors during payload encoding/decoding
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Codec {codec} cannot encode {found}")]
    Unsupported { codec: String, found: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Queue '{queue}' is not configured")]
    UnknownQueue { queue: String },

    #[error("Configuration loading failed: {0}")]
    Loading(#[from] config::ConfigError),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
