//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    assert!(RedisCallError::Disconnected {
        endpoint: "127.0.0.1:6379".to_string(),
    }
    .is_transient());

    assert!(RedisCallError::TransactionAborted.is_transient());

    assert!(!RedisCallError::Command {
        command: "LPUSH".to_string(),
        message: "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    }
    .is_transient());

    assert!(!RedisCallError::BackupElementNotFound {
        element: "\"job-A\"".to_string(),
        list: "queue.orders.backup".to_string(),
    }
    .is_transient());

    assert!(RedisCallError::Transport(TransportError::NotConnected).is_transient());
    assert!(!RedisCallError::Transport(TransportError::protocol("bad prefix")).is_transient());

    let client = redis::RedisError::from((redis::ErrorKind::TypeError, "unexpected shape"));
    assert!(!RedisCallError::Transport(TransportError::Client(client)).is_transient());
}

#[test]
fn test_error_kind_matches_variant() {
    assert_eq!(
        RedisCallError::TransactionAborted.kind(),
        ErrorKind::TransactionAborted
    );
    assert_eq!(
        RedisCallError::non_transactional("restore_backup").kind(),
        ErrorKind::NonTransactional
    );
    assert_eq!(
        RedisCallError::unexpected("expected OK").kind(),
        ErrorKind::UnexpectedResult
    );
    assert_eq!(
        RedisCallError::from(CodecError::InvalidUtf8).kind(),
        ErrorKind::Codec
    );
}

#[test]
fn test_retry_suggestions() {
    let aborted = RedisCallError::TransactionAborted;
    assert_eq!(aborted.retry_after(), Some(Duration::ZERO));

    let not_found = RedisCallError::BackupElementNotFound {
        element: "x".to_string(),
        list: "queue.q.backup".to_string(),
    };
    assert_eq!(not_found.retry_after(), None);
}

#[test]
fn test_error_messages() {
    let err = RedisCallError::non_transactional("drain_to_backup");
    assert_eq!(
        err.to_string(),
        "drain_to_backup must not be called inside a transaction"
    );

    let err = RedisCallError::Transport(TransportError::NotConnected);
    assert_eq!(err.to_string(), "Transport error: not connected");
}
