//! Tests for the server transport.

use super::*;
use std::path::PathBuf;

#[test]
fn test_reply_from_scalar_values() {
    assert_eq!(reply_from_value(Value::Nil).unwrap(), Reply::Nil);
    assert_eq!(
        reply_from_value(Value::Okay).unwrap(),
        Reply::Status("OK".to_string())
    );
    assert_eq!(
        reply_from_value(Value::SimpleString("QUEUED".to_string())).unwrap(),
        Reply::Status("QUEUED".to_string())
    );
    assert_eq!(reply_from_value(Value::Int(-2)).unwrap(), Reply::Integer(-2));
    assert_eq!(
        reply_from_value(Value::BulkString(b"job-A".to_vec())).unwrap(),
        Reply::from("job-A")
    );
}

/// Verify an EXEC result keeps its shape, including nested nils.
#[test]
fn test_reply_from_nested_array() {
    let value = Value::Array(vec![
        Value::Int(1),
        Value::Array(vec![Value::BulkString(b"a".to_vec()), Value::Nil]),
        Value::Array(vec![]),
    ]);

    assert_eq!(
        reply_from_value(value).unwrap(),
        Reply::Array(vec![
            Reply::Integer(1),
            Reply::Array(vec![Reply::from("a"), Reply::Nil]),
            Reply::Array(vec![]),
        ])
    );
}

#[test]
fn test_resp3_only_values_are_refused() {
    assert!(matches!(
        reply_from_value(Value::Double(1.5)),
        Err(TransportError::Protocol { .. })
    ));
    assert!(matches!(
        reply_from_value(Value::Array(vec![Value::Boolean(true)])),
        Err(TransportError::Protocol { .. })
    ));
}

#[test]
fn test_server_error_message_keeps_code() {
    let error = RedisError::from((
        redis::ErrorKind::ExecAbortError,
        "exec aborted",
        "Transaction discarded because of previous errors.".to_string(),
    ));
    assert_eq!(
        server_error_message(&error),
        "EXECABORT Transaction discarded because of previous errors."
    );

    let client = RedisError::from((redis::ErrorKind::TypeError, "bad type"));
    assert_eq!(server_error_message(&client), client.to_string());
}

#[test]
fn test_connection_info_for_endpoints() {
    let tcp = connection_info(&Endpoint::tcp("cache", 6380));
    assert!(matches!(&tcp.addr, ConnectionAddr::Tcp(host, 6380) if host == "cache"));
    assert_eq!(tcp.redis.db, 0);

    let unix = connection_info(&Endpoint::unix("/run/redis.sock"));
    assert!(matches!(
        &unix.addr,
        ConnectionAddr::Unix(path) if *path == PathBuf::from("/run/redis.sock")
    ));
}

#[tokio::test]
async fn test_closed_transport_reports_not_connected() {
    let mut transport = RedisTransport { connection: None };

    assert!(!transport.is_connected());
    let result = transport.request(&[Bytes::from_static(b"PING")]).await;
    assert!(matches!(result, Err(TransportError::NotConnected)));

    transport.disconnect().await.unwrap();
    transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_refused_connection_is_not_connected() {
    let result = RedisConnector::new()
        .connect(&Endpoint::tcp("127.0.0.1", 1))
        .await;
    assert!(matches!(result, Err(TransportError::NotConnected)));
}
