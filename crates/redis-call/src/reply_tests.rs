//! Tests for reply accessors.

use super::*;

#[test]
fn test_status_predicates() {
    assert!(Reply::Status("OK".to_string()).is_ok());
    assert!(Reply::Status(QUEUED.to_string()).is_queued());
    assert!(!Reply::Status("QUEUED".to_string()).is_ok());
    assert!(Reply::Nil.is_nil());
}

#[test]
fn test_into_bulk_treats_nil_as_absent() {
    assert_eq!(Reply::Nil.into_bulk().unwrap(), None);
    assert_eq!(
        Reply::from("job").into_bulk().unwrap(),
        Some(Bytes::from_static(b"job"))
    );
    assert!(matches!(
        Reply::Integer(3).into_bulk(),
        Err(RedisCallError::UnexpectedResult { .. })
    ));
}

#[test]
fn test_into_array_treats_nil_as_empty() {
    assert!(Reply::Nil.into_array().unwrap().is_empty());
    let items = Reply::Array(vec![Reply::from(1), Reply::Nil]).into_array().unwrap();
    assert_eq!(items, vec![Reply::Integer(1), Reply::Nil]);
}

#[test]
fn test_as_integer_rejects_other_shapes() {
    assert_eq!(Reply::Integer(-2).as_integer().unwrap(), -2);
    let error = Reply::Error("ERR boom".to_string()).as_integer().unwrap_err();
    assert!(error.to_string().contains("error \"ERR boom\""));
}
