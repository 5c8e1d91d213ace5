//! Tests for transaction bookkeeping.

use super::*;

fn add(n: i64) -> Transform {
    Box::new(move |reply| Ok(Reply::Integer(reply.as_integer()? + n)))
}

fn times(n: i64) -> Transform {
    Box::new(move |reply| Ok(Reply::Integer(reply.as_integer()? * n)))
}

fn open_with_calls(calls: usize) -> TransactionState {
    let mut state = TransactionState::default();
    state.enter();
    for _ in 0..calls {
        state.advance();
    }
    state
}

#[test]
fn test_pending_exists_only_inside_transaction() {
    let mut state = TransactionState::default();
    assert!(!state.is_active());
    assert_eq!(state.next_position(), None);

    state.enter();
    assert_eq!(state.next_position(), Some(0));
    state.advance();
    assert_eq!(state.next_position(), Some(1));

    assert!(state.leave().unwrap().is_some());
    assert!(!state.is_active());
    assert_eq!(state.next_position(), None);
}

#[test]
fn test_nested_levels_share_bookkeeping() {
    let mut state = TransactionState::default();
    state.enter();
    state.advance();
    state.enter();
    assert_eq!(state.depth(), 2);
    assert_eq!(state.next_position(), Some(1), "inner level must not reset");

    assert!(state.leave().unwrap().is_none());
    assert_eq!(state.next_position(), Some(1));
    assert!(state.leave().unwrap().is_some());
}

#[test]
fn test_leave_without_enter_fails() {
    let mut state = TransactionState::default();
    assert!(matches!(
        state.leave(),
        Err(RedisCallError::UnexpectedResult { .. })
    ));
}

#[test]
fn test_advance_outside_transaction_is_noop() {
    let mut state = TransactionState::default();
    state.advance();
    state.enter();
    assert_eq!(state.next_position(), Some(0));
}

/// Verify chained transforms run in registration order and untouched
/// positions pass through.
#[test]
fn test_transform_chain_order() {
    let mut state = open_with_calls(3);
    state.register(0, times(10)).unwrap();
    state.register(1, add(1)).unwrap();
    state.register(1, times(100)).unwrap();

    let pending = state.leave().unwrap().unwrap();
    let result = pending
        .finish(vec![Reply::Integer(1), Reply::Integer(2), Reply::Integer(7)])
        .unwrap();

    assert_eq!(
        result,
        Reply::Array(vec![
            Reply::Integer(10),
            Reply::Integer(300),
            Reply::Integer(7)
        ])
    );
}

#[test]
fn test_removed_positions_dropped_high_to_low() {
    let mut state = open_with_calls(4);
    state.remove_result(0).unwrap();
    state.remove_result(2).unwrap();

    let pending = state.leave().unwrap().unwrap();
    let result = pending
        .finish(vec![
            Reply::Integer(0),
            Reply::Integer(1),
            Reply::Integer(2),
            Reply::Integer(3),
        ])
        .unwrap();

    assert_eq!(result, Reply::Array(vec![Reply::Integer(1), Reply::Integer(3)]));
}

#[test]
fn test_single_remaining_result_is_unwrapped() {
    let mut state = open_with_calls(2);
    state.remove_result(0).unwrap();
    state.register(1, add(5)).unwrap();

    let pending = state.leave().unwrap().unwrap();
    let result = pending
        .finish(vec![Reply::Status("OK".to_string()), Reply::Integer(1)])
        .unwrap();

    assert_eq!(result, Reply::Integer(6));
}

#[test]
fn test_transform_error_propagates() {
    let mut state = open_with_calls(1);
    state
        .register(
            0,
            Box::new(|_| Err(RedisCallError::unexpected("rejected"))),
        )
        .unwrap();

    let pending = state.leave().unwrap().unwrap();
    let result = pending.finish(vec![Reply::Integer(1)]);
    assert!(matches!(result, Err(RedisCallError::UnexpectedResult { .. })));
}

#[test]
fn test_error_element_with_transform_is_raised() {
    let mut state = open_with_calls(1);
    state.register(0, add(1)).unwrap();

    let pending = state.leave().unwrap().unwrap();
    let result = pending.finish(vec![Reply::Error("WRONGTYPE".to_string())]);
    assert!(matches!(result, Err(RedisCallError::Command { .. })));
}

#[test]
fn test_register_rejects_unqueued_position() {
    let mut state = open_with_calls(1);
    assert!(state.register(1, add(1)).is_err());

    let mut idle = TransactionState::default();
    assert!(idle.register(0, add(1)).is_err());
}
