//! Tests for namespaced keys.

use super::*;

#[test]
fn test_join_builds_dotted_path() {
    let key = Key::new("queue") / "orders" / "backup";
    assert_eq!(key.as_str(), "queue.orders.backup");
    assert_eq!(key.to_string(), "queue.orders.backup");
}

#[test]
fn test_join_does_not_mutate_operand() {
    let base = Key::new("queue");
    let orders = &base / "orders";
    let invoices = &base / "invoices";

    assert_eq!(base.as_str(), "queue");
    assert_eq!(orders.as_str(), "queue.orders");
    assert_eq!(invoices.as_str(), "queue.invoices");
}

#[test]
fn test_join_accepts_display_segments() {
    let key = Key::new("jobs").join(42);
    assert_eq!(key.as_str(), "jobs.42");
}

#[test]
fn test_segments() {
    let key = Key::from("queue.orders.error");
    let segments: Vec<&str> = key.segments().collect();
    assert_eq!(segments, vec!["queue", "orders", "error"]);
}
