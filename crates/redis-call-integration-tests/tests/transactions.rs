//! Integration tests for transactions
//!
//! These tests verify:
//! - Queue operations inside a transaction commit together
//! - A failing body leaves the store untouched
//! - Nested transactions share the outermost `MULTI`/`EXEC`
//! - Watched keys abort the transaction when changed, and `insist` repeats it

mod common;

use common::{job, TestStore};
use redis_call::{
    insist, Command, InsistPolicy, Key, Queue, QueueList, RedisCallError, Reply,
};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_moves_between_queues_commit_together() {
    let fixture = TestStore::new();
    let inbox = Queue::json("inbox");
    let outbox = Queue::json("outbox");
    let mut conn = fixture.connect().await;

    let (a, b) = (inbox.clone(), outbox.clone());
    let result = conn
        .multi(&[], move |c| {
            Box::pin(async move {
                let first = a.push(c, &job(1)).await?;
                let second = b.push(c, &job(2)).await?;
                assert!(first.is_queued());
                assert_eq!(second.position(), Some(1));
                Ok::<_, RedisCallError>(())
            })
        })
        .await
        .unwrap();

    assert_eq!(
        result,
        Some(Reply::Array(vec![Reply::Integer(1), Reply::Integer(1)]))
    );
    assert_eq!(inbox.len(&mut conn, QueueList::Main).await.unwrap(), 1);
    assert_eq!(outbox.len(&mut conn, QueueList::Main).await.unwrap(), 1);
    assert!(!conn.in_transaction());
}

/// Verify that an error raised midway through the body discards every
/// command queued before it.
#[tokio::test]
async fn test_failed_body_leaves_nothing_behind() {
    let fixture = TestStore::new();
    let queue = Queue::json("jobs");
    let mut conn = fixture.connect().await;

    let body_queue = queue.clone();
    let result = conn
        .multi(&[], move |c| {
            Box::pin(async move {
                body_queue.push(c, &job(1)).await?;
                body_queue.push(c, &job(2)).await?;
                c.ping().await
            })
        })
        .await;

    assert!(matches!(
        result,
        Err(RedisCallError::NonTransactional { .. })
    ));
    assert!(!conn.in_transaction());
    assert!(!fixture.store.exists("queue.jobs"));

    // The connection stays usable after the abort.
    conn.ping().await.unwrap();
    queue.push(&mut conn, &job(3)).await.unwrap();
    assert_eq!(queue.len(&mut conn, QueueList::Main).await.unwrap(), 1);
}

#[tokio::test]
async fn test_nested_transactions_share_one_exec() {
    let fixture = TestStore::new();
    let queue = Queue::new("mail");
    let mut conn = fixture.connect().await;

    let (outer, inner) = (queue.clone(), queue.clone());
    let result = conn
        .multi(&[], move |c| {
            Box::pin(async move {
                outer.push(c, &json!("a")).await?;
                let nested = c
                    .multi(&[], move |c| {
                        Box::pin(async move {
                            inner.push(c, &json!("b")).await?;
                            Ok::<_, RedisCallError>(())
                        })
                    })
                    .await?;
                assert_eq!(nested, None);
                assert_eq!(c.transaction_depth(), 1);
                Ok::<_, RedisCallError>(())
            })
        })
        .await
        .unwrap();

    assert_eq!(
        result,
        Some(Reply::Array(vec![Reply::Integer(1), Reply::Integer(2)]))
    );
    let elements = queue.elements(&mut conn, QueueList::Main).await.unwrap();
    assert_eq!(elements, vec![json!("b"), json!("a")]);
}

/// Verify that acknowledgement inside a transaction is checked when the
/// transaction commits.
#[tokio::test]
async fn test_acknowledge_checked_at_commit() {
    let fixture = TestStore::new();
    let queue = Queue::json("jobs");
    let mut conn = fixture.connect().await;
    queue.push(&mut conn, &job(1)).await.unwrap();
    let claimed = queue.claim(&mut conn).await.unwrap().ready().unwrap().unwrap();

    let body_queue = queue.clone();
    let raw = claimed.raw.clone();
    let result = conn
        .multi(&[], move |c| {
            Box::pin(async move {
                body_queue.acknowledge(c, &raw).await?;
                body_queue.acknowledge(c, &raw).await?;
                Ok::<_, RedisCallError>(())
            })
        })
        .await;

    assert!(matches!(
        result,
        Err(RedisCallError::BackupElementNotFound { .. })
    ));
    assert!(fixture.raw_list(&queue, QueueList::Backup).is_empty());
}

#[tokio::test]
async fn test_watch_conflict_aborts_transaction() {
    let fixture = TestStore::new();
    let mut conn = fixture.connect().await;
    let mut rival = fixture.connect().await;
    let counter = Key::new("counter");

    let body_counter = counter.clone();
    let result = conn
        .multi(&[counter.clone()], move |c| {
            Box::pin(async move {
                rival.decr(&body_counter).await?;
                c.call(Command::decr(&body_counter)).await?;
                Ok::<_, RedisCallError>(())
            })
        })
        .await;

    assert!(matches!(result, Err(RedisCallError::TransactionAborted)));
    assert_eq!(
        fixture.store.get("counter"),
        Some(bytes::Bytes::from_static(b"-1"))
    );
    assert!(!conn.in_transaction());
}

/// Verify that `insist` repeats a watched transaction after a conflict and
/// gives up once its attempts are used.
#[tokio::test]
async fn test_insist_repeats_watched_transaction() {
    let fixture = TestStore::new();
    let mut conn = fixture.connect().await;
    let rival = Arc::new(tokio::sync::Mutex::new(fixture.connect().await));
    let attempts = Arc::new(AtomicU32::new(0));

    let body_attempts = Arc::clone(&attempts);
    let result = insist(&mut conn, &InsistPolicy::new(3), move |c| {
        let rival = Arc::clone(&rival);
        let attempt = body_attempts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let counter = Key::new("counter");
            c.multi(&[counter.clone()], move |c| {
                Box::pin(async move {
                    if attempt < 2 {
                        rival.lock().await.decr(&counter).await?;
                    }
                    c.call(Command::decr(&counter)).await?;
                    Ok::<_, RedisCallError>(())
                })
            })
            .await
        })
    })
    .await
    .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(result, Some(Reply::Integer(-3)));

    let always_losing = Arc::new(tokio::sync::Mutex::new(fixture.connect().await));
    let exhausted = insist(&mut conn, &InsistPolicy::new(2), move |c| {
        let rival = Arc::clone(&always_losing);
        Box::pin(async move {
            let counter = Key::new("counter");
            c.multi(&[counter.clone()], move |c| {
                Box::pin(async move {
                    rival.lock().await.decr(&counter).await?;
                    c.call(Command::decr(&counter)).await?;
                    Ok::<_, RedisCallError>(())
                })
            })
            .await
        })
    })
    .await;

    assert!(matches!(exhausted, Err(RedisCallError::TransactionAborted)));
    assert_eq!(
        fixture.store.get("counter"),
        Some(bytes::Bytes::from_static(b"-5"))
    );
}
