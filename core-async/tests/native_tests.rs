//! Runtime facade behaviour the decode engine relies on.

use core_async::sync::CancellationToken;
use core_async::{sync, task, time};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[core_async::test]
async fn test_task_spawn() {
    let handle = task::spawn(async { 42 });
    assert_eq!(handle.await.unwrap(), 42);
}

#[core_async::test]
async fn test_spawn_blocking() {
    let handle = task::spawn_blocking(|| {
        std::thread::sleep(std::time::Duration::from_millis(5));
        100
    });
    assert_eq!(handle.await.unwrap(), 100);
}

#[core_async::test]
async fn test_timeout_failure() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(100)).await;
        42
    })
    .await;
    assert!(result.is_err());
}

#[core_async::test]
async fn test_cancellation_stops_polling_loop() {
    let cancel = CancellationToken::new();
    let polls = Arc::new(AtomicUsize::new(0));

    let loop_token = cancel.clone();
    let loop_polls = polls.clone();
    let handle = task::spawn(async move {
        while !loop_token.is_cancelled() {
            loop_polls.fetch_add(1, Ordering::SeqCst);
            task::yield_now().await;
        }
    });

    time::sleep(time::Duration::from_millis(5)).await;
    cancel.cancel();
    handle.await.unwrap();

    let settled = polls.load(Ordering::SeqCst);
    time::sleep(time::Duration::from_millis(5)).await;
    assert_eq!(polls.load(Ordering::SeqCst), settled);
}

#[core_async::test]
async fn test_child_token_follows_parent() {
    let parent = CancellationToken::new();
    let child = parent.child_token();
    assert!(!child.is_cancelled());
    parent.cancel();
    assert!(child.is_cancelled());
    child.cancelled().await;
}

#[core_async::test]
async fn test_broadcast_channel() {
    let (tx, mut rx1) = sync::broadcast::channel(10);
    let mut rx2 = tx.subscribe();

    for i in 0..3 {
        tx.send(i).unwrap();
    }

    for expected in 0..3 {
        assert_eq!(rx1.recv().await.unwrap(), expected);
        assert_eq!(rx2.recv().await.unwrap(), expected);
    }
}

#[core_async::test]
async fn test_time_utilities() {
    assert!(time::now_millis() > 0);
}
