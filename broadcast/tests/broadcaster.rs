//! Behavioural tests for the broadcast primitive
//!
//! - Per-receiver FIFO order
//! - No replay for late subscribers
//! - Writers never block on stalled consumers
//! - Idempotent stop on both ends, end-of-stream after drain

use hub_broadcast::{Broadcaster, Receiver};
use std::time::Duration;
use tokio::time::timeout;

async fn read_n(receiver: &mut Receiver<u64>, n: usize) -> Vec<u64> {
    let mut values = Vec::with_capacity(n);
    for _ in 0..n {
        let value = timeout(Duration::from_secs(5), receiver.read())
            .await
            .expect("read timed out")
            .expect("stream ended early");
        values.push(value);
    }
    values
}

#[tokio::test]
async fn test_values_arrive_in_write_order() {
    let broadcaster = Broadcaster::new();
    let mut receiver = broadcaster.subscribe();

    for value in 0..500u64 {
        broadcaster.write(value);
    }

    let values = read_n(&mut receiver, 500).await;
    assert_eq!(values, (0..500).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_every_receiver_sees_every_value() {
    let broadcaster = Broadcaster::new();
    let mut first = broadcaster.subscribe();
    let mut second = broadcaster.subscribe();

    for value in 1..=10u64 {
        broadcaster.write(value);
    }

    assert_eq!(read_n(&mut first, 10).await, (1..=10).collect::<Vec<_>>());
    assert_eq!(read_n(&mut second, 10).await, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_late_subscriber_gets_no_replay() {
    let broadcaster = Broadcaster::new();
    let mut early = broadcaster.subscribe();

    broadcaster.write(1u64);
    broadcaster.write(2u64);
    assert_eq!(read_n(&mut early, 2).await, vec![1, 2]);

    let mut late = broadcaster.subscribe();
    broadcaster.write(3u64);

    assert_eq!(read_n(&mut late, 1).await, vec![3]);
    assert_eq!(read_n(&mut early, 1).await, vec![3]);
}

#[tokio::test]
async fn test_stalled_consumer_does_not_block_writer() {
    let broadcaster = Broadcaster::new();
    let mut stalled = broadcaster.subscribe();
    let mut active = broadcaster.subscribe();

    // Nobody reads `stalled` while 10k values go out.
    let writes = async {
        for value in 0..10_000u64 {
            broadcaster.write(value);
        }
    };
    timeout(Duration::from_secs(1), writes)
        .await
        .expect("writer blocked on a stalled consumer");

    assert_eq!(read_n(&mut active, 10_000).await.len(), 10_000);

    // The stalled receiver's backlog is intact and ordered.
    let backlog = read_n(&mut stalled, 10_000).await;
    assert!(backlog.windows(2).all(|pair| pair[0] + 1 == pair[1]));
}

#[tokio::test]
async fn test_slow_consumer_keeps_order_through_backoff() {
    let broadcaster = Broadcaster::new();
    let mut receiver = broadcaster.subscribe();

    for value in 0..5u64 {
        broadcaster.write(value);
    }

    let mut seen = Vec::new();
    for _ in 0..5 {
        // Long enough for the delivery task to time out and back off.
        tokio::time::sleep(Duration::from_millis(60)).await;
        seen.push(receiver.read().await.unwrap());
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_reads_after_stop_drain_then_end() {
    let broadcaster = Broadcaster::new();
    let mut receiver = broadcaster.subscribe();

    broadcaster.write(1u64);
    broadcaster.write(2u64);
    broadcaster.write(3u64);
    broadcaster.stop().await;

    assert_eq!(read_n(&mut receiver, 3).await, vec![1, 2, 3]);
    let end = timeout(Duration::from_secs(5), receiver.read()).await.unwrap();
    assert_eq!(end, None);
}

#[tokio::test]
async fn test_double_stop_is_harmless() {
    let broadcaster: Broadcaster<u64> = Broadcaster::new();
    let mut receiver = broadcaster.subscribe();

    broadcaster.stop().await;
    broadcaster.stop().await;
    broadcaster.clone().stop().await;

    receiver.stop().await;
    receiver.stop().await;
    assert_eq!(receiver.read().await, None);
}

#[tokio::test]
async fn test_write_after_stop_is_noop() {
    let broadcaster = Broadcaster::new();
    let mut receiver = broadcaster.subscribe();

    broadcaster.stop().await;
    broadcaster.write(42u64);

    let end = timeout(Duration::from_secs(5), receiver.read()).await.unwrap();
    assert_eq!(end, None);
}

#[tokio::test]
async fn test_subscribe_after_stop_returns_closed_receiver() {
    let broadcaster: Broadcaster<u64> = Broadcaster::new();
    broadcaster.stop().await;

    let mut receiver = broadcaster.subscribe();
    let end = timeout(Duration::from_secs(1), receiver.read()).await.unwrap();
    assert_eq!(end, None);
}

#[tokio::test]
async fn test_stopped_receiver_no_longer_receives() {
    let broadcaster = Broadcaster::new();
    let mut leaving = broadcaster.subscribe();
    let mut staying = broadcaster.subscribe();

    broadcaster.write(1u64);
    tokio::time::sleep(Duration::from_millis(50)).await;

    leaving.stop().await;
    broadcaster.write(2u64);

    assert_eq!(read_n(&mut staying, 2).await, vec![1, 2]);
    assert_eq!(leaving.read().await, Some(1));
    assert_eq!(leaving.read().await, None);
}

#[tokio::test]
async fn test_dropped_receiver_does_not_disturb_others() {
    let broadcaster = Broadcaster::new();
    let dropped = broadcaster.subscribe();
    let mut kept = broadcaster.subscribe();

    drop(dropped);
    for value in 0..3u64 {
        broadcaster.write(value);
    }

    assert_eq!(read_n(&mut kept, 3).await, vec![0, 1, 2]);
}
