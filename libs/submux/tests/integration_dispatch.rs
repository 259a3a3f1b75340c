//! Integration tests for frame dispatch and delivery isolation
//!
//! Each subscription owns an independent bounded queue; these tests pin down
//! ordering, error isolation, staleness handling and slow-consumer behavior.

mod common;

use common::{next_session, MockTransport, ServerEnd};
use serde_json::json;
use std::time::Duration;
use submux::{DeliveryPolicy, FixedDelay, SubscriptionClient, SubscriptionEvent};
use tokio::sync::mpsc;

/// Macro for verbose test output
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

async fn ready_client(
    policy: DeliveryPolicy,
    capacity: usize,
) -> (SubscriptionClient, mpsc::UnboundedReceiver<ServerEnd>) {
    let (transport, sessions) = MockTransport::new();
    let client = submux::builder()
        .url("ws://scripted.invalid/graphql")
        .transport(transport)
        .reconnect_policy(FixedDelay::new(Duration::from_millis(5), None))
        .delivery_policy(policy)
        .queue_capacity(capacity)
        .build()
        .await
        .unwrap();
    (client, sessions)
}

/// Accept the connection the first registration triggers and consume its
/// replayed subscribe frames.
async fn accept_first_session(
    sessions: &mut mpsc::UnboundedReceiver<ServerEnd>,
    subscriptions: usize,
) -> ServerEnd {
    let mut server = next_session(sessions).await;
    server.accept_handshake().await;
    for _ in 0..subscriptions {
        server.expect("subscribe").await;
    }
    server
}

#[tokio::test]
async fn events_arrive_in_server_order() {
    let (client, mut sessions) = ready_client(DeliveryPolicy::Block, 64).await;
    let mut handle = client
        .subscribe_with_key("seq", "subscription { seq }", None)
        .unwrap();
    let mut server = accept_first_session(&mut sessions, 1).await;

    for n in 0..50 {
        server.send(json!({"type": "next", "id": "1:seq", "payload": {"n": n}}));
    }
    for n in 0..50 {
        assert_eq!(
            handle.next().await,
            Some(SubscriptionEvent::Next(json!({"n": n}))),
            "out of order at {n}"
        );
    }

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn frames_are_demultiplexed_by_id() {
    let (client, mut sessions) = ready_client(DeliveryPolicy::Block, 64).await;
    let mut alerts = client
        .subscribe_with_key("alerts", "subscription { alerts }", None)
        .unwrap();
    let mut audit = client
        .subscribe_with_key("audit", "subscription { audit }", None)
        .unwrap();
    let mut server = accept_first_session(&mut sessions, 2).await;

    server.send(json!({"type": "next", "id": "1:audit", "payload": {"for": "audit"}}));
    server.send(json!({"type": "next", "id": "1:alerts", "payload": {"for": "alerts"}}));

    assert_eq!(
        alerts.next().await,
        Some(SubscriptionEvent::Next(json!({"for": "alerts"})))
    );
    assert_eq!(
        audit.next().await,
        Some(SubscriptionEvent::Next(json!({"for": "audit"})))
    );

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn server_error_terminates_only_its_subscription() {
    let (client, mut sessions) = ready_client(DeliveryPolicy::Block, 64).await;
    let mut doomed = client
        .subscribe_with_key("doomed", "subscription { doomed }", None)
        .unwrap();
    let mut healthy = client
        .subscribe_with_key("healthy", "subscription { healthy }", None)
        .unwrap();
    let mut server = accept_first_session(&mut sessions, 2).await;

    server.send(json!({
        "type": "error",
        "id": "1:doomed",
        "payload": [{"message": "no such field"}],
    }));

    match doomed.next().await {
        Some(SubscriptionEvent::Failed(payload)) => {
            assert_eq!(payload[0]["message"], "no such field");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(doomed.next().await, None);

    // The neighbor never notices.
    server.send(json!({"type": "next", "id": "1:healthy", "payload": {"ok": true}}));
    assert_eq!(
        healthy.next().await,
        Some(SubscriptionEvent::Next(json!({"ok": true})))
    );
    assert_eq!(client.subscription_count(), 1);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn server_complete_ends_the_subscription_cleanly() {
    let (client, mut sessions) = ready_client(DeliveryPolicy::Block, 64).await;
    let mut handle = client
        .subscribe_with_key("finite", "subscription { finite }", None)
        .unwrap();
    let mut server = accept_first_session(&mut sessions, 1).await;

    server.send(json!({"type": "next", "id": "1:finite", "payload": {"last": true}}));
    server.send(json!({"type": "complete", "id": "1:finite"}));

    assert_eq!(
        handle.next().await,
        Some(SubscriptionEvent::Next(json!({"last": true})))
    );
    assert_eq!(handle.next().await, Some(SubscriptionEvent::Completed));
    assert_eq!(handle.next().await, None);
    assert_eq!(client.subscription_count(), 0);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_id_frames_are_counted_and_dropped() {
    let (client, mut sessions) = ready_client(DeliveryPolicy::Block, 64).await;
    let mut handle = client
        .subscribe_with_key("live", "subscription { live }", None)
        .unwrap();
    let mut server = accept_first_session(&mut sessions, 1).await;

    // Data and error frames for ids nobody owns; neither may disturb the
    // connection or any live subscription.
    server.send(json!({"type": "next", "id": "1:ghost", "payload": {"boo": 1}}));
    server.send(json!({"type": "error", "id": "9:gone", "payload": [{"message": "x"}]}));
    server.send(json!({"type": "next", "id": "1:live", "payload": {"n": 1}}));

    assert_eq!(
        handle.next().await,
        Some(SubscriptionEvent::Next(json!({"n": 1})))
    );
    let metrics = client.metrics();
    verbose_println!("metrics: {metrics:?}");
    assert_eq!(metrics.stale_dropped, 2);
    assert_eq!(metrics.events_dispatched, 1);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn frames_from_a_dead_generation_never_reach_handles() {
    let (transport, mut sessions) = MockTransport::new();
    let client = submux::builder()
        .url("ws://scripted.invalid/graphql")
        .transport(transport)
        .reconnect_policy(FixedDelay::new(Duration::from_millis(5), None))
        .build()
        .await
        .unwrap();
    let mut handle = client
        .subscribe_with_key("feed", "subscription { feed }", None)
        .unwrap();

    let mut server = next_session(&mut sessions).await;
    server.accept_handshake().await;
    server.expect("subscribe").await;
    server.close();

    let mut server = next_session(&mut sessions).await;
    server.accept_handshake().await;
    server.expect("subscribe").await;

    // A frame delayed from the previous incarnation arrives after the replay.
    server.send(json!({"type": "next", "id": "1:feed", "payload": {"stale": true}}));
    server.send(json!({"type": "next", "id": "2:feed", "payload": {"fresh": true}}));

    assert_eq!(
        handle.next().await,
        Some(SubscriptionEvent::Next(json!({"fresh": true})))
    );
    assert_eq!(client.metrics().stale_dropped, 1);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn slow_consumer_does_not_stall_its_neighbors() {
    let (client, mut sessions) = ready_client(DeliveryPolicy::DropOldest, 4).await;
    let mut slow = client
        .subscribe_with_key("slow", "subscription { slow }", None)
        .unwrap();
    let mut fast = client
        .subscribe_with_key("fast", "subscription { fast }", None)
        .unwrap();
    let mut server = accept_first_session(&mut sessions, 2).await;

    // Flood the never-read subscription far past its queue capacity, with
    // a little of the other subscription's traffic interleaved.
    for n in 0..200 {
        server.send(json!({"type": "next", "id": "1:slow", "payload": {"n": n}}));
        if n % 50 == 0 && n > 0 {
            server.send(json!({"type": "next", "id": "1:fast", "payload": {"n": n}}));
        }
    }
    server.send(json!({"type": "next", "id": "1:fast", "payload": {"fin": true}}));

    // Every fast event arrives, in order, despite the flooded neighbor.
    for n in [50, 100, 150] {
        assert_eq!(
            fast.next().await,
            Some(SubscriptionEvent::Next(json!({"n": n}))),
            "fast subscription stalled at {n}"
        );
    }
    // The trailing marker doubles as a barrier: once it arrives, every slow
    // frame before it has been dispatched too.
    assert_eq!(
        fast.next().await,
        Some(SubscriptionEvent::Next(json!({"fin": true})))
    );

    // The slow queue kept only the newest events.
    for n in 196..200 {
        assert_eq!(
            slow.next().await,
            Some(SubscriptionEvent::Next(json!({"n": n})))
        );
    }

    let metrics = client.metrics();
    verbose_println!("dropped {} events", metrics.events_dropped);
    assert_eq!(metrics.events_dropped, 196);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn blocked_queue_backpressure_releases_when_the_consumer_drains() {
    let (client, mut sessions) = ready_client(DeliveryPolicy::Block, 2).await;
    let mut handle = client
        .subscribe_with_key("bp", "subscription { bp }", None)
        .unwrap();
    let mut server = accept_first_session(&mut sessions, 1).await;

    // Two fill the queue; the third parks the dispatcher until we read.
    for n in 0..3 {
        server.send(json!({"type": "next", "id": "1:bp", "payload": {"n": n}}));
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    for n in 0..3 {
        assert_eq!(
            handle.next().await,
            Some(SubscriptionEvent::Next(json!({"n": n})))
        );
    }

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_frame_recycles_the_connection() {
    let (transport, mut sessions) = MockTransport::new();
    let client = submux::builder()
        .url("ws://scripted.invalid/graphql")
        .transport(transport)
        .reconnect_policy(FixedDelay::new(Duration::from_millis(5), None))
        .build()
        .await
        .unwrap();
    let _handle = client
        .subscribe_with_key("a", "subscription { a }", None)
        .unwrap();

    let mut server = next_session(&mut sessions).await;
    server.accept_handshake().await;
    server.expect("subscribe").await;
    server.send_raw("not json at all");

    // The client treats the protocol violation as a lost connection and
    // comes back on a fresh generation.
    let mut server = next_session(&mut sessions).await;
    server.accept_handshake().await;
    let subscribe = server.expect("subscribe").await;
    assert_eq!(subscribe["id"], "2:a");

    client.shutdown().await.unwrap();
}
