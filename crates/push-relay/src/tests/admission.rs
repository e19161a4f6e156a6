//! I. Bounded concurrency and slot accounting.
//!
//! - A topic never has more requests in flight than its concurrency
//! - Every outcome gives its slot back

use super::harness::{
    binding, broken_body_endpoint, refused_endpoint, start_relay, wait_until, MockBus,
    MockEndpoint, Reply, BAD_TOKEN_BODY, OK_BODY,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn burst_never_exceeds_concurrency() {
    let endpoint = MockEndpoint::start(Reply::Delay(Duration::from_millis(50), OK_BODY.into())).await;
    let bus = MockBus::new();
    let relay = start_relay(&bus, vec![binding("orders", 3, endpoint.url())]).await;
    let gate = relay.gate("orders").clone();

    // Sample the gate while the burst drains.
    let peak = Arc::new(AtomicUsize::new(0));
    let sampler = {
        let gate = gate.clone();
        let peak = peak.clone();
        tokio::spawn(async move {
            loop {
                peak.fetch_max(gate.in_flight(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
    };

    for i in 0..20 {
        assert_eq!(bus.publish("orders", format!("order-{i}")), 1);
    }

    assert!(
        wait_until(Duration::from_secs(10), || endpoint.completed() == 20).await,
        "only {} of 20 delivered",
        endpoint.completed()
    );
    sampler.abort();

    assert!(
        endpoint.max_in_flight() <= 3,
        "endpoint saw {} concurrent requests",
        endpoint.max_in_flight()
    );
    assert!(endpoint.max_in_flight() >= 2, "burst should run concurrently");
    assert!(peak.load(Ordering::SeqCst) <= 3);

    assert!(wait_until(Duration::from_secs(2), || gate.available() == 3).await);
    relay.handle.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_slot_delivers_one_at_a_time_in_order() {
    let endpoint = MockEndpoint::start(Reply::Delay(Duration::from_millis(10), OK_BODY.into())).await;
    let bus = MockBus::new();
    let relay = start_relay(&bus, vec![binding("serial", 1, endpoint.url())]).await;

    let sent: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
    for payload in &sent {
        bus.publish("serial", payload.as_str());
    }

    assert!(wait_until(Duration::from_secs(5), || endpoint.completed() == 10).await);
    assert_eq!(endpoint.max_in_flight(), 1);
    assert_eq!(endpoint.received(), sent);
    relay.handle.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_outcome_releases_its_slot() {
    let echo = MockEndpoint::start(Reply::EchoPayload).await;
    let (broken, broken_server) = broken_body_endpoint().await;
    let refused = refused_endpoint();

    let bus = MockBus::new();
    let relay = start_relay(
        &bus,
        vec![
            binding("echo", 2, echo.url()),
            binding("broken", 2, &broken),
            binding("refused", 2, &refused),
        ],
    )
    .await;

    for _ in 0..3 {
        bus.publish("echo", OK_BODY);
        bus.publish("echo", BAD_TOKEN_BODY);
        bus.publish("echo", "not-json");
        bus.publish("broken", "payload");
        bus.publish("refused", "payload");
    }

    let logs = relay.logs.clone();
    assert!(
        wait_until(Duration::from_secs(10), || {
            logs.count("json response tells error") == 3
                && logs.count("parse json response failed") == 3
                && logs.count("read response body failed") == 3
                && logs.count("http post failed") == 3
        })
        .await,
        "missing failure logs:\n{}",
        logs.contents()
    );

    for topic in ["echo", "broken", "refused"] {
        let gate = relay.gate(topic).clone();
        assert!(
            wait_until(Duration::from_secs(2), || gate.available() == 2).await,
            "topic {topic} leaked a slot"
        );
    }

    // Nine messages on a two-slot topic only get through if slots come back.
    assert_eq!(echo.received_count(), 9);

    relay.handle.abort();
    broken_server.abort();
}
