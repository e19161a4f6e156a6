//! IV. Topics are independent.
//!
//! - A stalled topic does not delay another topic
//! - A failing endpoint only affects its own topic
//! - A topic that cannot subscribe leaves its siblings running

use super::harness::{
    binding, refused_endpoint, start_relay, wait_until, MockBus, MockEndpoint, Reply, OK_BODY,
};
use crate::service::RunSummary;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stalled_topic_does_not_delay_sibling() {
    let stalled = MockEndpoint::start(Reply::Hold(OK_BODY.into())).await;
    let healthy = MockEndpoint::start(Reply::Body(OK_BODY.into())).await;

    let bus = MockBus::new();
    let relay = start_relay(
        &bus,
        vec![
            binding("stalled", 1, stalled.url()),
            binding("healthy", 2, healthy.url()),
        ],
    )
    .await;

    for i in 0..5 {
        bus.publish("stalled", format!("s{i}"));
    }
    assert!(wait_until(Duration::from_secs(2), || stalled.received_count() == 1).await);

    for i in 0..10 {
        bus.publish("healthy", format!("h{i}"));
    }
    assert!(
        wait_until(Duration::from_secs(2), || healthy.completed() == 10).await,
        "healthy topic delivered {} of 10",
        healthy.completed()
    );

    assert_eq!(stalled.received_count(), 1);
    assert_eq!(relay.gate("stalled").available(), 0);
    assert_eq!(relay.gate("healthy").available(), 2);

    stalled.release(5);
    relay.handle.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_endpoint_only_affects_its_topic() {
    let healthy = MockEndpoint::start(Reply::Body(OK_BODY.into())).await;
    let refused = refused_endpoint();

    let bus = MockBus::new();
    let relay = start_relay(
        &bus,
        vec![
            binding("broken", 1, &refused),
            binding("healthy", 1, healthy.url()),
        ],
    )
    .await;

    for i in 0..5 {
        bus.publish("broken", format!("b{i}"));
        bus.publish("healthy", format!("h{i}"));
    }

    let logs = relay.logs.clone();
    assert!(wait_until(Duration::from_secs(5), || healthy.completed() == 5).await);
    assert!(wait_until(Duration::from_secs(5), || logs.count("http post failed") == 5).await);

    for line in logs.contents().lines().filter(|l| l.contains("ERROR")) {
        assert!(line.contains("broken"), "error outside failing topic: {line}");
    }

    relay.handle.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn subscribe_failure_leaves_siblings_running() {
    let healthy = MockEndpoint::start(Reply::Body(OK_BODY.into())).await;

    let bus = MockBus::new();
    bus.fail_subscribe("doomed");
    let relay = start_relay(
        &bus,
        vec![
            binding("doomed", 1, healthy.url()),
            binding("healthy", 1, healthy.url()),
        ],
    )
    .await;

    let logs = relay.logs.clone();
    assert!(
        wait_until(Duration::from_secs(2), || {
            logs.contains("Consumer stopped on unrecoverable startup condition")
        })
        .await
    );

    bus.publish("healthy", "still here");
    assert!(wait_until(Duration::from_secs(2), || healthy.completed() == 1).await);
    assert_eq!(healthy.received(), vec!["still here"]);

    bus.close("healthy");
    let summary = tokio::time::timeout(Duration::from_secs(2), relay.handle)
        .await
        .expect("relay should stop once every feed is gone")
        .unwrap();
    assert_eq!(summary, RunSummary { closed: 1, failed: 1 });
}
