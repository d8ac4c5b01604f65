//! Relay tests against in-memory transports

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::config::SelfTestConfig;
use crate::endpoint::{BrokerEndpoint, CloudEndpoint};
use crate::message::CONTENT_TYPE_JSON;
use crate::transport::fake::{FakeBroker, FakeCloud};
use crate::transport::{ConnectionStatus, StatusChange, StatusReason};

const TOPIC: &str = "telemetry";

fn relay() -> (Arc<FakeBroker>, Arc<FakeCloud>, Relay<FakeBroker, FakeCloud>) {
    let broker = Arc::new(FakeBroker::default());
    let cloud = Arc::new(FakeCloud::default());
    let relay = Relay::new(
        BrokerEndpoint::new(broker.clone(), TOPIC),
        CloudEndpoint::new(cloud.clone()),
    );
    (broker, cloud, relay)
}

async fn started() -> (Arc<FakeBroker>, Arc<FakeCloud>, Relay<FakeBroker, FakeCloud>) {
    let (broker, cloud, relay) = relay();
    relay.start(&CancellationToken::new()).await.unwrap();
    (broker, cloud, relay)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn burst(count: u32) -> SelfTestConfig {
    SelfTestConfig {
        enabled: true,
        count,
        interval: Duration::ZERO,
    }
}

// ============================================================================
// Startup
// ============================================================================

#[tokio::test]
async fn test_start_connects_and_subscribes() {
    let (broker, cloud, relay) = started().await;

    assert!(relay.broker().is_connected());
    assert!(relay.cloud().is_connected());
    assert!(cloud.is_connected());
    assert_eq!(broker.subscriptions(), vec![TOPIC.to_string()]);
}

#[tokio::test]
async fn test_start_twice_rejected() {
    let (_broker, _cloud, relay) = started().await;
    let err = relay.start(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, RelayError::AlreadyStarted));
}

#[tokio::test]
async fn test_broker_connect_failure_aborts_startup() {
    let (broker, cloud, relay) = relay();
    broker.fail_connect();

    let err = relay.start(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, RelayError::BrokerConnect(_)));
    assert!(!cloud.is_connected());
    assert_eq!(relay.cloud().status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_cloud_connect_failure_disconnects_broker() {
    let (broker, cloud, relay) = relay();
    cloud.fail_connect();

    let err = relay.start(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, RelayError::CloudConnect(_)));
    assert!(!broker.is_connected());
    assert_eq!(relay.broker().status(), ConnectionStatus::Disconnected);
    assert!(broker.subscriptions().is_empty());
}

#[tokio::test]
async fn test_subscribe_failure_disconnects_both() {
    let (broker, cloud, relay) = relay();
    broker.fail_subscribe();

    let err = relay.start(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, RelayError::Subscribe(_)));
    assert!(!broker.is_connected());
    assert!(!cloud.is_connected());
    assert!(!relay.broker().is_subscribed().await);
}

#[tokio::test]
async fn test_cancelled_startup_leaves_endpoints_disconnected() {
    let (broker, _cloud, relay) = relay();
    broker.hang_connect();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = relay.start(&cancel).await.unwrap_err();
    assert!(matches!(err, RelayError::BrokerConnect(EndpointError::Cancelled)));
    assert_eq!(relay.broker().status(), ConnectionStatus::Disconnected);
    assert_eq!(relay.cloud().status(), ConnectionStatus::Disconnected);
}

// ============================================================================
// Forwarding
// ============================================================================

#[tokio::test]
async fn test_self_test_burst_reaches_cloud_unchanged() {
    let (broker, cloud, relay) = started().await;

    let report = relay.run_self_test(&burst(50)).await;
    assert_eq!(
        report,
        SelfTestReport {
            published: 50,
            skipped: 0,
            failed: 0
        }
    );

    wait_until(|| cloud.sent().len() == 50).await;

    let published: Vec<_> = broker.published().into_iter().map(|p| p.payload).collect();
    let sent: Vec<_> = cloud.sent().into_iter().map(|m| m.payload().clone()).collect();
    let expected: Vec<_> = (0..50)
        .map(|i| format!(r#"{{"status":"OK","id":{}}}"#, i).into_bytes())
        .collect();

    assert_eq!(published, sent);
    assert_eq!(
        sent.iter().map(|p| p.to_vec()).collect::<Vec<_>>(),
        expected
    );
    for message in cloud.sent() {
        assert_eq!(message.content_type(), Some(CONTENT_TYPE_JSON));
        assert!(message.message_id().is_some());
    }

    assert_eq!(
        relay.stats(),
        StatsSnapshot {
            received: 50,
            forwarded: 50,
            skipped: 0,
            failed: 0
        }
    );
}

#[tokio::test]
async fn test_cloud_disconnected_messages_skipped() {
    let (broker, cloud, relay) = started().await;
    cloud.report(StatusChange::disconnected(StatusReason::ConnectionLost));

    broker.deliver(TOPIC, "reading-1");
    broker.deliver(TOPIC, "reading-2");

    wait_until(|| relay.stats().skipped == 2).await;
    assert!(cloud.sent().is_empty());
    assert_eq!(relay.stats().forwarded, 0);
}

#[tokio::test]
async fn test_transmission_fault_dropped_and_forwarding_continues() {
    let (broker, cloud, relay) = started().await;
    cloud.fail_next_sends(1);

    for i in 0..3 {
        broker.deliver(TOPIC, format!("reading-{}", i));
    }

    wait_until(|| relay.stats().forwarded == 2).await;
    assert_eq!(relay.stats().failed, 1);

    let sent: Vec<_> = cloud.sent().into_iter().map(|m| m.into_payload()).collect();
    assert_eq!(sent, vec!["reading-1", "reading-2"]);
}

#[tokio::test]
async fn test_undecodable_payload_not_forwarded() {
    let (broker, cloud, relay) = started().await;

    broker.deliver(TOPIC, vec![0xff, 0xfe]);
    broker.deliver(TOPIC, "valid");

    wait_until(|| relay.stats().forwarded == 1).await;
    assert_eq!(relay.stats().received, 1);
    assert_eq!(cloud.sent().len(), 1);
}

#[tokio::test]
async fn test_self_test_with_broker_down_skips() {
    let (broker, _cloud, relay) = started().await;
    broker.report(StatusChange::disconnected(StatusReason::ConnectionLost));

    let report = relay.run_self_test(&burst(5)).await;
    assert_eq!(report.skipped, 5);
    assert_eq!(report.published, 0);
    assert!(broker.published().is_empty());
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_drains_queue_and_disconnects() {
    let (broker, cloud, relay) = started().await;

    for i in 0..10 {
        broker.deliver(TOPIC, format!("reading-{}", i));
    }
    wait_until(|| relay.stats().received == 10).await;

    relay.shutdown().await;

    assert_eq!(relay.stats().forwarded, 10);
    assert_eq!(cloud.sent().len(), 10);
    assert!(!broker.is_connected());
    assert!(!cloud.is_connected());
    assert!(broker.subscriptions().is_empty());
    assert_eq!(relay.broker().status(), ConnectionStatus::Disconnected);
    assert_eq!(relay.cloud().status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_shutdown_stops_self_test() {
    let (_broker, _cloud, relay) = started().await;
    let relay = Arc::new(relay);

    let generator = {
        let relay = relay.clone();
        tokio::spawn(async move {
            relay
                .run_self_test(&SelfTestConfig {
                    enabled: true,
                    count: 1000,
                    interval: Duration::from_millis(20),
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    relay.shutdown().await;

    let report = tokio::time::timeout(Duration::from_secs(1), generator)
        .await
        .unwrap()
        .unwrap();
    assert!(report.published + report.skipped < 1000);
}

#[tokio::test]
async fn test_shutdown_without_start() {
    let (_broker, _cloud, relay) = relay();
    relay.shutdown().await;
    assert_eq!(relay.stats(), StatsSnapshot::default());
}
