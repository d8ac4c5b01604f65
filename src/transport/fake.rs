//! In-memory transports for unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{
    BrokerTransport, CloudTransport, Publication, PublicationSink, StatusChange, StatusNotifier,
    StatusReason, TransportError,
};
use crate::message::Message;
use crate::protocol::QoS;
use crate::topic::topic_matches_filter;

/// Shared connect/disconnect behavior of both fakes
#[derive(Default)]
struct Link {
    notifier: Mutex<Option<StatusNotifier>>,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    hang_connect: AtomicBool,
    connects: AtomicUsize,
}

impl Link {
    async fn connect(&self, notifier: StatusNotifier) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        notifier.notify(StatusChange::connecting());
        *self.notifier.lock() = Some(notifier.clone());

        if self.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            notifier.notify(StatusChange::disconnected(StatusReason::ConnectionLost));
            return Err(TransportError::ConnectionLost("unreachable".to_string()));
        }

        self.connected.store(true, Ordering::SeqCst);
        notifier.notify(StatusChange::connected());
        Ok(())
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            if let Some(notifier) = self.notifier.lock().as_ref() {
                notifier.notify(StatusChange::disconnected(StatusReason::ClientClose));
            }
        }
    }

    /// Simulate a transport-initiated status change
    fn report(&self, change: StatusChange) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(notifier) = self.notifier.lock().as_ref() {
            notifier.notify(change);
        }
    }
}

/// Broker fake that loops publishes back to matching subscriptions
#[derive(Default)]
pub(crate) struct FakeBroker {
    link: Link,
    sinks: Mutex<Vec<(String, PublicationSink)>>,
    published: Mutex<Vec<Publication>>,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
}

impl FakeBroker {
    pub fn fail_connect(&self) {
        self.link.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn hang_connect(&self) {
        self.link.hang_connect.store(true, Ordering::SeqCst);
    }

    pub fn fail_publish(&self) {
        self.fail_publish.store(true, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self) {
        self.fail_subscribe.store(true, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.link.connects.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }

    pub fn report(&self, change: StatusChange) {
        self.link.report(change);
    }

    pub fn published(&self) -> Vec<Publication> {
        self.published.lock().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.sinks.lock().iter().map(|(f, _)| f.clone()).collect()
    }

    /// Push an inbound publication as if the broker delivered it
    pub fn deliver(&self, topic: &str, payload: impl Into<Bytes>) {
        let publication = Publication {
            topic: topic.to_string(),
            payload: payload.into(),
        };
        for (filter, sink) in self.sinks.lock().iter() {
            if topic_matches_filter(topic, filter) {
                let _ = sink.send(publication.clone());
            }
        }
    }
}

#[async_trait]
impl BrokerTransport for FakeBroker {
    async fn connect(&self, notifier: StatusNotifier) -> Result<(), TransportError> {
        self.link.connect(notifier).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.link.disconnect();
        self.sinks.lock().clear();
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: &str,
        _qos: QoS,
        sink: PublicationSink,
    ) -> Result<(), TransportError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("subscription refused".to_string()));
        }
        self.sinks.lock().push((filter.to_string(), sink));
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.sinks.lock().retain(|(f, _)| f != filter);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes, _qos: QoS) -> Result<(), TransportError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout);
        }
        self.published.lock().push(Publication {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        self.deliver(topic, payload);
        Ok(())
    }
}

/// Cloud fake recording every message it accepts
#[derive(Default)]
pub(crate) struct FakeCloud {
    link: Link,
    sent: Mutex<Vec<Message>>,
    fail_sends: AtomicUsize,
}

impl FakeCloud {
    pub fn fail_connect(&self) {
        self.link.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn hang_connect(&self) {
        self.link.hang_connect.store(true, Ordering::SeqCst);
    }

    /// Fail the next `count` sends
    pub fn fail_next_sends(&self, count: usize) {
        self.fail_sends.store(count, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }

    pub fn report(&self, change: StatusChange) {
        self.link.report(change);
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl CloudTransport for FakeCloud {
    async fn connect(&self, notifier: StatusNotifier) -> Result<(), TransportError> {
        self.link.connect(notifier).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.link.disconnect();
        Ok(())
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        let failing = self
            .fail_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Timeout);
        }
        self.sent.lock().push(message);
        Ok(())
    }
}
