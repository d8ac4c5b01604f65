//! Broker endpoint
//!
//! Owns the connection to the local broker and its single subscription on
//! the default topic.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{connect_cancellable, disconnect_cancellable, Delivery, EndpointError};
use crate::message::{Message, PayloadFormat};
use crate::protocol::QoS;
use crate::transport::{
    BrokerTransport, ConnectionState, ConnectionStatus, Publication, TransportError,
};

/// The one active subscription of a broker endpoint
struct ActiveSubscription {
    filter: String,
    dispatcher: JoinHandle<()>,
}

/// Forget a subscription whose session ended underneath it
fn prune_ended(slot: &mut Option<ActiveSubscription>) {
    if slot.as_ref().is_some_and(|active| active.dispatcher.is_finished()) {
        if let Some(ended) = slot.take() {
            debug!("Subscription to '{}' ended with its session", ended.filter);
        }
    }
}

/// Connection to the local publish/subscribe broker
pub struct BrokerEndpoint<T> {
    transport: Arc<T>,
    topic: String,
    qos: QoS,
    payload_format: PayloadFormat,
    state: ConnectionState,
    subscription: Mutex<Option<ActiveSubscription>>,
}

impl<T: BrokerTransport> BrokerEndpoint<T> {
    /// Endpoint bound to `topic` for both subscribe and publish
    pub fn new(transport: Arc<T>, topic: impl Into<String>) -> Self {
        Self {
            transport,
            topic: topic.into(),
            qos: QoS::AtMostOnce,
            payload_format: PayloadFormat::default(),
            state: ConnectionState::new("broker"),
            subscription: Mutex::new(None),
        }
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.payload_format = format;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub async fn is_subscribed(&self) -> bool {
        let mut slot = self.subscription.lock().await;
        prune_ended(&mut slot);
        slot.is_some()
    }

    /// Open the broker connection; no-op when already connected
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<(), EndpointError> {
        info!("Connecting to broker (topic '{}')", self.topic);
        connect_cancellable(
            &self.state,
            cancel,
            self.transport.connect(self.state.notifier()),
            || self.transport.disconnect(),
        )
        .await
    }

    /// Close the broker connection; no-op when already disconnected
    pub async fn disconnect(&self, cancel: &CancellationToken) -> Result<(), EndpointError> {
        if let Some(active) = self.subscription.lock().await.take() {
            active.dispatcher.abort();
        }
        disconnect_cancellable(&self.state, cancel, self.transport.disconnect()).await
    }

    /// Subscribe to the default topic, calling `handler` once per inbound
    /// message in delivery order
    pub async fn subscribe<F>(
        &self,
        handler: F,
        cancel: &CancellationToken,
    ) -> Result<(), EndpointError>
    where
        F: FnMut(Message) + Send + 'static,
    {
        let mut slot = self.subscription.lock().await;
        prune_ended(&mut slot);
        if let Some(active) = slot.as_ref() {
            warn!("Already subscribed to '{}'", active.filter);
            return Err(EndpointError::AlreadySubscribed(active.filter.clone()));
        }
        if !self.state.is_connected() {
            return Err(EndpointError::NotConnected);
        }

        let (sink, inbound) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch(inbound, self.payload_format, handler));

        let result = tokio::select! {
            result = self.transport.subscribe(&self.topic, self.qos, sink) => {
                result.map_err(EndpointError::Subscription)
            }
            _ = cancel.cancelled() => Err(EndpointError::Cancelled),
        };

        match result {
            Ok(()) => {
                info!("Subscribed to '{}' (qos={})", self.topic, self.qos);
                *slot = Some(ActiveSubscription {
                    filter: self.topic.clone(),
                    dispatcher,
                });
                Ok(())
            }
            Err(e) => {
                dispatcher.abort();
                if matches!(e, EndpointError::Cancelled) {
                    let _ = self.transport.unsubscribe(&self.topic).await;
                }
                warn!("Subscribe to '{}' failed: {}", self.topic, e);
                Err(e)
            }
        }
    }

    /// Remove the subscription; no-op when not subscribed
    pub async fn unsubscribe(&self, cancel: &CancellationToken) -> Result<(), EndpointError> {
        let Some(active) = self.subscription.lock().await.take() else {
            debug!("Not subscribed, nothing to remove");
            return Ok(());
        };
        active.dispatcher.abort();

        if !self.state.is_connected() {
            return Ok(());
        }

        tokio::select! {
            result = self.transport.unsubscribe(&active.filter) => {
                result.map_err(EndpointError::Subscription)?;
                info!("Unsubscribed from '{}'", active.filter);
                Ok(())
            }
            _ = cancel.cancelled() => Err(EndpointError::Cancelled),
        }
    }

    /// Publish `payload` on the default topic
    pub async fn publish(&self, payload: impl Into<Bytes>) -> Result<Delivery, EndpointError> {
        let payload = payload.into();
        if !self.state.is_connected() {
            warn!("Broker not connected, dropping publish to '{}'", self.topic);
            return Ok(Delivery::Skipped);
        }

        let len = payload.len();
        match self.transport.publish(&self.topic, payload, self.qos).await {
            Ok(()) => {
                debug!("Published {} bytes to '{}'", len, self.topic);
                Ok(Delivery::Sent)
            }
            Err(TransportError::NotConnected) => {
                warn!("Broker connection dropped, publish to '{}' skipped", self.topic);
                Ok(Delivery::Skipped)
            }
            Err(e) => Err(EndpointError::Transmission(e)),
        }
    }
}

/// Validate inbound publications and hand them to the handler one by one
async fn dispatch<F>(
    mut inbound: mpsc::UnboundedReceiver<Publication>,
    format: PayloadFormat,
    mut handler: F,
) where
    F: FnMut(Message) + Send + 'static,
{
    while let Some(publication) = inbound.recv().await {
        match format.validate(&publication.payload) {
            Ok(()) => {
                debug!(
                    "Received {} bytes on '{}'",
                    publication.payload.len(),
                    publication.topic
                );
                handler(Message::new(publication.payload));
            }
            Err(e) => warn!(
                "Dropping undecodable message on '{}': {}",
                publication.topic, e
            ),
        }
    }
}
