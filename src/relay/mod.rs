//! Relay
//!
//! Connects the broker and cloud endpoints and forwards every message
//! received on the default topic to the cloud, byte for byte.
//!
//! Inbound messages are queued by the subscription handler and drained by a
//! single forwarder task, so the broker delivery path never waits on the
//! cloud and messages reach the cloud in the order the broker delivered them.


#[cfg(test)]
mod tests;

pub use self_test::SelfTestReport;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::endpoint::{BrokerEndpoint, CloudEndpoint, Delivery, EndpointError};
use crate::message::Message;
use crate::transport::{BrokerTransport, CloudTransport};

/// Upper bound on waiting for queued messages at shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for relay startup
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("broker connect failed: {0}")]
    BrokerConnect(#[source] EndpointError),
    #[error("cloud connect failed: {0}")]
    CloudConnect(#[source] EndpointError),
    #[error("subscribe failed: {0}")]
    Subscribe(#[source] EndpointError),
    #[error("relay already started")]
    AlreadyStarted,
}

/// Message counters of a relay
#[derive(Debug, Default)]
pub struct RelayStats {
    received: AtomicU64,
    forwarded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl RelayStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Messages handed over by the broker subscription
    pub received: u64,
    /// Messages accepted by the cloud
    pub forwarded: u64,
    /// Messages dropped because the cloud was not connected
    pub skipped: u64,
    /// Messages dropped after a transmission fault
    pub failed: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} forwarded={} skipped={} failed={}",
            self.received, self.forwarded, self.skipped, self.failed
        )
    }
}

/// Broker to cloud relay
pub struct Relay<B, C> {
    broker: Arc<BrokerEndpoint<B>>,
    cloud: Arc<CloudEndpoint<C>>,
    stats: Arc<RelayStats>,
    /// Stops the self-test generator
    stop: CancellationToken,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl<B: BrokerTransport, C: CloudTransport> Relay<B, C> {
    pub fn new(broker: BrokerEndpoint<B>, cloud: CloudEndpoint<C>) -> Self {
        Self {
            broker: Arc::new(broker),
            cloud: Arc::new(cloud),
            stats: Arc::new(RelayStats::default()),
            stop: CancellationToken::new(),
            forwarder: Mutex::new(None),
        }
    }

    pub fn broker(&self) -> &BrokerEndpoint<B> {
        &self.broker
    }

    pub fn cloud(&self) -> &CloudEndpoint<C> {
        &self.cloud
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Connect broker, connect cloud, then subscribe the forwarding handler.
    ///
    /// A failure at any step disconnects whatever was already connected.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<(), RelayError> {
        if self.forwarder.lock().is_some() {
            return Err(RelayError::AlreadyStarted);
        }

        self.broker
            .connect(cancel)
            .await
            .map_err(RelayError::BrokerConnect)?;

        if let Err(e) = self.cloud.connect(cancel).await {
            self.disconnect_broker().await;
            return Err(RelayError::CloudConnect(e));
        }

        let (queue, pending) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward(pending, self.cloud.clone(), self.stats.clone()));

        let stats = self.stats.clone();
        let handler = move |message: Message| {
            stats.received.fetch_add(1, Ordering::Relaxed);
            if queue.send(message).is_err() {
                warn!("Forwarder stopped, dropping inbound message");
            }
        };

        if let Err(e) = self.broker.subscribe(handler, cancel).await {
            forwarder.abort();
            self.disconnect_broker().await;
            self.disconnect_cloud().await;
            return Err(RelayError::Subscribe(e));
        }

        *self.forwarder.lock() = Some(forwarder);
        info!("Relay started: '{}' -> cloud", self.broker.topic());
        Ok(())
    }

    /// Stop the self-test, unsubscribe, drain the queue and disconnect both
    /// endpoints
    pub async fn shutdown(&self) {
        self.stop.cancel();

        let cancel = CancellationToken::new();
        if let Err(e) = self.broker.unsubscribe(&cancel).await {
            warn!("Unsubscribe during shutdown failed: {}", e);
        }
        self.disconnect_broker().await;

        // The queue closes once the subscription handler is gone
        let forwarder = self.forwarder.lock().take();
        if let Some(mut handle) = forwarder {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
                warn!("Forwarder did not drain within {:?}, aborting", DRAIN_TIMEOUT);
                handle.abort();
            }
        }

        self.disconnect_cloud().await;
        info!("Relay stopped ({})", self.stats.snapshot());
    }

    async fn disconnect_broker(&self) {
        if let Err(e) = self.broker.disconnect(&CancellationToken::new()).await {
            warn!("Broker disconnect failed: {}", e);
        }
    }

    async fn disconnect_cloud(&self) {
        if let Err(e) = self.cloud.disconnect(&CancellationToken::new()).await {
            warn!("Cloud disconnect failed: {}", e);
        }
    }
}

/// Send queued messages to the cloud one at a time until the queue closes
async fn forward<C: CloudTransport>(
    mut pending: mpsc::UnboundedReceiver<Message>,
    cloud: Arc<CloudEndpoint<C>>,
    stats: Arc<RelayStats>,
) {
    while let Some(message) = pending.recv().await {
        match cloud.send(message.into_payload()).await {
            Ok(Delivery::Sent) => {
                stats.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Delivery::Skipped) => {
                stats.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!("Dropping message after transmission fault: {}", e);
                stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    debug!("Forwarder stopped");
}
