//! Cloud endpoint

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{connect_cancellable, disconnect_cancellable, Delivery, EndpointError};
use crate::message::Message;
use crate::transport::{CloudTransport, ConnectionState, ConnectionStatus, TransportError};

/// Connection to the cloud ingestion service
pub struct CloudEndpoint<T> {
    transport: Arc<T>,
    state: ConnectionState,
}

impl<T: CloudTransport> CloudEndpoint<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            state: ConnectionState::new("cloud"),
        }
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

    pub async fn connect(&self, cancel: &CancellationToken) -> Result<(), EndpointError> {
        info!("Connecting to cloud endpoint");
        connect_cancellable(
            &self.state,
            cancel,
            self.transport.connect(self.state.notifier()),
            || self.transport.disconnect(),
        )
        .await
    }

    pub async fn disconnect(&self, cancel: &CancellationToken) -> Result<(), EndpointError> {
        disconnect_cancellable(&self.state, cancel, self.transport.disconnect()).await
    }

    /// Send `payload` as a JSON/UTF-8 message with a fresh id.
    ///
    /// Not being connected is not an error: the payload is dropped with a
    /// warning and [`Delivery::Skipped`] is returned.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<Delivery, EndpointError> {
        if !self.state.is_connected() {
            warn!("Cloud endpoint not connected, message not sent");
            return Ok(Delivery::Skipped);
        }

        let message = Message::json(payload);
        let id = message.message_id().unwrap_or_default().to_string();
        let len = message.payload().len();

        match self.transport.send(message).await {
            Ok(()) => {
                debug!("Sent message {} ({} bytes) to cloud", id, len);
                Ok(Delivery::Sent)
            }
            Err(TransportError::NotConnected) => {
                warn!("Cloud connection dropped, message {} not sent", id);
                Ok(Delivery::Skipped)
            }
            Err(e) => {
                warn!("Failed to send message {} to cloud: {}", id, e);
                Err(EndpointError::Transmission(e))
            }
        }
    }
}
