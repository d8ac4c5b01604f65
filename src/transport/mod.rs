//! Transport Layer
//!
//! Contracts between the endpoints and the wire. A transport owns one
//! network session, reports status transitions through a
//! [`StatusNotifier`] and never decides retry policy on its own.

mod mqtt;
mod status;
mod tls;

#[cfg(test)]
pub(crate) mod fake;

pub use mqtt::{MqttOptions, MqttTransport};
pub use status::{ConnectionState, ConnectionStatus, StatusChange, StatusNotifier, StatusReason};
pub use tls::{client_connector, TlsError};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::message::Message;
use crate::protocol::{DecodeError, EncodeError, ProtocolError, QoS};

/// An inbound publication as delivered by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: Bytes,
}

/// Destination for inbound publications of one subscription
pub type PublicationSink = mpsc::UnboundedSender<Publication>;

/// Error type for transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("operation timed out")]
    Timeout,
    #[error("not connected")]
    NotConnected,
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session closed")]
    Closed,
    #[error("no free packet identifier")]
    PacketIdsExhausted,
}

impl From<DecodeError> for TransportError {
    fn from(e: DecodeError) -> Self {
        TransportError::Protocol(e.into())
    }
}

impl From<EncodeError> for TransportError {
    fn from(e: EncodeError) -> Self {
        TransportError::Protocol(e.into())
    }
}

/// Connection to the local publish/subscribe broker
#[async_trait]
pub trait BrokerTransport: Send + Sync + 'static {
    /// Open the session, returning once it is usable or has failed
    async fn connect(&self, notifier: StatusNotifier) -> Result<(), TransportError>;

    /// Close the session; `Ok` when there is none
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Register `filter` and route matching publications into `sink`
    async fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        sink: PublicationSink,
    ) -> Result<(), TransportError>;

    async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError>;

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), TransportError>;
}

/// Connection to the cloud ingestion service
#[async_trait]
pub trait CloudTransport: Send + Sync + 'static {
    async fn connect(&self, notifier: StatusNotifier) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Transmit one device-to-cloud message and wait for acknowledgement
    async fn send(&self, message: Message) -> Result<(), TransportError>;
}
