//! Endpoint error types

use thiserror::Error;

use crate::transport::TransportError;

/// Error type for endpoint operations
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Transport could not open or close the connection
    #[error("connection error: {0}")]
    Connection(#[source] TransportError),
    /// Lifecycle operation cancelled; the endpoint is left not connected or not subscribed
    #[error("operation cancelled")]
    Cancelled,
    #[error("already subscribed to '{0}'")]
    AlreadySubscribed(String),
    #[error("not connected")]
    NotConnected,
    #[error("subscription failed: {0}")]
    Subscription(#[source] TransportError),
    /// Failure after the connectivity check passed
    #[error("transmission failed: {0}")]
    Transmission(#[source] TransportError),
}
