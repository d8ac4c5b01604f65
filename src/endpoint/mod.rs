//! Broker and cloud endpoints
//!
//! Each endpoint owns one transport and the [`ConnectionState`] that
//! transport reports into. Lifecycle operations take a
//! [`CancellationToken`]; a cancelled operation always leaves the endpoint
//! not connected (or not subscribed).

mod broker;
mod cloud;
mod error;


pub use broker::BrokerEndpoint;
pub use cloud::CloudEndpoint;
pub use error::EndpointError;

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::transport::{ConnectionState, ConnectionStatus, StatusChange, StatusReason, TransportError};

/// Outcome of a publish or send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by the transport
    Sent,
    /// Dropped because the endpoint was not connected
    Skipped,
}

/// Drive a transport connect, closing it again if `cancel` fires first
async fn connect_cancellable<C, D>(
    state: &ConnectionState,
    cancel: &CancellationToken,
    connect: C,
    close: impl FnOnce() -> D,
) -> Result<(), EndpointError>
where
    C: Future<Output = Result<(), TransportError>>,
    D: Future<Output = Result<(), TransportError>>,
{
    if state.is_connected() {
        debug!("{}: Already connected", state.notifier().endpoint());
        return Ok(());
    }

    tokio::select! {
        result = connect => result.map_err(EndpointError::Connection),
        _ = cancel.cancelled() => {
            let _ = close().await;
            state
                .notifier()
                .notify(StatusChange::disconnected(StatusReason::Cancelled));
            Err(EndpointError::Cancelled)
        }
    }
}

/// Drive a transport disconnect; the state ends `Disconnected` either way
async fn disconnect_cancellable<D>(
    state: &ConnectionState,
    cancel: &CancellationToken,
    close: D,
) -> Result<(), EndpointError>
where
    D: Future<Output = Result<(), TransportError>>,
{
    if state.status() == ConnectionStatus::Disconnected {
        debug!("{}: Already disconnected", state.notifier().endpoint());
        // The transport may still hold background work for a dropped session
        return close.await.map_err(EndpointError::Connection);
    }

    let (result, reason) = tokio::select! {
        result = close => (result.map_err(EndpointError::Connection), StatusReason::ClientClose),
        _ = cancel.cancelled() => (Err(EndpointError::Cancelled), StatusReason::Cancelled),
    };

    if state.status() != ConnectionStatus::Disconnected {
        state.notifier().notify(StatusChange::disconnected(reason));
    }
    result
}
