//! Connection status tracking
//!
//! Every endpoint owns exactly one [`ConnectionState`]. The transport reports
//! transitions through the cloneable [`StatusNotifier`]; that handler is the
//! only writer of the cell, everybody else reads a snapshot.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Connection status of one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Unrecoverable fault; only an explicit reconnect leaves this state
    Disabled,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disabled => write!(f, "disabled"),
        }
    }
}

/// Why the status last changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusReason {
    ConnectionOk,
    ClientClose,
    ConnectionLost,
    CommunicationError,
    BadCredential,
    ExpiredToken,
    Cancelled,
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusReason::ConnectionOk => "connection ok",
            StatusReason::ClientClose => "closed by client",
            StatusReason::ConnectionLost => "connection lost",
            StatusReason::CommunicationError => "communication error",
            StatusReason::BadCredential => "bad credential",
            StatusReason::ExpiredToken => "expired token",
            StatusReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A status transition as reported by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub status: ConnectionStatus,
    pub reason: StatusReason,
}

impl StatusChange {
    pub const fn new(status: ConnectionStatus, reason: StatusReason) -> Self {
        Self { status, reason }
    }

    pub const fn connecting() -> Self {
        Self::new(ConnectionStatus::Connecting, StatusReason::ConnectionOk)
    }

    pub const fn connected() -> Self {
        Self::new(ConnectionStatus::Connected, StatusReason::ConnectionOk)
    }

    pub const fn disconnected(reason: StatusReason) -> Self {
        Self::new(ConnectionStatus::Disconnected, reason)
    }

    pub const fn disabled(reason: StatusReason) -> Self {
        Self::new(ConnectionStatus::Disabled, reason)
    }
}

/// Status-change handler handed to a transport on connect
#[derive(Clone)]
pub struct StatusNotifier {
    endpoint: Arc<str>,
    tx: Arc<watch::Sender<StatusChange>>,
}

impl StatusNotifier {
    /// Record a transition and log it
    pub fn notify(&self, change: StatusChange) {
        let previous = self.tx.send_replace(change);
        if previous == change {
            return;
        }

        match change.status {
            ConnectionStatus::Connected | ConnectionStatus::Disconnected => info!(
                "{}: {} -> {} ({})",
                self.endpoint, previous.status, change.status, change.reason
            ),
            ConnectionStatus::Disabled => warn!(
                "{}: connection disabled ({})",
                self.endpoint, change.reason
            ),
            ConnectionStatus::Connecting => {
                debug!("{}: {} -> connecting", self.endpoint, previous.status)
            }
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Debug for StatusNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusNotifier")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Single-writer connection status cell
#[derive(Debug)]
pub struct ConnectionState {
    notifier: StatusNotifier,
    rx: watch::Receiver<StatusChange>,
}

impl ConnectionState {
    /// Fresh state, `Disconnected` until a transport says otherwise
    pub fn new(endpoint: &str) -> Self {
        let (tx, rx) = watch::channel(StatusChange::disconnected(StatusReason::ClientClose));
        Self {
            notifier: StatusNotifier {
                endpoint: endpoint.into(),
                tx: Arc::new(tx),
            },
            rx,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.rx.borrow().status
    }

    pub fn last_change(&self) -> StatusChange {
        *self.rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Handler to pass to the transport
    pub fn notifier(&self) -> StatusNotifier {
        self.notifier.clone()
    }

    /// Observe future transitions
    pub fn watch(&self) -> watch::Receiver<StatusChange> {
        self.rx.clone()
    }
}
