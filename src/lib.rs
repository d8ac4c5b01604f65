//! telemetry-relay - local MQTT broker to cloud telemetry relay
//!
//! Subscribes to one topic on a local MQTT v3.1.1 broker and forwards every
//! message to a cloud ingestion hub over MQTT/TLS, authenticated with a
//! shared-access-signature token.

pub mod cloud;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod message;
pub mod protocol;
pub mod relay;
pub mod topic;
pub mod transport;

pub use config::Config;
pub use endpoint::{BrokerEndpoint, CloudEndpoint, Delivery, EndpointError};
pub use message::Message;
pub use protocol::QoS;
pub use relay::{Relay, RelayError};
