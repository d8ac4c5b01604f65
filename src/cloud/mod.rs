//! Cloud ingestion transport
//!
//! Device-to-cloud telemetry over the hub's MQTT surface: TLS on 8883,
//! SAS-token authentication derived from a device connection string, and
//! message metadata carried in the event topic's property bag.

mod connection_string;
mod iothub;
mod sas;

#[cfg(test)]
mod tests;

pub use connection_string::{ConnectionString, ConnectionStringError};
pub use iothub::{events_topic, CloudError, IotHubTransport, API_VERSION};
pub use sas::{expiry_after, sas_token};
