//! Broker Configuration
//!
//! Connection settings for the local broker endpoint.

use std::time::Duration;

use serde::Deserialize;

use crate::message::PayloadFormat;
use crate::protocol::QoS;
use crate::transport::MqttOptions;

/// Configuration for the local broker connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host name or IP address
    pub address: String,

    pub port: u16,

    /// Topic subscribed to and published on
    pub default_topic: String,

    pub client_id: String,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Keep-alive interval in seconds (0 disables)
    pub keep_alive: u16,

    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Bound on subscribe/unsubscribe/publish acknowledgements
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Subscription and publish QoS (0 or 1)
    pub qos: u8,

    /// Validation applied to inbound payloads
    pub payload_format: PayloadFormat,
}

pub(crate) fn default_client_id() -> String {
    format!("telemetry-relay-{}", std::process::id())
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 1883,
            default_topic: String::new(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive: 60,
            connect_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(10),
            qos: 0,
            payload_format: PayloadFormat::Text,
        }
    }
}

impl BrokerConfig {
    pub fn qos(&self) -> QoS {
        QoS::from_u8(self.qos)
            .unwrap_or(QoS::AtMostOnce)
            .min(QoS::AtLeastOnce)
    }

    /// Client options for the broker session
    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.address, self.port, &self.client_id);
        options.username = self.username.clone();
        options.password = self.password.clone().map(Into::into);
        options.keep_alive = Duration::from_secs(self.keep_alive as u64);
        options.connect_timeout = self.connect_timeout;
        options.operation_timeout = self.operation_timeout;
        options
    }
}
