//! IoT Hub device transport

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use percent_encoding::utf8_percent_encode;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sas::{expiry_after, sas_token, URI_COMPONENT};
use super::{ConnectionString, ConnectionStringError};
use crate::config::CloudConfig;
use crate::message::Message;
use crate::protocol::QoS;
use crate::transport::{
    client_connector, CloudTransport, MqttOptions, MqttTransport, StatusNotifier, TlsError,
    TransportError,
};

/// Protocol version announced in the MQTT user name
pub const API_VERSION: &str = "2021-04-12";

/// Share of the token lifetime after which the session is re-authenticated
const RENEW_AFTER: f64 = 0.85;

/// Error type for building the cloud transport
#[derive(Debug, Error)]
pub enum CloudError {
    #[error(transparent)]
    ConnectionString(#[from] ConnectionStringError),
    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Device-to-cloud event topic for `message`
pub fn events_topic(connection: &ConnectionString, message: &Message) -> String {
    let mut topic = match &connection.module_id {
        Some(module) => format!(
            "devices/{}/modules/{}/messages/events/",
            connection.device_id, module
        ),
        None => format!("devices/{}/messages/events/", connection.device_id),
    };

    let properties = [
        ("$.mid", message.message_id()),
        ("$.ct", message.content_type()),
        ("$.ce", message.content_encoding()),
    ];
    let mut first = true;
    for (name, value) in properties {
        let Some(value) = value else { continue };
        if !first {
            topic.push('&');
        }
        first = false;
        topic.push_str(name);
        topic.push('=');
        topic.extend(utf8_percent_encode(value, URI_COMPONENT));
    }

    topic
}

/// Device identity and its MQTT session
struct Device {
    connection: ConnectionString,
    sas_ttl: Duration,
    mqtt: MqttTransport,
    /// Serializes connect, renewal and disconnect
    lifecycle: tokio::sync::Mutex<()>,
}

impl Device {
    /// Mint a fresh SAS token for the next CONNECT
    fn authorize(&self) -> Result<(), TransportError> {
        let token = sas_token(
            &self.connection.resource_uri(),
            self.connection.key(),
            expiry_after(self.sas_ttl),
        )
        .map_err(|e| TransportError::Rejected(e.to_string()))?;
        self.mqtt
            .set_password(Bytes::from(token), Some(Instant::now() + self.sas_ttl));
        Ok(())
    }
}

/// Cloud transport speaking MQTT to an IoT hub (or edge gateway)
///
/// The hub drops a session once its SAS token expires, so while connected
/// the transport reconnects with a fresh token before that happens.
pub struct IotHubTransport {
    device: Arc<Device>,
    renewal: Mutex<Option<CancellationToken>>,
}

impl IotHubTransport {
    pub fn new(config: &CloudConfig) -> Result<Self, CloudError> {
        let connection: ConnectionString = config.connection_string.parse()?;
        let tls = client_connector(config.ca_cert.as_deref())?;

        let client_id = connection.client_id();
        let mut options = MqttOptions::new(connection.connect_host(), config.port, &client_id);
        options.username = Some(format!(
            "{}/{}/?api-version={}",
            connection.host_name, client_id, API_VERSION
        ));
        options.keep_alive = Duration::from_secs(config.keep_alive as u64);
        options.connect_timeout = config.connect_timeout;
        options.operation_timeout = config.operation_timeout;
        options.tls = Some(tls);

        Ok(Self::with_options(connection, options, config.sas_ttl))
    }

    /// Transport over explicit MQTT options, e.g. a plain-TCP test broker
    pub fn with_options(
        connection: ConnectionString,
        options: MqttOptions,
        sas_ttl: Duration,
    ) -> Self {
        Self {
            device: Arc::new(Device {
                connection,
                sas_ttl,
                mqtt: MqttTransport::new(options),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
            renewal: Mutex::new(None),
        }
    }

    pub fn connection(&self) -> &ConnectionString {
        &self.device.connection
    }

    fn stop_renewal(&self) {
        if let Some(stop) = self.renewal.lock().take() {
            stop.cancel();
        }
    }
}

impl Drop for IotHubTransport {
    fn drop(&mut self) {
        self.stop_renewal();
    }
}

#[async_trait]
impl CloudTransport for IotHubTransport {
    async fn connect(&self, notifier: StatusNotifier) -> Result<(), TransportError> {
        let device = &self.device;
        let _lifecycle = device.lifecycle.lock().await;
        device.authorize()?;

        debug!(
            "Connecting device '{}' to {}:{}",
            device.connection.client_id(),
            device.connection.connect_host(),
            device.mqtt.options().port
        );
        device.mqtt.open(notifier.clone()).await?;

        let stop = CancellationToken::new();
        if let Some(previous) = self.renewal.lock().replace(stop.clone()) {
            previous.cancel();
        }
        tokio::spawn(renew_tokens(device.clone(), notifier, stop));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.stop_renewal();
        let _lifecycle = self.device.lifecycle.lock().await;
        self.device.mqtt.close().await
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        let topic = events_topic(&self.device.connection, &message);
        self.device
            .mqtt
            .publish_bytes(&topic, message.into_payload(), QoS::AtLeastOnce)
            .await
    }
}

/// Reconnect with a fresh token every `RENEW_AFTER` of the token lifetime
/// until stopped or the session ends on its own
async fn renew_tokens(device: Arc<Device>, notifier: StatusNotifier, stop: CancellationToken) {
    let period = device.sas_ttl.mul_f64(RENEW_AFTER);

    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(period) => {}
        }

        let _lifecycle = device.lifecycle.lock().await;
        if stop.is_cancelled() {
            return;
        }
        if !device.mqtt.is_open() {
            debug!("Cloud session ended, token renewal stopped");
            return;
        }

        if let Err(e) = device.authorize() {
            warn!("Failed to renew SAS token: {}", e);
            return;
        }
        info!(
            "Renewing SAS token for device '{}'",
            device.connection.client_id()
        );
        if let Err(e) = device.mqtt.reopen(notifier.clone()).await {
            warn!("Reconnect with renewed SAS token failed: {}", e);
            return;
        }
    }
}
