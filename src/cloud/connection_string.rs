//! Device connection strings
//!
//! `HostName=<hub>;DeviceId=<device>;SharedAccessKey=<base64>` with optional
//! `ModuleId` and `GatewayHostName` segments, as issued by the hub.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Error type for connection string parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionStringError {
    #[error("connection string is missing {0}")]
    Missing(&'static str),
    #[error("malformed connection string segment '{0}'")]
    Malformed(String),
    #[error("SharedAccessKey is not valid base64")]
    InvalidKey,
}

/// Parsed device connection string
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub host_name: String,
    pub device_id: String,
    pub module_id: Option<String>,
    pub gateway_host_name: Option<String>,
    key: Vec<u8>,
}

impl ConnectionString {
    /// Decoded shared access key
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// MQTT client identifier: `<device>` or `<device>/<module>`
    pub fn client_id(&self) -> String {
        match &self.module_id {
            Some(module) => format!("{}/{}", self.device_id, module),
            None => self.device_id.clone(),
        }
    }

    /// Resource the SAS token is scoped to
    pub fn resource_uri(&self) -> String {
        match &self.module_id {
            Some(module) => format!(
                "{}/devices/{}/modules/{}",
                self.host_name, self.device_id, module
            ),
            None => format!("{}/devices/{}", self.host_name, self.device_id),
        }
    }

    /// Host the TLS connection goes to
    pub fn connect_host(&self) -> &str {
        self.gateway_host_name.as_deref().unwrap_or(&self.host_name)
    }
}

impl FromStr for ConnectionString {
    type Err = ConnectionStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut host_name = None;
        let mut device_id = None;
        let mut key = None;
        let mut module_id = None;
        let mut gateway_host_name = None;

        for segment in s.split(';').map(str::trim).filter(|seg| !seg.is_empty()) {
            // Base64 keys end in '=' so only the first one separates
            let (name, value) = segment
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::Malformed(segment.to_string()))?;
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match name.trim() {
                "HostName" => host_name = Some(value.to_string()),
                "DeviceId" => device_id = Some(value.to_string()),
                "SharedAccessKey" => key = Some(value),
                "ModuleId" => module_id = Some(value.to_string()),
                "GatewayHostName" => gateway_host_name = Some(value.to_string()),
                _ => {}
            }
        }

        let key = key.ok_or(ConnectionStringError::Missing("SharedAccessKey"))?;
        Ok(Self {
            host_name: host_name.ok_or(ConnectionStringError::Missing("HostName"))?,
            device_id: device_id.ok_or(ConnectionStringError::Missing("DeviceId"))?,
            module_id,
            gateway_host_name,
            key: STANDARD
                .decode(key)
                .map_err(|_| ConnectionStringError::InvalidKey)?,
        })
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("host_name", &self.host_name)
            .field("device_id", &self.device_id)
            .field("module_id", &self.module_id)
            .field("gateway_host_name", &self.gateway_host_name)
            .finish_non_exhaustive()
    }
}
