//! Cloud Configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for the cloud ingestion connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Device connection string issued by the hub
    pub connection_string: String,

    pub port: u16,

    /// PEM file replacing the bundled root certificates
    pub ca_cert: Option<PathBuf>,

    /// Lifetime of each generated SAS token
    #[serde(with = "humantime_serde")]
    pub sas_ttl: Duration,

    /// Keep-alive interval in seconds
    pub keep_alive: u16,

    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            port: 8883,
            ca_cert: None,
            sas_ttl: Duration::from_secs(3600),
            keep_alive: 60,
            connect_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(10),
        }
    }
}
