//! Relayed message model
//!
//! A [`Message`] is built once and never mutated. The broker side produces
//! one per inbound publication after the payload passes [`PayloadFormat`]
//! validation, the cloud side stamps id and content metadata before sending.

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// Content type attached to cloud-bound messages
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content encoding attached to cloud-bound messages
pub const CONTENT_ENCODING_UTF8: &str = "utf-8";

/// An opaque payload plus delivery metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: Bytes,
    message_id: Option<String>,
    content_type: Option<String>,
    content_encoding: Option<String>,
}

impl Message {
    /// Message carrying only a payload
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            message_id: None,
            content_type: None,
            content_encoding: None,
        }
    }

    /// Cloud-bound message with a fresh id and JSON/UTF-8 metadata
    pub fn json(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            message_id: Some(Uuid::new_v4().to_string()),
            content_type: Some(CONTENT_TYPE_JSON.to_string()),
            content_encoding: Some(CONTENT_ENCODING_UTF8.to_string()),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    /// Take the payload, consuming the message
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Inbound payload validation applied before a message reaches the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Any valid UTF-8
    #[default]
    Text,
    /// UTF-8 holding a single well-formed JSON value
    Json,
}

impl PayloadFormat {
    /// Validate an inbound payload; the bytes themselves are never altered
    pub fn validate(&self, payload: &[u8]) -> Result<(), PayloadError> {
        let text = std::str::from_utf8(payload)?;
        if *self == PayloadFormat::Json {
            serde_json::from_str::<serde::de::IgnoredAny>(text)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadFormat::Text => write!(f, "text"),
            PayloadFormat::Json => write!(f, "json"),
        }
    }
}

/// Inbound payload rejected by [`PayloadFormat::validate`]
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
