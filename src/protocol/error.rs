//! Protocol error types

use thiserror::Error;

/// Errors that can occur during packet decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("insufficient data in buffer")]
    InsufficientData,
    #[error("invalid packet type: {0}")]
    InvalidPacketType(u8),
    #[error("invalid remaining length encoding")]
    InvalidRemainingLength,
    #[error("invalid protocol name")]
    InvalidProtocolName,
    #[error("invalid protocol version: {0}")]
    InvalidProtocolVersion(u8),
    #[error("invalid QoS value: {0}")]
    InvalidQoS(u8),
    #[error("invalid UTF-8 string")]
    InvalidUtf8,
    #[error("invalid packet flags")]
    InvalidFlags,
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),
    #[error("packet too large")]
    PacketTooLarge,
    #[error("invalid return code: {0}")]
    InvalidReturnCode(u8),
}

/// Errors that can occur during packet encoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("packet too large")]
    PacketTooLarge,
    #[error("string too long")]
    StringTooLong,
    #[error("password requires a user name")]
    PasswordWithoutUsername,
    #[error("packet identifier required for QoS > 0")]
    MissingPacketId,
}

/// High-level protocol errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
}
