//! MQTT v3.1.1 return codes (CONNACK and SUBACK)

use std::fmt;

/// CONNACK return code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ConnectReturnCode {
    /// Connection accepted
    #[default]
    Accepted = 0x00,
    /// The server does not support the requested protocol level
    UnacceptableProtocolVersion = 0x01,
    /// The client identifier is not allowed by the server
    IdentifierRejected = 0x02,
    /// The MQTT service is unavailable
    ServerUnavailable = 0x03,
    /// Malformed user name or password
    BadUserNameOrPassword = 0x04,
    /// The client is not authorized to connect
    NotAuthorized = 0x05,
}

impl ConnectReturnCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(ConnectReturnCode::Accepted),
            0x01 => Some(ConnectReturnCode::UnacceptableProtocolVersion),
            0x02 => Some(ConnectReturnCode::IdentifierRejected),
            0x03 => Some(ConnectReturnCode::ServerUnavailable),
            0x04 => Some(ConnectReturnCode::BadUserNameOrPassword),
            0x05 => Some(ConnectReturnCode::NotAuthorized),
            _ => None,
        }
    }

    #[inline]
    pub fn is_accepted(self) -> bool {
        self == ConnectReturnCode::Accepted
    }

    /// Refusals caused by the credentials rather than the server state
    pub fn is_credential_failure(self) -> bool {
        matches!(
            self,
            ConnectReturnCode::BadUserNameOrPassword | ConnectReturnCode::NotAuthorized
        )
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectReturnCode::Accepted => write!(f, "Connection accepted"),
            ConnectReturnCode::UnacceptableProtocolVersion => {
                write!(f, "Unacceptable protocol version")
            }
            ConnectReturnCode::IdentifierRejected => write!(f, "Identifier rejected"),
            ConnectReturnCode::ServerUnavailable => write!(f, "Server unavailable"),
            ConnectReturnCode::BadUserNameOrPassword => write!(f, "Bad user name or password"),
            ConnectReturnCode::NotAuthorized => write!(f, "Not authorized"),
        }
    }
}

/// SUBACK return code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SubAckReturnCode {
    GrantedQoS0 = 0x00,
    GrantedQoS1 = 0x01,
    GrantedQoS2 = 0x02,
    Failure = 0x80,
}

impl SubAckReturnCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(SubAckReturnCode::GrantedQoS0),
            0x01 => Some(SubAckReturnCode::GrantedQoS1),
            0x02 => Some(SubAckReturnCode::GrantedQoS2),
            0x80 => Some(SubAckReturnCode::Failure),
            _ => None,
        }
    }

    #[inline]
    pub fn is_failure(self) -> bool {
        self == SubAckReturnCode::Failure
    }
}
