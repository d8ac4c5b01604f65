//! Shared access signature tokens

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;

use super::ConnectionStringError;

/// Everything but unreserved URI characters gets escaped
pub(crate) const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Sign `resource` until `expiry` (Unix seconds)
pub fn sas_token(resource: &str, key: &[u8], expiry: u64) -> Result<String, ConnectionStringError> {
    let resource = utf8_percent_encode(resource, URI_COMPONENT).to_string();

    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).map_err(|_| ConnectionStringError::InvalidKey)?;
    mac.update(format!("{}\n{}", resource, expiry).as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Ok(format!(
        "SharedAccessSignature sr={}&sig={}&se={}",
        resource,
        utf8_percent_encode(&signature, URI_COMPONENT),
        expiry
    ))
}

/// Unix expiry `ttl` from now
pub fn expiry_after(ttl: Duration) -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .saturating_add(ttl)
        .as_secs()
}
