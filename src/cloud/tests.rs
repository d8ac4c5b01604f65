use bytes::Bytes;
use pretty_assertions::assert_eq;
use test_case::test_case;

use super::*;
use crate::message::Message;

const KEY_B64: &str = "c2VjcmV0LWtleS1mb3ItdGVzdHM=";

fn device_string() -> String {
    format!(
        "HostName=myhub.azure-devices.net;DeviceId=relay-01;SharedAccessKey={}",
        KEY_B64
    )
}

// ============================================================================
// Connection string
// ============================================================================

#[test]
fn test_parse_device_connection_string() {
    let cs: ConnectionString = device_string().parse().unwrap();

    assert_eq!(cs.host_name, "myhub.azure-devices.net");
    assert_eq!(cs.device_id, "relay-01");
    assert_eq!(cs.module_id, None);
    assert_eq!(cs.key(), b"secret-key-for-tests");
    assert_eq!(cs.client_id(), "relay-01");
    assert_eq!(cs.resource_uri(), "myhub.azure-devices.net/devices/relay-01");
    assert_eq!(cs.connect_host(), "myhub.azure-devices.net");
}

#[test]
fn test_parse_module_behind_gateway() {
    let cs: ConnectionString = format!(
        "{};ModuleId=forwarder;GatewayHostName=edge.local;",
        device_string()
    )
    .parse()
    .unwrap();

    assert_eq!(cs.client_id(), "relay-01/forwarder");
    assert_eq!(
        cs.resource_uri(),
        "myhub.azure-devices.net/devices/relay-01/modules/forwarder"
    );
    assert_eq!(cs.connect_host(), "edge.local");
}

#[test]
fn test_unknown_segments_ignored() {
    let cs: ConnectionString = format!("{};x509=false", device_string()).parse().unwrap();
    assert_eq!(cs.device_id, "relay-01");
}

#[test_case("DeviceId=d;SharedAccessKey=a2V5", ConnectionStringError::Missing("HostName") ; "no host")]
#[test_case("HostName=h;SharedAccessKey=a2V5", ConnectionStringError::Missing("DeviceId") ; "no device")]
#[test_case("HostName=h;DeviceId=d", ConnectionStringError::Missing("SharedAccessKey") ; "no key")]
#[test_case("HostName=h;DeviceId=d;SharedAccessKey=***", ConnectionStringError::InvalidKey ; "bad key")]
#[test_case("HostName=h;garbage", ConnectionStringError::Malformed("garbage".to_string()) ; "malformed")]
fn test_invalid_connection_strings(input: &str, expected: ConnectionStringError) {
    assert_eq!(input.parse::<ConnectionString>().unwrap_err(), expected);
}

#[test]
fn test_debug_hides_key() {
    let cs: ConnectionString = device_string().parse().unwrap();
    assert!(!format!("{:?}", cs).contains(KEY_B64));
}

// ============================================================================
// SAS token
// ============================================================================

#[test]
fn test_sas_token_signature() {
    let cs: ConnectionString = device_string().parse().unwrap();
    let token = sas_token(&cs.resource_uri(), cs.key(), 1_700_000_000).unwrap();

    assert_eq!(
        token,
        "SharedAccessSignature sr=myhub.azure-devices.net%2Fdevices%2Frelay-01\
         &sig=UjqUxT%2Foeb4PKvJH3wyY0%2F68hiuSgW7o9IBmPa5leUM%3D&se=1700000000"
    );
}

#[test]
fn test_expiry_is_in_the_future() {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let expiry = expiry_after(std::time::Duration::from_secs(3600));
    assert!(expiry >= now + 3599 && expiry <= now + 3601);
}

// ============================================================================
// Event topic
// ============================================================================

#[test]
fn test_events_topic_with_properties() {
    let cs: ConnectionString = device_string().parse().unwrap();
    let message = Message::json(Bytes::from_static(b"{}"));
    let id = message.message_id().unwrap().to_string();

    assert_eq!(
        events_topic(&cs, &message),
        format!(
            "devices/relay-01/messages/events/$.mid={}&$.ct=application%2Fjson&$.ce=utf-8",
            id
        )
    );
}

#[test]
fn test_events_topic_for_module_without_properties() {
    let cs: ConnectionString = format!("{};ModuleId=fwd", device_string()).parse().unwrap();
    let message = Message::new(Bytes::from_static(b"raw"));

    assert_eq!(
        events_topic(&cs, &message),
        "devices/relay-01/modules/fwd/messages/events/"
    );
}
