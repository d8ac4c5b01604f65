//! In-process MQTT v3.1.1 broker for integration tests
//!
//! Speaks just enough of the protocol for the relay's client: CONNECT with an
//! optional forced refusal, SUBSCRIBE/UNSUBSCRIBE, QoS 0/1 PUBLISH routed to
//! matching subscribers at QoS 0, PINGREQ and DISCONNECT.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use telemetry_relay::codec::{Decoder, Encoder};
use telemetry_relay::protocol::{
    ConnAck, Connect, ConnectReturnCode, Packet, PubAck, Publish, QoS, SubAck,
    SubAckReturnCode, UnsubAck,
};
use telemetry_relay::topic::topic_matches_filter;

struct Subscriber {
    connection: usize,
    filter: String,
    outbound: mpsc::UnboundedSender<Packet>,
}

#[derive(Default)]
struct Shared {
    subscribers: Mutex<Vec<Subscriber>>,
    connects: Mutex<Vec<Connect>>,
    published: Mutex<Vec<Publish>>,
    refuse_with: Mutex<Option<ConnectReturnCode>>,
    /// Stops replying to PINGREQ when set
    mute_pings: Mutex<bool>,
}

/// Test broker listening on an ephemeral localhost port
pub struct TestBroker {
    addr: SocketAddr,
    shared: Arc<Shared>,
    /// Cancelled to drop every open connection
    kick: Arc<Mutex<CancellationToken>>,
    shutdown: CancellationToken,
}

impl TestBroker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test broker");
        let addr = listener.local_addr().expect("Failed to read local address");

        let broker = Self {
            addr,
            shared: Arc::new(Shared::default()),
            kick: Arc::new(Mutex::new(CancellationToken::new())),
            shutdown: CancellationToken::new(),
        };

        let shared = broker.shared.clone();
        let kick = broker.kick.clone();
        let shutdown = broker.shutdown.clone();
        tokio::spawn(async move {
            let mut next_id = 0usize;
            loop {
                let stream = tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(_) => break,
                    },
                    _ = shutdown.cancelled() => break,
                };
                next_id += 1;
                let kick = kick.lock().clone();
                tokio::spawn(serve(next_id, stream, shared.clone(), kick));
            }
        });

        broker
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Refuse every following CONNECT with `code`
    pub fn refuse_connections(&self, code: ConnectReturnCode) {
        *self.shared.refuse_with.lock() = Some(code);
    }

    pub fn mute_pings(&self) {
        *self.shared.mute_pings.lock() = true;
    }

    pub fn connects(&self) -> Vec<Connect> {
        self.shared.connects.lock().clone()
    }

    pub fn published(&self) -> Vec<Publish> {
        self.shared.published.lock().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.shared
            .subscribers
            .lock()
            .iter()
            .map(|s| s.filter.clone())
            .collect()
    }

    /// Close every open client connection without a DISCONNECT
    pub fn kick_all(&self) {
        let old = std::mem::replace(&mut *self.kick.lock(), CancellationToken::new());
        old.cancel();
    }

    /// Publish as if another client sent it
    pub fn inject(&self, topic: &str, payload: impl Into<bytes::Bytes>) {
        route(
            &self.shared,
            Publish {
                topic: topic.to_string(),
                payload: payload.into(),
                ..Default::default()
            },
        );
    }

    /// Poll until `condition` holds or two seconds pass
    pub async fn wait_until(&self, mut condition: impl FnMut(&Self) -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition(self) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.kick.lock().cancel();
    }
}

fn route(shared: &Shared, publish: Publish) {
    for subscriber in shared.subscribers.lock().iter() {
        if topic_matches_filter(&publish.topic, &subscriber.filter) {
            let _ = subscriber.outbound.send(Packet::Publish(Publish {
                dup: false,
                qos: QoS::AtMostOnce,
                retain: false,
                topic: publish.topic.clone(),
                packet_id: None,
                payload: publish.payload.clone(),
            }));
        }
    }
}

async fn serve(id: usize, stream: TcpStream, shared: Arc<Shared>, kick: CancellationToken) {
    let (mut reader, mut writer) = stream.into_split();
    let (outbound, mut queue) = mpsc::unbounded_channel::<Packet>();

    let writer_task = tokio::spawn(async move {
        let encoder = Encoder::new();
        let mut buf = BytesMut::new();
        while let Some(packet) = queue.recv().await {
            buf.clear();
            if encoder.encode(&packet, &mut buf).is_err() {
                break;
            }
            if writer.write_all(&buf).await.is_err() {
                break;
            }
        }
    });

    let decoder = Decoder::new();
    let mut buf = BytesMut::with_capacity(4096);

    'conn: loop {
        let read = tokio::select! {
            read = reader.read_buf(&mut buf) => read,
            _ = kick.cancelled() => break 'conn,
        };
        match read {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        loop {
            let (packet, consumed) = match decoder.decode(&buf) {
                Ok(Some(decoded)) => decoded,
                Ok(None) => break,
                Err(_) => break 'conn,
            };
            buf.advance(consumed);

            match packet {
                Packet::Connect(connect) => {
                    shared.connects.lock().push(*connect);
                    let refusal = *shared.refuse_with.lock();
                    let return_code = refusal.unwrap_or(ConnectReturnCode::Accepted);
                    let _ = outbound.send(Packet::ConnAck(ConnAck {
                        session_present: false,
                        return_code,
                    }));
                    if refusal.is_some() {
                        break 'conn;
                    }
                }
                Packet::Subscribe(subscribe) => {
                    let mut return_codes = Vec::new();
                    for subscription in subscribe.subscriptions {
                        shared.subscribers.lock().push(Subscriber {
                            connection: id,
                            filter: subscription.filter,
                            outbound: outbound.clone(),
                        });
                        return_codes.push(match subscription.qos {
                            QoS::AtMostOnce => SubAckReturnCode::GrantedQoS0,
                            _ => SubAckReturnCode::GrantedQoS1,
                        });
                    }
                    let _ = outbound.send(Packet::SubAck(SubAck {
                        packet_id: subscribe.packet_id,
                        return_codes,
                    }));
                }
                Packet::Unsubscribe(unsubscribe) => {
                    shared.subscribers.lock().retain(|s| {
                        s.connection != id || !unsubscribe.filters.contains(&s.filter)
                    });
                    let _ = outbound.send(Packet::UnsubAck(UnsubAck {
                        packet_id: unsubscribe.packet_id,
                    }));
                }
                Packet::Publish(publish) => {
                    if let Some(packet_id) = publish.packet_id {
                        let _ = outbound.send(Packet::PubAck(PubAck { packet_id }));
                    }
                    shared.published.lock().push(publish.clone());
                    route(&shared, publish);
                }
                Packet::PingReq => {
                    if !*shared.mute_pings.lock() {
                        let _ = outbound.send(Packet::PingResp);
                    }
                }
                Packet::Disconnect => break 'conn,
                _ => {}
            }
        }
    }

    shared.subscribers.lock().retain(|s| s.connection != id);
    drop(outbound);
    // Let queued replies (e.g. a refusing CONNACK) reach the client
    let _ = tokio::time::timeout(Duration::from_millis(200), writer_task).await;
}
