//! MQTT v3.1.1 client transport
//!
//! One [`MqttTransport`] drives one client session over TCP or TLS. The
//! handshake runs inline in [`MqttTransport::open`]; afterwards a spawned
//! session task owns the socket and serves publish/subscribe commands
//! through a channel, matching acknowledgements by packet identifier.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Instant};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info, trace, warn};

use super::{
    BrokerTransport, Publication, PublicationSink, StatusChange, StatusNotifier, StatusReason,
    TlsError, TransportError,
};
use crate::codec::{Decoder, Encoder, DEFAULT_MAX_PACKET_SIZE};
use crate::protocol::{
    ConnAck, Connect, DecodeError, Packet, ProtocolError, PubAck, Publish, QoS, Subscribe,
    Subscription, Unsubscribe,
};
use crate::topic::topic_matches_filter;

/// Depth of the command queue feeding the session task
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Connection settings for one MQTT session
#[derive(Clone)]
pub struct MqttOptions {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<Bytes>,
    pub clean_session: bool,
    /// Zero disables keep-alive pings
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub max_packet_size: usize,
    /// Wrap the TCP stream in TLS when set
    pub tls: Option<TlsConnector>,
}

impl MqttOptions {
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            username: None,
            password: None,
            clean_session: true,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(10),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            tls: None,
        }
    }
}

impl std::fmt::Debug for MqttOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("keep_alive", &self.keep_alive)
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

type BoxedStream = Box<dyn Stream>;

/// Password currently presented on CONNECT
#[derive(Debug, Clone, Default)]
struct Credentials {
    password: Option<Bytes>,
    /// After this instant a dropped session is reported as an expired token
    expires_at: Option<Instant>,
}

/// Command sent to the session task
enum Command {
    Publish {
        topic: String,
        payload: Bytes,
        qos: QoS,
        ack: oneshot::Sender<Result<(), TransportError>>,
    },
    Subscribe {
        filter: String,
        qos: QoS,
        sink: PublicationSink,
        ack: oneshot::Sender<Result<(), TransportError>>,
    },
    Unsubscribe {
        filter: String,
        ack: oneshot::Sender<Result<(), TransportError>>,
    },
    Disconnect {
        ack: oneshot::Sender<()>,
    },
}

/// MQTT v3.1.1 client transport
pub struct MqttTransport {
    options: MqttOptions,
    credentials: Mutex<Credentials>,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
}

impl MqttTransport {
    pub fn new(options: MqttOptions) -> Self {
        let credentials = Credentials {
            password: options.password.clone(),
            expires_at: None,
        };
        Self {
            options,
            credentials: Mutex::new(credentials),
            commands: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &MqttOptions {
        &self.options
    }

    /// Replace the password used by the next CONNECT
    pub fn set_password(&self, password: Bytes, expires_at: Option<Instant>) {
        *self.credentials.lock() = Credentials {
            password: Some(password),
            expires_at,
        };
    }

    fn session(&self) -> Option<mpsc::Sender<Command>> {
        self.commands
            .lock()
            .as_ref()
            .filter(|tx| !tx.is_closed())
            .cloned()
    }

    /// Connect, handshake and spawn the session task
    pub async fn open(&self, notifier: StatusNotifier) -> Result<(), TransportError> {
        if self.session().is_some() {
            return Ok(());
        }

        notifier.notify(StatusChange::connecting());
        let credentials = self.credentials.lock().clone();

        let stream = match timeout(self.options.connect_timeout, self.open_stream()).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                notifier.notify(StatusChange::disconnected(StatusReason::ConnectionLost));
                return Err(e);
            }
            Err(_) => {
                notifier.notify(StatusChange::disconnected(StatusReason::ConnectionLost));
                return Err(TransportError::Timeout);
            }
        };

        let (mut reader, mut writer) = tokio::io::split(stream);
        let decoder = Decoder::new().with_max_packet_size(self.options.max_packet_size);
        let mut read_buf = BytesMut::with_capacity(4096);

        let handshake = timeout(
            self.options.connect_timeout,
            self.handshake(&credentials, &decoder, &mut reader, &mut writer, &mut read_buf),
        )
        .await
        .unwrap_or(Err(TransportError::Timeout));

        let connack = match handshake {
            Ok(connack) => connack,
            Err(e) => {
                notifier.notify(failure_status(&e));
                return Err(e);
            }
        };

        if !connack.return_code.is_accepted() {
            let reason = if connack.return_code.is_credential_failure() {
                StatusReason::BadCredential
            } else {
                StatusReason::CommunicationError
            };
            notifier.notify(StatusChange::disabled(reason));
            return Err(TransportError::Rejected(format!(
                "CONNACK refused: {}",
                connack.return_code
            )));
        }

        debug!(
            "MQTT {}:{}: Connected as '{}' (session_present={})",
            self.options.host, self.options.port, self.options.client_id, connack.session_present
        );

        let session = Session::new(
            format!("{}:{}", self.options.host, self.options.port),
            reader,
            writer,
            decoder,
            read_buf,
            notifier.clone(),
            credentials.expires_at,
        );

        // Anything the session reports must land after Connected
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        *self.commands.lock() = Some(tx);
        notifier.notify(StatusChange::connected());
        tokio::spawn(session.run(rx, self.options.keep_alive));
        Ok(())
    }

    /// Whether a session task is currently running
    pub fn is_open(&self) -> bool {
        self.session().is_some()
    }

    /// Close the current session and connect again with the current
    /// credentials
    pub async fn reopen(&self, notifier: StatusNotifier) -> Result<(), TransportError> {
        if let Err(e) = self.close().await {
            debug!(
                "MQTT {}:{}: Close before reconnect failed: {}",
                self.options.host, self.options.port, e
            );
        }
        self.open(notifier).await
    }

    async fn open_stream(&self) -> Result<BoxedStream, TransportError> {
        let tcp = TcpStream::connect((self.options.host.as_str(), self.options.port))
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        tcp.set_nodelay(true)?;

        match &self.options.tls {
            Some(connector) => {
                let server_name = ServerName::try_from(self.options.host.clone())
                    .map_err(|_| TlsError::InvalidServerName(self.options.host.clone()))?;
                let tls = connector
                    .connect(server_name, tcp)
                    .await
                    .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
                Ok(Box::new(tls))
            }
            None => Ok(Box::new(tcp)),
        }
    }

    async fn handshake(
        &self,
        credentials: &Credentials,
        decoder: &Decoder,
        reader: &mut ReadHalf<BoxedStream>,
        writer: &mut WriteHalf<BoxedStream>,
        read_buf: &mut BytesMut,
    ) -> Result<ConnAck, TransportError> {
        let connect = Packet::Connect(Box::new(Connect {
            client_id: self.options.client_id.clone(),
            clean_session: self.options.clean_session,
            keep_alive: self.options.keep_alive.as_secs().min(u16::MAX as u64) as u16,
            username: self.options.username.clone(),
            password: credentials.password.clone(),
        }));

        let mut buf = BytesMut::new();
        Encoder::new().encode(&connect, &mut buf)?;
        writer.write_all(&buf).await?;
        writer.flush().await?;

        loop {
            if let Some((packet, consumed)) = decoder.decode(read_buf)? {
                read_buf.advance(consumed);
                return match packet {
                    Packet::ConnAck(connack) => Ok(connack),
                    _ => Err(ProtocolError::ProtocolViolation("expected CONNACK").into()),
                };
            }
            if reader.read_buf(read_buf).await? == 0 {
                return Err(TransportError::ConnectionLost(
                    "connection closed during handshake".to_string(),
                ));
            }
        }
    }

    /// Close the session gracefully
    pub async fn close(&self) -> Result<(), TransportError> {
        let session = self.commands.lock().take();
        let Some(tx) = session else {
            return Ok(());
        };

        let (ack, done) = oneshot::channel();
        if tx.send(Command::Disconnect { ack }).await.is_err() {
            // Session already ended on its own
            return Ok(());
        }

        match timeout(self.options.operation_timeout, done).await {
            Ok(_) => Ok(()),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Hand a command to the session task and wait for its outcome
    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<(), TransportError>>) -> Command,
    ) -> Result<(), TransportError> {
        let tx = self.session().ok_or(TransportError::NotConnected)?;
        let (ack, done) = oneshot::channel();
        let exchange = async move {
            tx.send(build(ack))
                .await
                .map_err(|_| TransportError::Closed)?;
            done.await.map_err(|_| TransportError::Closed)?
        };

        timeout(self.options.operation_timeout, exchange)
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }

    /// Publish `payload` on `topic`
    pub async fn publish_bytes(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
    ) -> Result<(), TransportError> {
        self.request(|ack| Command::Publish {
            topic: topic.to_string(),
            payload,
            qos,
            ack,
        })
        .await
    }
}

#[async_trait]
impl BrokerTransport for MqttTransport {
    async fn connect(&self, notifier: StatusNotifier) -> Result<(), TransportError> {
        self.open(notifier).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.close().await
    }

    async fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        sink: PublicationSink,
    ) -> Result<(), TransportError> {
        self.request(|ack| Command::Subscribe {
            filter: filter.to_string(),
            qos,
            sink,
            ack,
        })
        .await
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.request(|ack| Command::Unsubscribe {
            filter: filter.to_string(),
            ack,
        })
        .await
    }

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), TransportError> {
        self.publish_bytes(topic, payload, qos).await
    }
}

/// Status to record for a failed handshake
fn failure_status(error: &TransportError) -> StatusChange {
    match error {
        TransportError::Protocol(_) => StatusChange::disabled(StatusReason::CommunicationError),
        _ => StatusChange::disconnected(StatusReason::ConnectionLost),
    }
}

/// Request waiting for an acknowledgement from the server
enum Pending {
    Publish(oneshot::Sender<Result<(), TransportError>>),
    Subscribe {
        filter: String,
        ack: oneshot::Sender<Result<(), TransportError>>,
    },
    Unsubscribe(oneshot::Sender<Result<(), TransportError>>),
}

impl Pending {
    /// The requester stopped waiting, e.g. after its timeout
    fn is_abandoned(&self) -> bool {
        match self {
            Pending::Publish(ack) | Pending::Unsubscribe(ack) => ack.is_closed(),
            Pending::Subscribe { ack, .. } => ack.is_closed(),
        }
    }
}

/// How a session ended
enum SessionEnd {
    ClientClose(oneshot::Sender<()>),
    Lost(String),
    Protocol(ProtocolError),
    /// Every transport handle is gone
    Abandoned,
}

impl From<std::io::Error> for SessionEnd {
    fn from(e: std::io::Error) -> Self {
        SessionEnd::Lost(e.to_string())
    }
}

impl From<DecodeError> for SessionEnd {
    fn from(e: DecodeError) -> Self {
        SessionEnd::Protocol(e.into())
    }
}

/// State owned by the spawned session task
struct Session {
    peer: String,
    reader: ReadHalf<BoxedStream>,
    writer: WriteHalf<BoxedStream>,
    decoder: Decoder,
    encoder: Encoder,
    read_buf: BytesMut,
    write_buf: BytesMut,
    pending: HashMap<u16, Pending>,
    sinks: Vec<(String, PublicationSink)>,
    next_packet_id: u16,
    awaiting_pingresp: bool,
    notifier: StatusNotifier,
    expires_at: Option<Instant>,
}

impl Session {
    fn new(
        peer: String,
        reader: ReadHalf<BoxedStream>,
        writer: WriteHalf<BoxedStream>,
        decoder: Decoder,
        read_buf: BytesMut,
        notifier: StatusNotifier,
        expires_at: Option<Instant>,
    ) -> Self {
        Self {
            peer,
            reader,
            writer,
            decoder,
            encoder: Encoder::new(),
            read_buf,
            write_buf: BytesMut::with_capacity(1024),
            pending: HashMap::new(),
            sinks: Vec::new(),
            next_packet_id: 0,
            awaiting_pingresp: false,
            notifier,
            expires_at,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, keep_alive: Duration) {
        let end = self.serve(&mut commands, keep_alive).await;

        // Fail everything still in flight
        for (_, pending) in self.pending.drain() {
            let ack = match pending {
                Pending::Publish(ack) | Pending::Unsubscribe(ack) => ack,
                Pending::Subscribe { ack, .. } => ack,
            };
            let _ = ack.send(Err(TransportError::Closed));
        }
        self.sinks.clear();
        commands.close();

        match end {
            SessionEnd::ClientClose(ack) => {
                self.notifier
                    .notify(StatusChange::disconnected(StatusReason::ClientClose));
                let _ = ack.send(());
            }
            SessionEnd::Lost(reason) => {
                let expired = self.expires_at.is_some_and(|at| Instant::now() >= at);
                if expired {
                    warn!("MQTT {}: Session dropped after token expiry", self.peer);
                    self.notifier
                        .notify(StatusChange::disconnected(StatusReason::ExpiredToken));
                } else {
                    warn!("MQTT {}: Connection lost: {}", self.peer, reason);
                    self.notifier
                        .notify(StatusChange::disconnected(StatusReason::ConnectionLost));
                }
            }
            SessionEnd::Protocol(e) => {
                error!("MQTT {}: Protocol error: {}", self.peer, e);
                self.notifier
                    .notify(StatusChange::disabled(StatusReason::CommunicationError));
            }
            SessionEnd::Abandoned => {
                debug!("MQTT {}: Transport dropped, closing session", self.peer);
                let _ = self.send_packet(&Packet::Disconnect).await;
                self.notifier
                    .notify(StatusChange::disconnected(StatusReason::ClientClose));
            }
        }
    }

    async fn serve(
        &mut self,
        commands: &mut mpsc::Receiver<Command>,
        keep_alive: Duration,
    ) -> SessionEnd {
        let ping_period = if keep_alive.is_zero() {
            // Effectively never
            Duration::from_secs(86400 * 365)
        } else {
            keep_alive
        };
        let mut keepalive_timer = tokio::time::interval_at(Instant::now() + ping_period, ping_period);

        // Packets that arrived together with CONNACK
        if let Err(end) = self.drain_inbound().await {
            return end;
        }

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else {
                        return SessionEnd::Abandoned;
                    };
                    if let Command::Disconnect { ack } = cmd {
                        debug!("MQTT {}: Disconnecting", self.peer);
                        let _ = self.send_packet(&Packet::Disconnect).await;
                        let _ = self.writer.shutdown().await;
                        return SessionEnd::ClientClose(ack);
                    }
                    if let Err(end) = self.handle_command(cmd).await {
                        return end;
                    }
                }

                result = self.reader.read_buf(&mut self.read_buf) => {
                    match result {
                        Ok(0) => return SessionEnd::Lost("connection closed by peer".to_string()),
                        Ok(_) => {
                            if let Err(end) = self.drain_inbound().await {
                                return end;
                            }
                        }
                        Err(e) => return e.into(),
                    }
                }

                _ = keepalive_timer.tick() => {
                    if self.awaiting_pingresp {
                        return SessionEnd::Lost("no PINGRESP within keep-alive".to_string());
                    }
                    trace!("MQTT {}: PINGREQ", self.peer);
                    self.awaiting_pingresp = true;
                    if let Err(e) = self.send_packet(&Packet::PingReq).await {
                        return e;
                    }
                }
            }
        }
    }

    /// Allocate a free packet identifier; `None` when all 65535 are in flight
    fn next_packet_id(&mut self) -> Option<u16> {
        self.pending.retain(|_, pending| !pending.is_abandoned());

        for _ in 0..u16::MAX {
            self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
            if !self.pending.contains_key(&self.next_packet_id) {
                return Some(self.next_packet_id);
            }
        }
        None
    }

    async fn send_packet(&mut self, packet: &Packet) -> Result<(), SessionEnd> {
        self.write_buf.clear();
        if let Err(e) = self.encoder.encode(packet, &mut self.write_buf) {
            return Err(SessionEnd::Protocol(e.into()));
        }
        self.writer.write_all(&self.write_buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn handle_command(&mut self, cmd: Command) -> Result<(), SessionEnd> {
        match cmd {
            Command::Publish {
                topic,
                payload,
                qos,
                ack,
            } => {
                // The relay never publishes above QoS 1
                let qos = qos.min(QoS::AtLeastOnce);
                let packet_id = if qos == QoS::AtLeastOnce {
                    let Some(id) = self.next_packet_id() else {
                        let _ = ack.send(Err(TransportError::PacketIdsExhausted));
                        return Ok(());
                    };
                    Some(id)
                } else {
                    None
                };
                let publish = Packet::Publish(Publish {
                    qos,
                    topic,
                    packet_id,
                    payload,
                    ..Default::default()
                });

                self.write_buf.clear();
                if let Err(e) = self.encoder.encode(&publish, &mut self.write_buf) {
                    // Oversized payloads fail the request, not the session
                    let _ = ack.send(Err(e.into()));
                    return Ok(());
                }
                self.writer.write_all(&self.write_buf).await?;
                self.writer.flush().await?;

                match packet_id {
                    Some(id) => {
                        self.pending.insert(id, Pending::Publish(ack));
                    }
                    None => {
                        let _ = ack.send(Ok(()));
                    }
                }
            }
            Command::Subscribe {
                filter,
                qos,
                sink,
                ack,
            } => {
                let Some(packet_id) = self.next_packet_id() else {
                    let _ = ack.send(Err(TransportError::PacketIdsExhausted));
                    return Ok(());
                };
                self.sinks.retain(|(f, _)| f != &filter);
                self.sinks.push((filter.clone(), sink));
                self.send_packet(&Packet::Subscribe(Subscribe {
                    packet_id,
                    subscriptions: vec![Subscription {
                        filter: filter.clone(),
                        qos: qos.min(QoS::AtLeastOnce),
                    }],
                }))
                .await?;
                debug!("MQTT {}: SUBSCRIBE '{}' (id={})", self.peer, filter, packet_id);
                self.pending
                    .insert(packet_id, Pending::Subscribe { filter, ack });
            }
            Command::Unsubscribe { filter, ack } => {
                let Some(packet_id) = self.next_packet_id() else {
                    let _ = ack.send(Err(TransportError::PacketIdsExhausted));
                    return Ok(());
                };
                self.sinks.retain(|(f, _)| f != &filter);
                self.send_packet(&Packet::Unsubscribe(Unsubscribe {
                    packet_id,
                    filters: vec![filter.clone()],
                }))
                .await?;
                debug!("MQTT {}: UNSUBSCRIBE '{}' (id={})", self.peer, filter, packet_id);
                self.pending.insert(packet_id, Pending::Unsubscribe(ack));
            }
            Command::Disconnect { .. } => {}
        }
        Ok(())
    }

    async fn drain_inbound(&mut self) -> Result<(), SessionEnd> {
        while let Some((packet, consumed)) = self.decoder.decode(&self.read_buf)? {
            self.read_buf.advance(consumed);
            self.handle_packet(packet).await?;
        }
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<(), SessionEnd> {
        match packet {
            Packet::Publish(publish) => {
                let packet_id = publish.packet_id;
                let qos = publish.qos;
                self.route(publish);

                match (qos, packet_id) {
                    (QoS::AtLeastOnce, Some(packet_id)) => {
                        self.send_packet(&Packet::PubAck(PubAck { packet_id }))
                            .await?;
                    }
                    (QoS::ExactlyOnce, _) => {
                        warn!("MQTT {}: QoS 2 delivery is not supported", self.peer);
                    }
                    _ => {}
                }
            }
            Packet::PubAck(puback) => match self.pending.remove(&puback.packet_id) {
                Some(Pending::Publish(ack)) => {
                    let _ = ack.send(Ok(()));
                }
                Some(other) => {
                    self.pending.insert(puback.packet_id, other);
                }
                None => trace!("MQTT {}: Unexpected PUBACK {}", self.peer, puback.packet_id),
            },
            Packet::SubAck(suback) => match self.pending.remove(&suback.packet_id) {
                Some(Pending::Subscribe { filter, ack }) => {
                    if suback.return_codes.iter().any(|code| code.is_failure()) {
                        self.sinks.retain(|(f, _)| f != &filter);
                        let _ = ack.send(Err(TransportError::Rejected(format!(
                            "subscription to '{}' refused",
                            filter
                        ))));
                    } else {
                        info!("MQTT {}: Subscribed to '{}'", self.peer, filter);
                        let _ = ack.send(Ok(()));
                    }
                }
                Some(other) => {
                    self.pending.insert(suback.packet_id, other);
                }
                None => trace!("MQTT {}: Unexpected SUBACK {}", self.peer, suback.packet_id),
            },
            Packet::UnsubAck(unsuback) => match self.pending.remove(&unsuback.packet_id) {
                Some(Pending::Unsubscribe(ack)) => {
                    let _ = ack.send(Ok(()));
                }
                Some(other) => {
                    self.pending.insert(unsuback.packet_id, other);
                }
                None => trace!(
                    "MQTT {}: Unexpected UNSUBACK {}",
                    self.peer,
                    unsuback.packet_id
                ),
            },
            Packet::PingResp => {
                trace!("MQTT {}: PINGRESP", self.peer);
                self.awaiting_pingresp = false;
            }
            Packet::Disconnect => {
                return Err(SessionEnd::Lost("server sent DISCONNECT".to_string()));
            }
            other => {
                return Err(SessionEnd::Protocol(ProtocolError::ProtocolViolation(
                    match other.packet_type() {
                        crate::protocol::PacketType::ConnAck => "unexpected CONNACK",
                        _ => "unexpected client packet from server",
                    },
                )));
            }
        }
        Ok(())
    }

    /// Deliver an inbound publication to every matching subscription
    fn route(&mut self, publish: Publish) {
        let mut delivered = false;
        for (filter, sink) in &self.sinks {
            if topic_matches_filter(&publish.topic, filter) {
                delivered |= sink
                    .send(Publication {
                        topic: publish.topic.clone(),
                        payload: publish.payload.clone(),
                    })
                    .is_ok();
            }
        }
        if !delivered {
            trace!(
                "MQTT {}: No subscriber for publication on '{}'",
                self.peer,
                publish.topic
            );
        }
    }
}
