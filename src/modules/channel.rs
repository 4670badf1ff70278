use std::io;
use std::net::TcpStream;
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use serde_json::{json, Value};
use thiserror::Error;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;
use crate::modules::types::ChannelFrame;

/// Namespace the server registers its channel handlers under.
pub const CHANNEL_NAMESPACE: &str = "/CyEx";
pub const SOCKET_IO_PATH: &str = "/socket.io/";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is disconnected")]
    Disconnected,
    #[error("invalid channel url: {0}")]
    Url(String),
    #[error("malformed packet: {0}")]
    Protocol(String),
    #[error("namespace rejected: {0}")]
    Rejected(String),
    #[error("namespace handshake timed out")]
    HandshakeTimeout,
    #[error("websocket error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("cannot encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Bidirectional, server-pushed event channel.
pub trait EventChannel {
    fn emit(&mut self, event: &str, data: Value) -> Result<(), ChannelError>;

    /// Returns the next pending frame without blocking past the transport's poll interval.
    fn try_recv(&mut self) -> Result<Option<ChannelFrame>, ChannelError>;
}

/// Engine.IO v4 packets, with Socket.IO packets carried inside `message`.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Value),
    Close,
    Ping,
    Pong,
    Connect { namespace: String },
    Disconnect { namespace: String },
    Event { namespace: String, frame: ChannelFrame },
    ConnectError { namespace: String, message: String },
    Noop,
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == "/" {
        String::new()
    } else {
        format!("{namespace},")
    }
}

impl Packet {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let text = match self {
            Packet::Open(handshake) => format!("0{handshake}"),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect { namespace } => format!("40{}", namespace_prefix(namespace)),
            Packet::Disconnect { namespace } => format!("41{}", namespace_prefix(namespace)),
            Packet::Event { namespace, frame } => format!(
                "42{}{}",
                namespace_prefix(namespace),
                serde_json::to_string(&json!([frame.event, frame.data]))?
            ),
            Packet::ConnectError { namespace, message } => format!(
                "44{}{}",
                namespace_prefix(namespace),
                serde_json::to_string(&json!({ "message": message }))?
            ),
        };
        Ok(text)
    }

    pub fn decode(text: &str) -> Result<Self, ChannelError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or_else(|| ChannelError::Protocol("empty packet".to_string()))?;
        let rest = chars.as_str();
        match kind {
            '0' => Ok(Packet::Open(serde_json::from_str(rest).unwrap_or(Value::Null))),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_socket_packet(rest),
            '5' | '6' => Ok(Packet::Noop),
            other => Err(ChannelError::Protocol(format!("unknown packet type {other}"))),
        }
    }
}

fn decode_socket_packet(body: &str) -> Result<Packet, ChannelError> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ChannelError::Protocol("empty message".to_string()))?;
    let rest = chars.as_str();
    let (namespace, rest) = match rest.strip_prefix('/') {
        Some(_) => match rest.find(',') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        },
        None => ("/", rest),
    };
    // Ack ids precede the payload.
    let payload = rest.trim_start_matches(|c: char| c.is_ascii_digit());
    let namespace = namespace.to_string();
    match kind {
        '0' => Ok(Packet::Connect { namespace }),
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => {
            let items: Vec<Value> = serde_json::from_str(payload)
                .map_err(|e| ChannelError::Protocol(e.to_string()))?;
            let event = items
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| ChannelError::Protocol("event without a name".to_string()))?;
            let data = items.get(1).cloned().unwrap_or(Value::Null);
            Ok(Packet::Event {
                namespace,
                frame: ChannelFrame::new(event, data),
            })
        }
        '4' => {
            let message = match serde_json::from_str::<Value>(payload) {
                Ok(Value::Object(map)) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                Ok(Value::String(message)) => message,
                _ => payload.to_string(),
            };
            Ok(Packet::ConnectError { namespace, message })
        }
        _ => Ok(Packet::Noop),
    }
}

/// Maps an http(s) base to the ws(s) Socket.IO endpoint.
pub fn channel_url(base: &Url) -> Result<Url, ChannelError> {
    let mut url = base
        .join(SOCKET_IO_PATH)
        .map_err(|e| ChannelError::Url(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ChannelError::Url(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::Url(format!("cannot switch {base} to {scheme}")))?;
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

fn set_read_timeout(stream: &mut MaybeTlsStream<TcpStream>, timeout: Duration) -> io::Result<()> {
    match stream {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(stream) => stream.sock.set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

/// Socket.IO client bound to one namespace over a WebSocket transport.
pub struct WsChannel {
    socket: Option<WebSocket<MaybeTlsStream<TcpStream>>>,
    namespace: String,
}

impl WsChannel {
    pub fn connect(url: &Url, namespace: &str, poll_interval: Duration) -> Result<Self, ChannelError> {
        let (mut socket, _response) = tungstenite::connect(url.as_str())?;
        set_read_timeout(socket.get_mut(), poll_interval).map_err(tungstenite::Error::Io)?;
        let mut channel = Self {
            socket: Some(socket),
            namespace: namespace.to_string(),
        };
        channel.join_namespace()?;
        info!("Channel connected to {url} namespace {namespace}");
        Ok(channel)
    }

    fn join_namespace(&mut self) -> Result<(), ChannelError> {
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        let mut opened = false;
        while Instant::now() < deadline {
            match self.next_packet()? {
                Some(Packet::Open(handshake)) if !opened => {
                    debug!("Engine.IO open: {handshake}");
                    opened = true;
                    self.send_packet(&Packet::Connect {
                        namespace: self.namespace.clone(),
                    })?;
                }
                Some(Packet::Ping) => self.send_packet(&Packet::Pong)?,
                Some(Packet::Connect { namespace }) if namespace == self.namespace => return Ok(()),
                Some(Packet::ConnectError { message, .. }) => {
                    self.drop_connection(&message);
                    return Err(ChannelError::Rejected(message));
                }
                Some(Packet::Close) => {
                    self.drop_connection("closed during handshake");
                    return Err(ChannelError::Disconnected);
                }
                Some(other) => debug!("Ignoring {other:?} during handshake"),
                None => {}
            }
        }
        self.drop_connection("handshake timed out");
        Err(ChannelError::HandshakeTimeout)
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    pub fn close(&mut self) {
        let leave = Packet::Disconnect {
            namespace: self.namespace.clone(),
        };
        if let Some(mut socket) = self.socket.take() {
            if let Ok(text) = leave.encode() {
                let _ = socket.send(Message::Text(text));
            }
            if let Err(e) = socket.close(None) {
                debug!("Closing channel: {e}");
            }
        }
    }

    fn drop_connection(&mut self, reason: &str) {
        if self.socket.take().is_some() {
            warn!("Channel lost: {reason}");
        }
    }

    fn send_packet(&mut self, packet: &Packet) -> Result<(), ChannelError> {
        let text = packet.encode()?;
        let socket = self.socket.as_mut().ok_or(ChannelError::Disconnected)?;
        if let Err(e) = socket.send(Message::Text(text)) {
            self.drop_connection(&e.to_string());
            return Err(e.into());
        }
        Ok(())
    }

    /// `Ok(None)` when nothing arrived within the poll interval.
    fn next_packet(&mut self) -> Result<Option<Packet>, ChannelError> {
        let socket = self.socket.as_mut().ok_or(ChannelError::Disconnected)?;
        match socket.read() {
            Ok(Message::Text(text)) => match Packet::decode(&text) {
                Ok(packet) => Ok(Some(packet)),
                Err(e) => {
                    debug!("Ignoring packet {text:.80}: {e}");
                    Ok(None)
                }
            },
            Ok(Message::Close(_)) => Ok(Some(Packet::Close)),
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(e @ (tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => {
                self.drop_connection(&e.to_string());
                Err(ChannelError::Disconnected)
            }
            Err(e) => {
                self.drop_connection(&e.to_string());
                Err(e.into())
            }
        }
    }
}

impl EventChannel for WsChannel {
    fn emit(&mut self, event: &str, data: Value) -> Result<(), ChannelError> {
        self.send_packet(&Packet::Event {
            namespace: self.namespace.clone(),
            frame: ChannelFrame::new(event, data),
        })
    }

    fn try_recv(&mut self) -> Result<Option<ChannelFrame>, ChannelError> {
        match self.next_packet()? {
            Some(Packet::Event { namespace, frame }) if namespace == self.namespace => Ok(Some(frame)),
            Some(Packet::Ping) => {
                self.send_packet(&Packet::Pong)?;
                Ok(None)
            }
            Some(Packet::Close) => {
                self.drop_connection("closed by server");
                Ok(None)
            }
            Some(Packet::Disconnect { namespace }) if namespace == self.namespace => {
                self.drop_connection("namespace disconnected by server");
                Ok(None)
            }
            Some(other) => {
                debug!("Ignoring {other:?}");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_base_maps_to_socket_io_endpoint() {
        let url = channel_url(&Url::parse("http://localhost:5000/upload").unwrap()).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:5000/socket.io/?EIO=4&transport=websocket");
    }

    #[test]
    fn https_base_maps_to_wss() {
        let url = channel_url(&Url::parse("https://vr.example.org").unwrap()).unwrap();
        assert_eq!(url.as_str(), "wss://vr.example.org/socket.io/?EIO=4&transport=websocket");
    }

    #[test]
    fn other_schemes_are_rejected() {
        let err = channel_url(&Url::parse("ftp://example.org").unwrap()).unwrap_err();
        assert!(matches!(err, ChannelError::Url(_)));
    }

    #[test]
    fn event_is_encoded_with_namespace() {
        let packet = Packet::Event {
            namespace: "/CyEx".to_string(),
            frame: ChannelFrame::new("checkProjExistence", json!({"projectName": "demo"})),
        };
        assert_eq!(
            packet.encode().unwrap(),
            r#"42/CyEx,["checkProjExistence",{"projectName":"demo"}]"#
        );
        assert_eq!(
            Packet::Connect {
                namespace: "/CyEx".to_string()
            }
            .encode()
            .unwrap(),
            "40/CyEx,"
        );
    }

    #[test]
    fn server_event_with_ack_id_decodes() {
        let packet =
            Packet::decode(r#"42/CyEx,12["project",{"api":"check_project_exists","exists":true}]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                namespace: "/CyEx".to_string(),
                frame: ChannelFrame::new("project", json!({"api": "check_project_exists", "exists": true})),
            }
        );
    }

    #[test]
    fn root_namespace_and_control_packets_decode() {
        assert_eq!(
            Packet::decode(r#"42["status",{"message":"hi"}]"#).unwrap(),
            Packet::Event {
                namespace: "/".to_string(),
                frame: ChannelFrame::new("status", json!({"message": "hi"})),
            }
        );
        assert_eq!(Packet::decode("2").unwrap(), Packet::Ping);
        assert_eq!(
            Packet::decode(r#"40/CyEx,{"sid":"abc"}"#).unwrap(),
            Packet::Connect {
                namespace: "/CyEx".to_string()
            }
        );
        assert!(matches!(Packet::decode(r#"0{"sid":"x"}"#).unwrap(), Packet::Open(_)));
    }

    #[test]
    fn connect_error_carries_message() {
        assert_eq!(
            Packet::decode(r#"44/CyEx,{"message":"Invalid namespace"}"#).unwrap(),
            Packet::ConnectError {
                namespace: "/CyEx".to_string(),
                message: "Invalid namespace".to_string()
            }
        );
    }

    #[test]
    fn malformed_packets_are_errors() {
        assert!(Packet::decode("").is_err());
        assert!(Packet::decode("9").is_err());
        assert!(Packet::decode("42/CyEx,not json").is_err());
        assert!(Packet::decode("42/CyEx,[1]").is_err());
    }
}
