use base64::{engine::general_purpose, Engine};
use serde::Serialize;

use crate::config::EngineIoConfig;
use crate::errors::Error;
use crate::sid::Sid;
use crate::transport::TransportType;

/// A packet type to use when sending data to the client through
/// [`Socket::send`](crate::Socket::send).
#[derive(Debug, Clone, PartialEq)]
pub enum SendPacket {
    /// Send a string payload to the client.
    Message(String),
    /// Send a binary payload to the client.
    Binary(Vec<u8>),
}

/// An engine.io v3 packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Open packet, sent by the server to establish a session.
    Open(OpenPacket),
    /// Close packet, sent by either side to tear the session down.
    Close,
    /// Ping packet, sent by the client. The payload is echoed in the pong.
    Ping(String),
    /// Pong packet, sent by the server in response to a ping.
    Pong(String),
    /// Message packet with a utf-8 payload.
    Message(String),
    /// Upgrade packet, sent by the client to finish the upgrade handshake.
    Upgrade,
    /// Noop packet, used to release a pending polling request.
    Noop,
    /// Message packet with a binary payload. Encoded as `b4<base64>` on
    /// string transports and as a raw frame with a leading `0x04` type
    /// byte on binary transports.
    Binary(Vec<u8>),
}

impl Packet {
    pub(crate) fn is_binary(&self) -> bool {
        matches!(self, Packet::Binary(_))
    }
}

impl From<SendPacket> for Packet {
    fn from(packet: SendPacket) -> Self {
        match packet {
            SendPacket::Message(msg) => Packet::Message(msg),
            SendPacket::Binary(data) => Packet::Binary(data),
        }
    }
}

/// Serialize a [`Packet`] to the string representation used on string
/// transports and inside string payload frames.
impl TryFrom<Packet> for String {
    type Error = Error;
    fn try_from(packet: Packet) -> Result<Self, Self::Error> {
        let res = match packet {
            Packet::Open(open) => "0".to_string() + &serde_json::to_string(&open)?,
            Packet::Close => "1".to_string(),
            Packet::Ping(data) => "2".to_string() + &data,
            Packet::Pong(data) => "3".to_string() + &data,
            Packet::Message(msg) => "4".to_string() + &msg,
            Packet::Upgrade => "5".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Binary(data) => "b4".to_string() + &general_purpose::STANDARD.encode(data),
        };
        Ok(res)
    }
}

/// Deserialize a [`Packet`] from its string representation.
impl TryFrom<&str> for Packet {
    type Error = Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut chars = value.chars();
        let packet_type = chars.next().ok_or(Error::InvalidPacketType)?;
        let rest = chars.as_str();
        let res = match packet_type {
            '0' => Packet::Open(serde_json::from_str(rest)?),
            '1' => Packet::Close,
            '2' => Packet::Ping(rest.to_string()),
            '3' => Packet::Pong(rest.to_string()),
            '4' => Packet::Message(rest.to_string()),
            '5' => Packet::Upgrade,
            '6' => Packet::Noop,
            'b' => {
                // base64 marker, only used for binary messages
                let mut rest = rest.chars();
                if rest.next() != Some('4') {
                    return Err(Error::InvalidPacketType);
                }
                Packet::Binary(general_purpose::STANDARD.decode(rest.as_str())?)
            }
            _ => return Err(Error::InvalidPacketType),
        };
        Ok(res)
    }
}

impl TryFrom<String> for Packet {
    type Error = Error;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Packet::try_from(value.as_str())
    }
}

/// The open handshake parameters advertised to the client.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPacket {
    pub sid: Sid,
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
}

impl OpenPacket {
    /// Create a new [`OpenPacket`].
    ///
    /// Upgrades are only advertised when the session starts on polling and
    /// the websocket transport is enabled.
    pub(crate) fn new(transport: TransportType, sid: Sid, config: &EngineIoConfig) -> Self {
        let upgrades = if transport == TransportType::Polling
            && config.allows_transport(TransportType::Websocket)
        {
            vec!["websocket".to_string()]
        } else {
            vec![]
        };
        OpenPacket {
            sid,
            upgrades,
            ping_interval: config.ping_interval.as_millis() as u64,
            ping_timeout: config.ping_timeout.as_millis() as u64,
        }
    }
}
