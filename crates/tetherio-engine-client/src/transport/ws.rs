use futures::stream::{SplitSink, SplitStream};
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use tetherio_engine::packet::{OpenPacket, Packet};
use tetherio_engine::payload::BINARY_MESSAGE_TYPE;

use crate::errors::Error;

pub(crate) type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
pub(crate) type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// The client half of the websocket transport: a direct dial, no polling
/// session to upgrade from.
pub struct WsClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub(crate) async fn connect(uri: &str) -> Result<Self, Error> {
        let (ws, _res) = connect_async(uri).await?;
        Ok(Self { ws })
    }

    /// A fresh websocket session starts with a single open packet as its
    /// first text frame.
    pub(crate) async fn handshake(&mut self) -> Result<OpenPacket, Error> {
        match self.ws.next().await {
            Some(Ok(Message::Text(text))) => match Packet::try_from(text) {
                Ok(Packet::Open(open)) => Ok(open),
                packet => {
                    debug!("dial answered with {:?}", packet);
                    Err(Error::InvalidOpen)
                }
            },
            Some(Err(e)) => Err(e.into()),
            _ => Err(Error::InvalidOpen),
        }
    }

    pub(crate) fn split(self) -> (WsSink, WsSource) {
        self.ws.split()
    }
}

/// Map one inbound websocket frame to an engine.io packet. Control frames
/// are absorbed by the websocket layer and yield nothing.
pub(crate) fn decode_frame(msg: Message) -> Result<Option<Packet>, Error> {
    match msg {
        Message::Text(text) => Ok(Some(Packet::try_from(text).map_err(Error::Codec)?)),
        Message::Binary(mut data) => {
            if data.first() == Some(&BINARY_MESSAGE_TYPE) {
                data.remove(0);
                Ok(Some(Packet::Binary(data)))
            } else {
                Err(Error::Codec(tetherio_engine::Error::InvalidPacketType))
            }
        }
        Message::Close(_) => Ok(Some(Packet::Close)),
        _ => Ok(None),
    }
}

/// Map one outbound packet to a websocket frame. Binary messages go as raw
/// frames with the leading message type byte, everything else as text.
pub(crate) fn encode_frame(packet: Packet) -> Result<Message, Error> {
    let msg = match packet {
        Packet::Binary(data) => {
            let mut frame = Vec::with_capacity(data.len() + 1);
            frame.push(BINARY_MESSAGE_TYPE);
            frame.extend_from_slice(&data);
            Message::Binary(frame)
        }
        packet => Message::Text(String::try_from(packet).map_err(Error::Codec)?),
    };
    Ok(msg)
}
