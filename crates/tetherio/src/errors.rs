use tokio::sync::mpsc::error::TrySendError;

use crate::packet::Packet;

/// Protocol-level errors, reported to the namespace error callback when
/// one is registered.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("error serializing json packet: {0:?}")]
    SerializeError(#[from] serde_json::Error),

    #[error("invalid packet type")]
    InvalidPacketType,

    #[error("invalid event name")]
    InvalidEventName,

    #[error("invalid namespace")]
    InvalidNamespace,

    #[error("internal channel error: {0:?}")]
    SendChannel(#[from] TrySendError<Packet>),

    #[error("engine error: {0}")]
    Engine(#[from] tetherio_engine::Error),
}

/// Error when sending a packet to a client socket.
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    #[error("error serializing packet: {0:?}")]
    Serialize(#[from] serde_json::Error),

    #[error("the socket buffer is full, the client polls too slowly")]
    SocketFull,

    #[error("the socket is closed")]
    SocketClosed,
}

/// Error when awaiting an acknowledgement.
#[derive(thiserror::Error, Debug)]
pub enum AckError {
    #[error("error deserializing ack response: {0:?}")]
    Serde(#[from] serde_json::Error),

    #[error("ack channel dropped before a response arrived")]
    AckReceive(#[from] tokio::sync::oneshot::error::RecvError),

    #[error("timeout waiting for the ack response")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("error sending the packet: {0}")]
    Send(#[from] SendError),
}

/// Error when broadcasting to multiple sockets.
#[derive(thiserror::Error, Debug)]
pub enum BroadcastError {
    #[error("send errors: {0:?}")]
    Send(Vec<SendError>),

    #[error("error serializing packet: {0:?}")]
    Serialize(#[from] serde_json::Error),
}

impl From<Vec<SendError>> for BroadcastError {
    fn from(errors: Vec<SendError>) -> Self {
        BroadcastError::Send(errors)
    }
}

impl From<TrySendError<tetherio_engine::SendPacket>> for SendError {
    fn from(e: TrySendError<tetherio_engine::SendPacket>) -> Self {
        match e {
            TrySendError::Full(_) => SendError::SocketFull,
            TrySendError::Closed(_) => SendError::SocketClosed,
        }
    }
}
