use http::{Response, StatusCode};
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite;

use crate::body::ResponseBody;
use crate::packet::Packet;
use crate::sid::Sid;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("error serializing json packet: {0:?}")]
    SerializeError(#[from] serde_json::Error),

    #[error("error decoding base64 packet: {0:?}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("invalid utf-8 in packet: {0:?}")]
    Utf8Error(#[from] std::str::Utf8Error),

    #[error("invalid packet type")]
    InvalidPacketType,

    #[error("invalid packet length")]
    InvalidPacketLength,

    #[error("invalid payload framing")]
    InvalidPayload,

    #[error("payload exceeds the maximum allowed size")]
    PayloadTooLarge,

    #[error("unsupported content-type")]
    UnsupportedMediaType,

    #[error("bad packet received: {0:?}")]
    BadPacket(Packet),

    #[error("error reading request body")]
    HttpBody,

    #[error("ws transport error: {0:?}")]
    WsTransport(#[from] Box<tungstenite::Error>),

    #[error("http error: {0:?}")]
    Http(#[from] http::Error),

    #[error("internal channel error: {0:?}")]
    SendChannel(#[from] TrySendError<Packet>),

    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    #[error("upgrade error")]
    UpgradeError,

    #[error("unknown session id")]
    UnknownSessionID(Sid),

    #[error("transport mismatch")]
    TransportMismatch,

    #[error("unknown transport")]
    UnknownTransport,

    #[error("unsupported protocol version")]
    UnsupportedProtocolVersion,

    #[error("bad handshake method")]
    BadHandshakeMethod,

    #[error("invalid query string")]
    InvalidQuery,

    #[error("another polling request is already open for this session")]
    PollingOverlap,

    #[error("session closed")]
    Aborted,
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::WsTransport(Box::new(e))
    }
}

/// Convert an [`Error`] into an http response. Client-attributable errors
/// map to a `400`, everything else to a `500`.
impl<B> From<Error> for Response<ResponseBody<B>> {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::SerializeError(_)
            | Error::Base64Error(_)
            | Error::Utf8Error(_)
            | Error::InvalidPacketType
            | Error::InvalidPacketLength
            | Error::InvalidPayload
            | Error::PayloadTooLarge
            | Error::UnsupportedMediaType
            | Error::BadPacket(_)
            | Error::UnknownSessionID(_)
            | Error::TransportMismatch
            | Error::UnknownTransport
            | Error::UnsupportedProtocolVersion
            | Error::BadHandshakeMethod
            | Error::InvalidQuery
            | Error::PollingOverlap
            | Error::UpgradeError
            | Error::Aborted => StatusCode::BAD_REQUEST,
            Error::HttpBody
            | Error::WsTransport(_)
            | Error::Http(_)
            | Error::SendChannel(_)
            | Error::HeartbeatTimeout => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Response::builder()
            .status(status)
            .body(ResponseBody::empty_response())
            .unwrap()
    }
}
