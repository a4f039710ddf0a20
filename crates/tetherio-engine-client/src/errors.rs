use http::StatusCode;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite;

use tetherio_engine::packet::Packet;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The first packet read during the dial was not an open packet.
    #[error("invalid open: the session did not start with an open packet")]
    InvalidOpen,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("server answered {0}")]
    BadStatus(StatusCode),

    #[error("packet codec error: {0}")]
    Codec(#[from] tetherio_engine::Error),

    #[error("http transport error: {0:?}")]
    HttpTransport(#[from] hyper::Error),

    #[error("http error: {0:?}")]
    Http(#[from] http::Error),

    #[error("ws transport error: {0:?}")]
    WsTransport(#[from] Box<tungstenite::Error>),

    #[error("the outbound buffer is full")]
    BufferFull,

    #[error("session closed")]
    Closed,
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::WsTransport(Box::new(e))
    }
}

impl From<TrySendError<Packet>> for Error {
    fn from(e: TrySendError<Packet>) -> Self {
        match e {
            TrySendError::Full(_) => Error::BufferFull,
            TrySendError::Closed(_) => Error::Closed,
        }
    }
}
