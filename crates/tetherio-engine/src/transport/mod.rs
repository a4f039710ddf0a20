pub(crate) mod polling;
pub(crate) mod ws;

use std::fmt;
use std::str::FromStr;

use crate::errors::Error;

/// The transport a session is currently bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// Http long-polling (with optional jsonp and base64 fallbacks).
    Polling = 0x01,
    /// Websocket.
    Websocket = 0x02,
}

impl FromStr for TransportType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polling" => Ok(TransportType::Polling),
            "websocket" => Ok(TransportType::Websocket),
            _ => Err(Error::UnknownTransport),
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportType::Polling => "polling",
            TransportType::Websocket => "websocket",
        })
    }
}

impl From<TransportType> for u8 {
    fn from(t: TransportType) -> Self {
        t as u8
    }
}

impl TryFrom<u8> for TransportType {
    type Error = Error;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(TransportType::Polling),
            0x02 => Ok(TransportType::Websocket),
            _ => Err(Error::UnknownTransport),
        }
    }
}
