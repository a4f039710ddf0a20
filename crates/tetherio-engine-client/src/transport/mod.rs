pub(crate) mod polling;
pub(crate) mod ws;

use futures::{SinkExt, StreamExt};
use http::Uri;

use tetherio_engine::packet::Packet;
use tetherio_engine::TransportType;

use crate::errors::Error;
use crate::transport::polling::PollingClient;
use crate::transport::ws::{WsSink, WsSource};

/// The sending half of a dialed transport.
pub(crate) enum TransportTx {
    Polling(PollingClient),
    Websocket(WsSink),
}

impl TransportTx {
    /// Flush a batch of packets: one POST body on polling, one frame per
    /// packet on websocket.
    pub(crate) async fn send(&mut self, packets: Vec<Packet>) -> Result<(), Error> {
        match self {
            TransportTx::Polling(client) => client.post(packets).await,
            TransportTx::Websocket(sink) => {
                for packet in packets {
                    sink.send(ws::encode_frame(packet)?).await?;
                }
                Ok(())
            }
        }
    }
}

/// The receiving half of a dialed transport.
pub(crate) enum TransportRx {
    Polling(PollingClient),
    Websocket(WsSource),
}

impl TransportRx {
    /// Wait for the next inbound packets: a GET's worth on polling, a
    /// single frame on websocket.
    pub(crate) async fn recv(&mut self) -> Result<Vec<Packet>, Error> {
        match self {
            TransportRx::Polling(client) => client.get().await,
            TransportRx::Websocket(source) => loop {
                match source.next().await {
                    Some(Ok(msg)) => match ws::decode_frame(msg)? {
                        Some(packet) => return Ok(vec![packet]),
                        None => continue,
                    },
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(Error::Closed),
                }
            },
        }
    }
}

/// Build the request uri for one transport, swapping the scheme for the
/// websocket dial and keeping any query the caller put on the url.
pub(crate) fn build_uri(url: &str, transport: TransportType) -> Result<String, Error> {
    let uri: Uri = url
        .parse()
        .map_err(|_| Error::InvalidUrl(url.to_string()))?;
    let authority = uri
        .authority()
        .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;
    let scheme = match (transport, uri.scheme_str()) {
        (TransportType::Polling, Some("http") | None) => "http",
        (TransportType::Polling, Some("https")) => "https",
        (TransportType::Websocket, Some("http" | "ws") | None) => "ws",
        (TransportType::Websocket, Some("https" | "wss")) => "wss",
        _ => return Err(Error::InvalidUrl(url.to_string())),
    };

    let mut out = format!("{scheme}://{authority}{}", uri.path());
    match uri.query() {
        Some(query) => {
            out.push('?');
            out.push_str(query);
            out.push('&');
        }
        None => out.push('?'),
    }
    out.push_str(&format!("EIO=3&transport={transport}"));
    Ok(out)
}
