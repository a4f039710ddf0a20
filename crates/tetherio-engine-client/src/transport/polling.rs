use http::header::CONTENT_TYPE;
use http::{HeaderMap, Request, StatusCode};
use hyper::client::HttpConnector;
use hyper::Body;
use tracing::debug;

use tetherio_engine::packet::{OpenPacket, Packet};
use tetherio_engine::{payload, TransportType};

use crate::errors::Error;
use crate::transport::build_uri;

/// Refuse response bodies above this size, mirroring the server default.
const MAX_PAYLOAD: u64 = 1e5 as u64;

/// The client half of the http long-polling transport.
///
/// One clone runs per direction: the read loop drains the server with
/// sequential GETs while the write loop flushes outbound packets as POST
/// bodies, matching the one-request-per-kind concurrency the server
/// enforces.
#[derive(Debug, Clone)]
pub struct PollingClient {
    http: hyper::Client<HttpConnector>,
    uri: String,
    supports_binary: bool,
}

impl PollingClient {
    pub(crate) fn new(url: &str) -> Result<Self, Error> {
        let uri = build_uri(url, TransportType::Polling)?;
        let supports_binary = !uri.contains("b64=1");
        Ok(Self {
            http: hyper::Client::new(),
            uri,
            supports_binary,
        })
    }

    /// Run the open handshake: a single GET whose body must decode to an
    /// open packet. The session id is folded into the uri for every
    /// request that follows.
    pub(crate) async fn handshake(&mut self) -> Result<OpenPacket, Error> {
        let packets = self.get().await?;
        match packets.into_iter().next() {
            Some(Packet::Open(open)) => {
                self.uri = format!("{}&sid={}", self.uri, open.sid);
                Ok(open)
            }
            packet => {
                debug!("dial answered with {:?}", packet);
                Err(Error::InvalidOpen)
            }
        }
    }

    /// One polling cycle: GET whatever the server has flushed and decode
    /// it with the framing advertised by the response content-type.
    pub(crate) async fn get(&self) -> Result<Vec<Packet>, Error> {
        let req = Request::get(self.uri.as_str()).body(Body::empty())?;
        let res = self.http.request(req).await?;
        if res.status() != StatusCode::OK {
            return Err(Error::BadStatus(res.status()));
        }
        let binary = is_binary_content_type(res.headers());
        let packets = payload::decoder(res.into_body(), binary, MAX_PAYLOAD).await?;
        Ok(packets)
    }

    /// Flush a batch of packets as a single POST body.
    pub(crate) async fn post(&self, packets: Vec<Packet>) -> Result<(), Error> {
        let payload = payload::encode_payload(packets, self.supports_binary)?;
        let content_type = if payload.has_binary {
            "application/octet-stream"
        } else {
            "text/plain; charset=UTF-8"
        };
        let req = Request::post(self.uri.as_str())
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(payload.data))?;
        let res = self.http.request(req).await?;
        if res.status() != StatusCode::OK {
            return Err(Error::BadStatus(res.status()));
        }
        Ok(())
    }
}

fn is_binary_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/octet-stream"))
}
