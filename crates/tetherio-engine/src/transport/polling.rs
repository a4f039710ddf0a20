use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Request, Response, StatusCode};
use http_body::Full;
use tracing::debug;

use crate::body::ResponseBody;
use crate::engine::EngineIo;
use crate::errors::Error;
use crate::handler::EngineIoHandler;
use crate::packet::{OpenPacket, Packet};
use crate::payload;
use crate::sid::Sid;
use crate::socket::DisconnectReason;
use crate::transport::TransportType;

const TEXT_MIME: &str = "text/plain; charset=UTF-8";
const BINARY_MIME: &str = "application/octet-stream";
const JAVASCRIPT_MIME: &str = "text/javascript; charset=UTF-8";

/// Open a new polling session and return the open packet handshake,
/// always flushed with the string framing.
pub fn open_req<H, R, B>(
    engine: Arc<EngineIo<H>>,
    req: Request<R>,
    supports_binary: bool,
    jsonp: Option<String>,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: EngineIoHandler,
{
    let (parts, _) = req.into_parts();
    let socket = engine.create_session(TransportType::Polling, parts, supports_binary);
    let packet = Packet::Open(OpenPacket::new(
        TransportType::Polling,
        socket.id,
        &engine.config,
    ));
    let payload = payload::encode_payload(vec![packet], false)?;
    write_response(payload, jsonp)
}

/// Flush the session buffer to the client, parking until there is
/// something to flush.
///
/// Detects polling overlap: if the buffer is already locked by another GET
/// the session is closed and a `400` is returned to both requests.
pub async fn polling_req<H, B>(
    engine: Arc<EngineIo<H>>,
    sid: Sid,
    jsonp: Option<String>,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: EngineIoHandler,
{
    let socket = engine.get_socket(sid)?;
    if !socket.is_http() {
        return Err(Error::TransportMismatch);
    }
    let mut rx = match socket.internal_rx.try_lock() {
        Ok(rx) => rx,
        Err(_) => {
            debug!("[sid={}] second polling request, closing session", sid);
            socket.close(DisconnectReason::MultipleHttpPollingError);
            return Err(Error::PollingOverlap);
        }
    };

    // jsonp forces the base64 fallback, the payload must stay valid js
    let supports_binary = socket.supports_binary && jsonp.is_none();
    let payload = match socket.pauser.begin() {
        Some(_worker) => {
            payload::encoder(&mut rx, &socket.pauser, supports_binary, engine.config.max_payload)
                .await?
        }
        // buffer paused by an upgrade, release the client immediately
        None => payload::encode_payload(vec![Packet::Noop], false)?,
    };
    debug!("[sid={}] flushing {} bytes", sid, payload.data.len());
    write_response(payload, jsonp)
}

/// Handle client packets posted on the polling transport.
pub async fn post_req<H, R, B>(
    engine: Arc<EngineIo<H>>,
    sid: Sid,
    req: Request<R>,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: EngineIoHandler,
    R: http_body::Body + Unpin,
    R::Error: std::fmt::Debug,
{
    let socket = engine.get_socket(sid)?;
    if !socket.is_http() {
        return Err(Error::TransportMismatch);
    }
    // one POST at a time per session
    let post_guard = socket.post_lock.try_lock();
    if post_guard.is_err() {
        return Err(Error::PollingOverlap);
    }

    let binary = is_binary_content_type(req.headers())?;
    let packets =
        match payload::decoder(req.into_body(), binary, engine.config.max_payload).await {
            Ok(packets) => packets,
            Err(e @ (Error::PayloadTooLarge | Error::HttpBody)) => return Err(e),
            Err(e) => {
                debug!("[sid={}] error decoding payload: {:?}", sid, e);
                socket.close(DisconnectReason::PacketParsingError);
                return Err(e);
            }
        };

    for packet in packets {
        match packet {
            Packet::Close => {
                debug!("[sid={}] close packet received", sid);
                engine.close_session(sid, DisconnectReason::TransportClose);
                break;
            }
            Packet::Ping(data) => socket.ping_received(data)?,
            Packet::Message(msg) => engine.handler.on_message(msg, socket.clone()),
            Packet::Binary(data) => engine.handler.on_binary(data, socket.clone()),
            packet => {
                debug!("[sid={}] unexpected packet: {:?}", sid, packet);
                socket.close(DisconnectReason::PacketParsingError);
                return Err(Error::BadPacket(packet));
            }
        }
    }

    http_response(StatusCode::OK, "ok", TEXT_MIME)
}

/// Respond to a CORS preflight for the polling endpoint.
pub fn preflight_req<B>() -> Result<Response<ResponseBody<B>>, Error> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Headers", CONTENT_TYPE)
        .body(ResponseBody::empty_response())
        .map_err(Error::Http)
}

fn write_response<B>(
    payload: payload::Payload,
    jsonp: Option<String>,
) -> Result<Response<ResponseBody<B>>, Error> {
    match jsonp {
        Some(j) => {
            let text = std::str::from_utf8(&payload.data)?;
            let body = format!("___eio[{}](\"{}\");", j, js_escape(text));
            http_response(StatusCode::OK, body, JAVASCRIPT_MIME)
        }
        None if payload.has_binary => http_response(StatusCode::OK, payload.data, BINARY_MIME),
        None => http_response(StatusCode::OK, payload.data, TEXT_MIME),
    }
}

fn http_response<B, D: Into<Bytes>>(
    status: StatusCode,
    data: D,
    content_type: &'static str,
) -> Result<Response<ResponseBody<B>>, Error> {
    let body: Bytes = data.into();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, body.len())
        .body(ResponseBody::custom_response(Full::new(body)))
        .map_err(Error::Http)
}

/// POST bodies are either `text/plain` (string framing) or
/// `application/octet-stream` (binary framing). Anything else is rejected.
fn is_binary_content_type(headers: &HeaderMap) -> Result<bool, Error> {
    match headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        Some(content_type) => {
            let mime = content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim();
            match mime {
                BINARY_MIME => Ok(true),
                "text/plain" => Ok(false),
                _ => Err(Error::UnsupportedMediaType),
            }
        }
        None => Ok(false),
    }
}

/// Escape a payload so it can be embedded in a js string literal, for the
/// jsonp fallback.
fn js_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\'' | '<' | '>' | '&' | '=' => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_escape_quotes_and_tags() {
        assert_eq!(js_escape("4\"hi\""), "4\\\"hi\\\"");
        assert_eq!(js_escape("<script>"), "\\u003Cscript\\u003E");
        assert_eq!(js_escape("a\nb"), "a\\nb");
        assert_eq!(js_escape("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn content_type_negotiation() {
        let mut headers = HeaderMap::new();
        assert!(!is_binary_content_type(&headers).unwrap());

        headers.insert(CONTENT_TYPE, "text/plain; charset=UTF-8".parse().unwrap());
        assert!(!is_binary_content_type(&headers).unwrap());

        headers.insert(CONTENT_TYPE, "application/octet-stream".parse().unwrap());
        assert!(is_binary_content_type(&headers).unwrap());

        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        assert!(is_binary_content_type(&headers).is_err());
    }
}
