use http::{Method, Request};

use crate::config::EngineIoConfig;
use crate::errors::Error;
use crate::sid::Sid;
use crate::transport::TransportType;

/// The engine.io request parameters, parsed from the query string.
#[derive(Debug)]
pub struct RequestInfo {
    /// The session id, absent on handshake requests.
    pub sid: Option<Sid>,
    /// The requested transport.
    pub transport: TransportType,
    /// The http method.
    pub method: Method,
    /// `b64=1`: the client cannot handle the binary payload framing.
    pub b64: bool,
    /// `j=<n>`: jsonp fallback, responses are wrapped in a
    /// `___eio[<n>]("...")` callback.
    pub jsonp: Option<String>,
}

impl RequestInfo {
    pub fn parse<B>(req: &Request<B>, config: &EngineIoConfig) -> Result<Self, Error> {
        let query = req.uri().query().ok_or(Error::UnknownTransport)?;

        if !query.split('&').any(|s| s == "EIO=3") {
            return Err(Error::UnsupportedProtocolVersion);
        }

        let transport: TransportType = query
            .split('&')
            .find_map(|s| s.strip_prefix("transport="))
            .ok_or(Error::UnknownTransport)?
            .parse()?;
        if !config.allows_transport(transport) {
            return Err(Error::UnknownTransport);
        }

        let sid = query
            .split('&')
            .find_map(|s| s.strip_prefix("sid="))
            .map(|s| s.parse().map_err(|_| Error::InvalidQuery))
            .transpose()?;

        let method = req.method().clone();
        if sid.is_none() && method != Method::GET && method != Method::OPTIONS {
            return Err(Error::BadHandshakeMethod);
        }

        let b64 = query.split('&').any(|s| s == "b64=1");

        let jsonp = query
            .split('&')
            .find_map(|s| s.strip_prefix("j="))
            .map(ToString::to_string);
        if let Some(j) = &jsonp {
            if j.is_empty() || !j.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::InvalidQuery);
            }
        }

        Ok(RequestInfo {
            sid,
            transport,
            method,
            b64,
            jsonp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_request(path: &str) -> Request<()> {
        Request::get(path).body(()).unwrap()
    }

    #[test]
    fn parse_handshake_request() {
        let req = build_request("http://localhost/engine.io/?EIO=3&transport=polling");
        let info = RequestInfo::parse(&req, &EngineIoConfig::default()).unwrap();
        assert_eq!(info.sid, None);
        assert_eq!(info.transport, TransportType::Polling);
        assert_eq!(info.method, Method::GET);
        assert!(!info.b64);
        assert_eq!(info.jsonp, None);
    }

    #[test]
    fn parse_session_request() {
        let req = build_request("http://localhost/engine.io/?EIO=3&transport=websocket&sid=10");
        let info = RequestInfo::parse(&req, &EngineIoConfig::default()).unwrap();
        assert_eq!(info.sid, Some("10".parse().unwrap()));
        assert_eq!(info.transport, TransportType::Websocket);
    }

    #[test]
    fn parse_fallback_flags() {
        let req = build_request("http://localhost/engine.io/?EIO=3&transport=polling&b64=1&j=42");
        let info = RequestInfo::parse(&req, &EngineIoConfig::default()).unwrap();
        assert!(info.b64);
        assert_eq!(info.jsonp.as_deref(), Some("42"));
    }

    #[test]
    fn rejects_bad_jsonp_index() {
        let req =
            build_request("http://localhost/engine.io/?EIO=3&transport=polling&j=alert(1)");
        assert!(matches!(
            RequestInfo::parse(&req, &EngineIoConfig::default()),
            Err(Error::InvalidQuery)
        ));
    }

    #[test]
    fn rejects_wrong_protocol_version() {
        for path in [
            "http://localhost/engine.io/?transport=polling",
            "http://localhost/engine.io/?EIO=4&transport=polling",
        ] {
            assert!(matches!(
                RequestInfo::parse(&build_request(path), &EngineIoConfig::default()),
                Err(Error::UnsupportedProtocolVersion) | Err(Error::UnknownTransport)
            ));
        }
    }

    #[test]
    fn rejects_unknown_transport() {
        let req = build_request("http://localhost/engine.io/?EIO=3&transport=grpc");
        assert!(matches!(
            RequestInfo::parse(&req, &EngineIoConfig::default()),
            Err(Error::UnknownTransport)
        ));
    }

    #[test]
    fn rejects_disabled_transport() {
        let config = EngineIoConfig::builder()
            .transports([TransportType::Polling])
            .build();
        let req = build_request("http://localhost/engine.io/?EIO=3&transport=websocket");
        assert!(matches!(
            RequestInfo::parse(&req, &config),
            Err(Error::UnknownTransport)
        ));
    }

    #[test]
    fn rejects_post_handshake() {
        let req = Request::post("http://localhost/engine.io/?EIO=3&transport=polling")
            .body(())
            .unwrap();
        assert!(matches!(
            RequestInfo::parse(&req, &EngineIoConfig::default()),
            Err(Error::BadHandshakeMethod)
        ));
    }
}
