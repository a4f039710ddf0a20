use std::collections::HashMap;
use std::time::SystemTime;

use http::request::Parts;
use serde::de::DeserializeOwned;

/// Connection context of a socket: the http request that opened the
/// engine.io session plus the query carried by the namespace connect
/// packet.
#[derive(Debug)]
pub struct Handshake {
    /// When the namespace connection was established.
    pub issued: SystemTime,
    /// The url of the http request that opened the session.
    pub url: http::Uri,
    /// The headers of the http request that opened the session.
    pub headers: http::HeaderMap,
    /// Raw query string of the connect packet, e.g. `token=s3cr3t`.
    pub auth: Option<String>,
}

impl Handshake {
    pub(crate) fn new(req_parts: &Parts, auth: Option<String>) -> Self {
        Self {
            issued: SystemTime::now(),
            url: req_parts.uri.clone(),
            headers: req_parts.headers.clone(),
            auth,
        }
    }

    /// The connect query parsed as key/value pairs.
    pub fn query(&self) -> HashMap<&str, &str> {
        self.auth
            .as_deref()
            .unwrap_or_default()
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .collect()
    }

    /// Deserialize the connect query into a struct, every value being a
    /// string.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let map: HashMap<&str, &str> = self.query();
        serde_json::from_value(serde_json::to_value(map)?)
    }
}
