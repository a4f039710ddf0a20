use std::time::Duration;

use crate::transport::TransportType;

/// Configuration for the engine.io engine & transports.
#[derive(Debug, Clone)]
pub struct EngineIoConfig {
    /// The path to the engine.io endpoint, defaults to `/engine.io`.
    pub req_path: String,

    /// The interval at which the client is expected to send ping packets.
    /// Advertised to the client in the open handshake. Defaults to 25 seconds.
    pub ping_interval: Duration,

    /// Grace period added on top of [`ping_interval`](EngineIoConfig::ping_interval)
    /// before a silent session is dropped. Defaults to 60 seconds.
    pub ping_timeout: Duration,

    /// The maximum number of packets buffered for a session before
    /// [`emit`](crate::Socket::emit) starts failing. Defaults to 128 packets.
    ///
    /// If a client polls slower than the server emits, the buffer fills up
    /// and packets are rejected until the next flush.
    pub max_buffer_size: usize,

    /// The maximum size in bytes of an http request body or a payload flushed
    /// to a polling response. Defaults to 100kb.
    pub max_payload: u64,

    /// Allowed transports on this server, defaults to both
    /// [`TransportType::Polling`] and [`TransportType::Websocket`].
    pub transports: Vec<TransportType>,
}

impl Default for EngineIoConfig {
    fn default() -> Self {
        Self {
            req_path: "/engine.io".to_string(),
            ping_interval: Duration::from_secs(25),
            ping_timeout: Duration::from_secs(60),
            max_buffer_size: 128,
            max_payload: 1e5 as u64,
            transports: vec![TransportType::Polling, TransportType::Websocket],
        }
    }
}

impl EngineIoConfig {
    pub fn builder() -> EngineIoConfigBuilder {
        EngineIoConfigBuilder::new()
    }

    pub(crate) fn allows_transport(&self, transport: TransportType) -> bool {
        self.transports.contains(&transport)
    }
}

#[derive(Debug, Default)]
pub struct EngineIoConfigBuilder {
    config: EngineIoConfig,
}

impl EngineIoConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineIoConfig::default(),
        }
    }

    /// The path to the engine.io endpoint, defaults to `/engine.io`.
    pub fn req_path(mut self, req_path: impl Into<String>) -> Self {
        self.config.req_path = req_path.into();
        self
    }

    /// The interval at which the client is expected to ping, defaults to 25 seconds.
    pub fn ping_interval(mut self, ping_interval: Duration) -> Self {
        self.config.ping_interval = ping_interval;
        self
    }

    /// The extra delay tolerated past the ping interval, defaults to 60 seconds.
    pub fn ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.config.ping_timeout = ping_timeout;
        self
    }

    /// The maximum number of packets buffered per session, defaults to 128 packets.
    pub fn max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.config.max_buffer_size = max_buffer_size;
        self
    }

    /// The maximum size in bytes of request bodies and flushed payloads, defaults to 100kb.
    pub fn max_payload(mut self, max_payload: u64) -> Self {
        self.config.max_payload = max_payload;
        self
    }

    /// Allowed transports on this server, defaults to polling and websocket.
    pub fn transports(mut self, transports: impl Into<Vec<TransportType>>) -> Self {
        let transports = transports.into();
        assert!(!transports.is_empty(), "at least one transport is required");
        self.config.transports = transports;
        self
    }

    pub fn build(self) -> EngineIoConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = EngineIoConfig::builder()
            .ping_interval(Duration::from_millis(400))
            .ping_timeout(Duration::from_millis(200))
            .max_buffer_size(1000)
            .max_payload(2e6 as u64)
            .req_path("/test".to_string())
            .transports([TransportType::Polling])
            .build();
        assert_eq!(config.ping_interval, Duration::from_millis(400));
        assert_eq!(config.ping_timeout, Duration::from_millis(200));
        assert_eq!(config.max_buffer_size, 1000);
        assert_eq!(config.max_payload, 2e6 as u64);
        assert_eq!(config.req_path, "/test".to_string());
        assert!(config.allows_transport(TransportType::Polling));
        assert!(!config.allows_transport(TransportType::Websocket));
    }
}
