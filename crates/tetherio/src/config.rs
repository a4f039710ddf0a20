use std::time::Duration;

pub use tetherio_engine::config::{EngineIoConfig, EngineIoConfigBuilder};
pub use tetherio_engine::TransportType;

/// Configuration for the socket.io server, wrapping the engine.io
/// configuration.
#[derive(Debug, Clone)]
pub struct SocketIoConfig {
    pub engine_config: EngineIoConfig,

    /// Default timeout when waiting for an ack response. Defaults to 5
    /// seconds, overridable per emit with
    /// [`Operators::timeout`](crate::Operators::timeout).
    pub ack_timeout: Duration,
}

impl Default for SocketIoConfig {
    fn default() -> Self {
        Self {
            engine_config: EngineIoConfig {
                req_path: "/socket.io".to_string(),
                ..Default::default()
            },
            ack_timeout: Duration::from_secs(5),
        }
    }
}
