use std::sync::Arc;
use std::time::Duration;

use futures::future::Future;

use crate::adapter::{Adapter, LocalAdapter};
use crate::client::Client;
use crate::config::{SocketIoConfig, TransportType};
use crate::layer::SocketIoLayer;
use crate::operators::Operators;
use crate::service::SocketIoService;
use crate::socket::Socket;

/// A builder over [`SocketIoConfig`], finished with
/// [`build_svc`](Self::build_svc) or [`build_layer`](Self::build_layer).
#[derive(Debug, Clone, Default)]
pub struct SocketIoBuilder {
    config: SocketIoConfig,
}

impl SocketIoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The url path the server answers on (default: `/socket.io`).
    pub fn req_path(mut self, req_path: impl Into<String>) -> Self {
        self.config.engine_config.req_path = req_path.into();
        self
    }

    /// The interval the client is expected to ping at (default: 25s).
    pub fn ping_interval(mut self, ping_interval: Duration) -> Self {
        self.config.engine_config.ping_interval = ping_interval;
        self
    }

    /// The grace period on top of the interval before a session is
    /// considered dead (default: 60s).
    pub fn ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.config.engine_config.ping_timeout = ping_timeout;
        self
    }

    /// The size of the per-session outgoing packet buffer (default: 128).
    pub fn max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.config.engine_config.max_buffer_size = max_buffer_size;
        self
    }

    /// The maximum size of an http payload in bytes (default: 100kb).
    pub fn max_payload(mut self, max_payload: u64) -> Self {
        self.config.engine_config.max_payload = max_payload;
        self
    }

    /// The allowed transports (default: polling and websocket).
    pub fn transports(mut self, transports: impl Into<Vec<TransportType>>) -> Self {
        let transports = transports.into();
        assert!(!transports.is_empty());
        self.config.engine_config.transports = transports;
        self
    }

    /// How long an [`emit_with_ack`](Socket::emit_with_ack) waits for the
    /// client response (default: 5s).
    pub fn ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.config.ack_timeout = ack_timeout;
        self
    }

    /// Build a standalone service with the given adapter.
    pub fn build_svc<A: Adapter>(self) -> (SocketIoService<A>, SocketIo<A>) {
        let (svc, client) = SocketIoService::new(self.config);
        (svc, SocketIo(client))
    }

    /// Build a [`tower::Layer`] with the given adapter.
    pub fn build_layer<A: Adapter>(self) -> (SocketIoLayer<A>, SocketIo<A>) {
        let client = Arc::new(Client::new(self.config));
        (SocketIoLayer::new(client.clone()), SocketIo(client))
    }
}

/// The socket.io server handle: registers namespaces and broadcasts from
/// outside any handler.
#[derive(Debug)]
pub struct SocketIo<A: Adapter = LocalAdapter>(Arc<Client<A>>);

impl SocketIo<LocalAdapter> {
    /// A service with the default config and the in-process adapter.
    pub fn new_svc() -> (SocketIoService<LocalAdapter>, SocketIo) {
        Self::builder().build_svc()
    }

    /// A layer with the default config and the in-process adapter.
    pub fn new_layer() -> (SocketIoLayer<LocalAdapter>, SocketIo) {
        Self::builder().build_layer()
    }

    pub fn builder() -> SocketIoBuilder {
        SocketIoBuilder::new()
    }
}

impl<A: Adapter> SocketIo<A> {
    /// Register a namespace under the given path. The callback runs for
    /// every socket connecting to it.
    ///
    /// ```no_run
    /// # use tetherio::SocketIo;
    /// # let (_, io) = SocketIo::new_svc();
    /// io.ns("/chat", |socket| async move {
    ///     println!("socket {} joined /chat", socket.sid);
    /// });
    /// ```
    pub fn ns<F, Fut>(&self, path: impl Into<String>, callback: F)
    where
        F: Fn(Arc<Socket<A>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.0.add_ns(path.into(), callback)
    }

    /// Broadcast operators anchored on a whole namespace, or `None` if the
    /// path is not registered.
    ///
    /// ```no_run
    /// # use tetherio::SocketIo;
    /// # let (_, io) = SocketIo::new_svc();
    /// io.of("/chat").unwrap().to("room1").emit("hello", "world").ok();
    /// ```
    pub fn of(&self, path: impl AsRef<str>) -> Option<Operators<A>> {
        self.0
            .get_ns(path.as_ref())
            .map(|ns| Operators::new(ns, None).broadcast())
    }

    /// Disconnect every socket of every namespace.
    pub fn close(&self) {
        self.0.close()
    }
}

impl<A: Adapter> Clone for SocketIo<A> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
