use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use http::request::Parts;
use tracing::debug;

use crate::config::EngineIoConfig;
use crate::errors::Error;
use crate::handler::EngineIoHandler;
use crate::packet::Packet;
use crate::sid::Sid;
use crate::socket::{DisconnectReason, Socket};
use crate::transport::TransportType;

/// The engine: owns the session map and hands requests over to the
/// transports.
pub struct EngineIo<H: EngineIoHandler> {
    sockets: RwLock<HashMap<Sid, Arc<Socket<H::Data>>>>,
    /// Monotonic session id allocator, local to this engine instance.
    sid_counter: AtomicU64,
    pub config: EngineIoConfig,
    pub handler: H,
}

impl<H: EngineIoHandler> EngineIo<H> {
    pub fn new(handler: H, config: EngineIoConfig) -> Self {
        Self {
            sockets: RwLock::new(HashMap::new()),
            sid_counter: AtomicU64::new(1),
            config,
            handler,
        }
    }

    /// Create a new session bound to the given transport and start its
    /// heartbeat watchdog.
    pub(crate) fn create_session(
        self: &Arc<Self>,
        transport: TransportType,
        req_parts: Parts,
        supports_binary: bool,
    ) -> Arc<Socket<H::Data>> {
        let sid = Sid::new(self.sid_counter.fetch_add(1, Ordering::Relaxed));
        let engine = Arc::downgrade(self);
        let close_fn = Box::new(move |sid: Sid, reason: DisconnectReason| {
            if let Some(engine) = engine.upgrade() {
                engine.close_session(sid, reason);
            }
        });
        let socket = Arc::new(Socket::new(
            sid,
            transport,
            &self.config,
            req_parts,
            supports_binary,
            close_fn,
        ));
        self.sockets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(sid, socket.clone());
        debug!("[sid={}] new {} session", sid, transport);

        socket.spawn_heartbeat(self.config.ping_interval, self.config.ping_timeout);
        self.handler.on_connect(socket.clone());
        socket
    }

    pub(crate) fn get_socket(&self, sid: Sid) -> Result<Arc<Socket<H::Data>>, Error> {
        self.sockets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&sid)
            .cloned()
            .ok_or(Error::UnknownSessionID(sid))
    }

    /// Close a session: drop it from the session map, stop its heartbeat
    /// and notify the handler. A final close packet is queued so the
    /// transport tears itself down.
    pub(crate) fn close_session(&self, sid: Sid, reason: DisconnectReason) {
        let socket = self
            .sockets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&sid);
        if let Some(socket) = socket {
            socket.abort_heartbeat();
            socket.send(Packet::Close).ok();
            self.handler.on_disconnect(socket, reason);
            debug!("[sid={}] session closed: {:?}", sid, reason);
        }
    }

    #[cfg(test)]
    pub(crate) fn socket_count(&self) -> usize {
        self.sockets.read().unwrap().len()
    }
}

impl<H: EngineIoHandler> std::fmt::Debug for EngineIo<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineIo")
            .field("config", &self.config)
            .finish()
    }
}
