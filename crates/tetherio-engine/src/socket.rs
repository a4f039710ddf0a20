use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::request::Parts;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::EngineIoConfig;
use crate::errors::Error;
use crate::packet::{Packet, SendPacket};
use crate::payload::Pauser;
use crate::sid::Sid;
use crate::transport::TransportType;

/// Why a session was closed, passed to
/// [`EngineIoHandler::on_disconnect`](crate::handler::EngineIoHandler::on_disconnect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent a close packet.
    TransportClose,
    /// The transport failed, e.g. the websocket connection errored.
    TransportError,
    /// The client stopped sending pings within
    /// `ping_interval + ping_timeout`.
    HeartbeatTimeout,
    /// A second polling GET was opened while one was still in flight.
    MultipleHttpPollingError,
    /// The client sent a packet that could not be parsed.
    PacketParsingError,
    /// The server is shutting the session down.
    ClosingServer,
}

/// Callback wired to the engine's session teardown, invoked by
/// [`Socket::close`].
pub type CloseFn = Box<dyn Fn(Sid, DisconnectReason) + Send + Sync + 'static>;

/// An engine.io session.
///
/// The socket abstracts over the transport currently in use: packets queued
/// with [`send`](Socket::send) are flushed by the next polling request or
/// forwarded on the websocket connection, whichever the session is bound to.
pub struct Socket<D>
where
    D: Default + Send + Sync + 'static,
{
    /// The session id.
    pub id: Sid,

    /// Current transport, stored as a [`TransportType`] tag so it can be
    /// swapped atomically during an upgrade.
    transport: AtomicU8,

    /// Receiving end of the packet buffer. Locked by the polling flush or
    /// the websocket forward task; a failed `try_lock` on the polling side
    /// means a concurrent GET is in flight.
    pub(crate) internal_rx: tokio::sync::Mutex<mpsc::Receiver<Packet>>,
    internal_tx: mpsc::Sender<Packet>,

    /// Guards against concurrent POST requests for the same session.
    pub(crate) post_lock: tokio::sync::Mutex<()>,

    /// Coordinates polling flushes with transport upgrades.
    pub(crate) pauser: Arc<Pauser>,

    heartbeat_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    heartbeat_tx: mpsc::Sender<()>,
    heartbeat_handle: Mutex<Option<JoinHandle<()>>>,

    close_fn: CloseFn,

    /// Whether the client accepts the binary payload framing.
    /// `false` when the handshake carried `b64=1` or used jsonp.
    pub(crate) supports_binary: bool,

    /// The http request that opened the session, kept around for
    /// handshake inspection by upper layers.
    pub req_parts: Parts,

    /// Arbitrary data associated with the socket by the handler.
    pub data: D,
}

impl<D> Socket<D>
where
    D: Default + Send + Sync + 'static,
{
    pub(crate) fn new(
        sid: Sid,
        transport: TransportType,
        config: &EngineIoConfig,
        req_parts: Parts,
        supports_binary: bool,
        close_fn: CloseFn,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::channel(config.max_buffer_size);
        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(1);
        Self {
            id: sid,
            transport: AtomicU8::new(transport.into()),
            internal_rx: tokio::sync::Mutex::new(internal_rx),
            internal_tx,
            post_lock: tokio::sync::Mutex::new(()),
            pauser: Pauser::new(),
            heartbeat_rx: tokio::sync::Mutex::new(heartbeat_rx),
            heartbeat_tx,
            heartbeat_handle: Mutex::new(None),
            close_fn,
            supports_binary,
            req_parts,
            data: D::default(),
        }
    }

    /// Send a [`SendPacket`] to the client.
    ///
    /// Fails when the session buffer is full or the session is closed; the
    /// packet is handed back in the error.
    pub fn emit(&self, packet: SendPacket) -> Result<(), TrySendError<SendPacket>> {
        self.send(packet.into()).map_err(|e| match e {
            TrySendError::Full(p) => TrySendError::Full(into_send_packet(p)),
            TrySendError::Closed(p) => TrySendError::Closed(into_send_packet(p)),
        })
    }

    /// Queue a raw packet for the client.
    pub(crate) fn send(&self, packet: Packet) -> Result<(), TrySendError<Packet>> {
        debug!("[sid={}] sending packet: {:?}", self.id, packet);
        self.internal_tx.try_send(packet)
    }

    /// Handle a ping from the client: feed the heartbeat watchdog and echo
    /// the payload back in a pong.
    pub(crate) fn ping_received(&self, payload: String) -> Result<(), Error> {
        self.heartbeat_tx.try_send(()).ok();
        self.send(Packet::Pong(payload))?;
        Ok(())
    }

    /// Spawn the watchdog that closes the session when the client stops
    /// pinging. The client drives the heartbeat: the server only waits.
    pub(crate) fn spawn_heartbeat(self: &Arc<Self>, interval: Duration, timeout: Duration) {
        let socket = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = socket.heartbeat_job(interval, timeout).await {
                debug!("[sid={}] heartbeat error: {:?}", socket.id, e);
                socket.close(DisconnectReason::HeartbeatTimeout);
            }
        });
        let old = self
            .heartbeat_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(old) = old {
            old.abort();
        }
    }

    async fn heartbeat_job(&self, interval: Duration, timeout: Duration) -> Result<(), Error> {
        let mut heartbeat_rx = self
            .heartbeat_rx
            .try_lock()
            .map_err(|_| Error::HeartbeatTimeout)?;
        debug!("[sid={}] heartbeat routine started", self.id);
        loop {
            tokio::time::timeout(interval + timeout, heartbeat_rx.recv())
                .await
                .map_err(|_| Error::HeartbeatTimeout)?
                .ok_or(Error::HeartbeatTimeout)?;
        }
    }

    pub(crate) fn abort_heartbeat(&self) {
        if let Some(handle) = self
            .heartbeat_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }

    /// Close the session. The engine drops it from the session map and
    /// notifies the handler with the given reason.
    pub fn close(&self, reason: DisconnectReason) {
        (self.close_fn)(self.id, reason);
    }

    pub(crate) fn is_ws(&self) -> bool {
        self.transport.load(Ordering::SeqCst) == u8::from(TransportType::Websocket)
    }

    pub(crate) fn is_http(&self) -> bool {
        self.transport.load(Ordering::SeqCst) == u8::from(TransportType::Polling)
    }

    /// The transport this session is currently bound to.
    pub fn transport_type(&self) -> TransportType {
        TransportType::try_from(self.transport.load(Ordering::SeqCst))
            .unwrap_or(TransportType::Polling)
    }

    /// Rebind the session to the websocket transport, called at the end of
    /// a successful upgrade handshake.
    pub(crate) fn upgrade_to_websocket(&self) {
        self.transport
            .store(u8::from(TransportType::Websocket), Ordering::SeqCst);
    }

    /// Build a detached socket, not wired to any engine.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn new_dummy(sid: Sid, close_fn: CloseFn) -> Arc<Socket<D>> {
        let (parts, _) = http::Request::get("http://127.0.0.1/engine.io")
            .body(())
            .unwrap()
            .into_parts();
        Arc::new(Socket::new(
            sid,
            TransportType::Polling,
            &EngineIoConfig::default(),
            parts,
            true,
            close_fn,
        ))
    }
}

impl<D> fmt::Debug for Socket<D>
where
    D: Default + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("transport", &self.transport_type())
            .field("supports_binary", &self.supports_binary)
            .finish()
    }
}

fn into_send_packet(packet: Packet) -> SendPacket {
    match packet {
        Packet::Message(msg) => SendPacket::Message(msg),
        Packet::Binary(data) => SendPacket::Binary(data),
        // only message packets transit through emit
        _ => SendPacket::Message(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn heartbeat_timeout_closes_the_socket() {
        let (tx, mut rx) = mpsc::channel(1);
        let socket: Arc<Socket<()>> = Socket::new_dummy(
            Sid::ZERO,
            Box::new(move |_, reason| {
                tx.try_send(reason).ok();
            }),
        );
        socket.spawn_heartbeat(Duration::from_millis(20), Duration::from_millis(20));
        let reason = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("heartbeat should have timed out")
            .unwrap();
        assert_eq!(reason, DisconnectReason::HeartbeatTimeout);
    }

    #[tokio::test]
    async fn ping_feeds_the_heartbeat_and_echoes_a_pong() {
        let socket: Arc<Socket<()>> = Socket::new_dummy(Sid::ZERO, Box::new(|_, _| {}));
        socket.spawn_heartbeat(Duration::from_millis(50), Duration::from_millis(50));
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            socket.ping_received("".to_string()).unwrap();
        }
        let mut rx = socket.internal_rx.try_lock().unwrap();
        assert_eq!(rx.try_recv().unwrap(), Packet::Pong("".to_string()));
    }

    #[tokio::test]
    async fn emit_fails_when_the_buffer_is_full() {
        let socket: Arc<Socket<()>> = Socket::new_dummy(Sid::ZERO, Box::new(|_, _| {}));
        let max = EngineIoConfig::default().max_buffer_size;
        for _ in 0..max {
            socket.emit(SendPacket::Message("a".to_string())).unwrap();
        }
        assert!(matches!(
            socket.emit(SendPacket::Message("a".to_string())),
            Err(TrySendError::Full(_))
        ));
    }
}
