use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::future::Future;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::adapter::{Adapter, Room};
use crate::client::SocketData;
use crate::config::SocketIoConfig;
use crate::errors::{AckError, Error, SendError};
use crate::handler::{AckResponse, AckSender, MessageCaller, MessageHandler};
use crate::handshake::Handshake;
use crate::ns::Namespace;
use crate::operators::Operators;
use crate::packet::{Packet, PacketData};
use tetherio_engine::{SendPacket, Sid};

type EIoSocket = tetherio_engine::Socket<SocketData>;

/// Why a socket was disconnected from its namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The underlying engine.io session was closed by the client.
    TransportClose,
    /// The underlying transport failed.
    TransportError,
    /// The client stopped sending heartbeats.
    HeartbeatTimeout,
    /// Two polling requests overlapped on the session.
    MultipleHttpPolling,
    /// The client sent an unparseable packet.
    PacketParsing,
    /// The client left this namespace with a disconnect packet; the
    /// engine.io session stays open.
    ClientNSDisconnect,
    /// The server kicked the socket out of the namespace.
    ServerNSDisconnect,
    /// The server is shutting down.
    ClosingServer,
}

impl From<tetherio_engine::DisconnectReason> for DisconnectReason {
    fn from(reason: tetherio_engine::DisconnectReason) -> Self {
        use tetherio_engine::DisconnectReason as EIo;
        match reason {
            EIo::TransportClose => DisconnectReason::TransportClose,
            EIo::TransportError => DisconnectReason::TransportError,
            EIo::HeartbeatTimeout => DisconnectReason::HeartbeatTimeout,
            EIo::MultipleHttpPollingError => DisconnectReason::MultipleHttpPolling,
            EIo::PacketParsingError => DisconnectReason::PacketParsing,
            EIo::ClosingServer => DisconnectReason::ClosingServer,
        }
    }
}

type DisconnectCallback<A> = Box<dyn Fn(Arc<Socket<A>>, DisconnectReason) + Send + Sync>;
type ErrorCallback<A> = Box<dyn Fn(Arc<Socket<A>>, Error) + Send + Sync>;

/// A client connected to a [`Namespace`].
pub struct Socket<A: Adapter> {
    ns: Arc<Namespace<A>>,
    message_handlers: RwLock<HashMap<String, Box<dyn MessageCaller<A>>>>,
    disconnect_handler: Mutex<Option<DisconnectCallback<A>>>,
    error_handler: Mutex<Option<ErrorCallback<A>>>,
    ack_message: Mutex<HashMap<i64, oneshot::Sender<AckResponse<Value>>>>,
    ack_counter: AtomicI64,
    connected: AtomicBool,
    config: Arc<SocketIoConfig>,
    esocket: Arc<EIoSocket>,
    /// The connection context: http request of the session plus the
    /// namespace connect query.
    pub handshake: Handshake,
    /// The socket id, shared with the engine.io session.
    pub sid: Sid,
}

impl<A: Adapter> Socket<A> {
    pub(crate) fn new(
        ns: Arc<Namespace<A>>,
        sid: Sid,
        esocket: Arc<EIoSocket>,
        handshake: Handshake,
        config: Arc<SocketIoConfig>,
    ) -> Self {
        Self {
            ns,
            message_handlers: RwLock::new(HashMap::new()),
            disconnect_handler: Mutex::new(None),
            error_handler: Mutex::new(None),
            ack_message: Mutex::new(HashMap::new()),
            ack_counter: AtomicI64::new(0),
            connected: AtomicBool::new(true),
            config,
            esocket,
            handshake,
            sid,
        }
    }

    /// Register an async callback for the given event. The json payload is
    /// deserialized into `Param`; binary attachments and an [`AckSender`]
    /// are handed alongside.
    ///
    /// ```no_run
    /// # use tetherio::{SocketIo, AckSender};
    /// # let (_, io) = SocketIo::new_svc();
    /// io.ns("/", |socket| async move {
    ///     socket.on("ping", |_socket, data: String, _bin, ack: AckSender<_>| async move {
    ///         ack.send(data).ok();
    ///     });
    /// });
    /// ```
    pub fn on<Param, F, Fut>(&self, event: impl Into<String>, callback: F)
    where
        Param: DeserializeOwned + Send + Sync + 'static,
        F: Fn(Arc<Socket<A>>, Param, Vec<Vec<u8>>, AckSender<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.message_handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                event.into(),
                Box::new(MessageHandler {
                    handler: callback,
                    param: std::marker::PhantomData,
                }),
            );
    }

    /// Register a callback invoked when the socket leaves the namespace,
    /// with the reason of the disconnection.
    pub fn on_disconnect<F>(&self, callback: F)
    where
        F: Fn(Arc<Socket<A>>, DisconnectReason) + Send + Sync + 'static,
    {
        *self
            .disconnect_handler
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Box::new(callback));
    }

    /// Register a callback for protocol errors on this socket, e.g. an
    /// event payload that does not bind to the handler parameter type.
    /// Without one, errors are only logged.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(Arc<Socket<A>>, Error) + Send + Sync + 'static,
    {
        *self
            .error_handler
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Box::new(callback));
    }

    /// Emit an event to this socket.
    pub fn emit(&self, event: &str, data: impl Serialize) -> Result<(), SendError> {
        let data = serde_json::to_value(data)?;
        self.send(Packet::event(&self.ns.path, event, data))
    }

    /// Emit an event and wait for the client's acknowledgement, with the
    /// configured [`ack_timeout`](SocketIoConfig::ack_timeout).
    pub async fn emit_with_ack<V>(
        &self,
        event: &str,
        data: impl Serialize,
    ) -> Result<AckResponse<V>, AckError>
    where
        V: DeserializeOwned,
    {
        let data = serde_json::to_value(data).map_err(SendError::Serialize)?;
        let packet = Packet::event(&self.ns.path, event, data);
        self.send_with_ack(packet, None).await
    }

    // Room operations, delegated to the namespace adapter.

    pub fn join(&self, rooms: Vec<Room>) {
        self.ns.adapter.add_all(self.sid, rooms)
    }

    pub fn leave(&self, room: Room) {
        self.ns.adapter.del(self.sid, room)
    }

    pub fn leave_all(&self) {
        self.ns.adapter.del_all(self.sid)
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.ns.adapter.socket_rooms(self.sid)
    }

    // Broadcast operators, anchored on this socket.

    /// Select a room to broadcast to, excluding this socket.
    pub fn to(&self, room: impl Into<Room>) -> Operators<A> {
        self.operators().to(room)
    }

    /// Select a room to broadcast to, including this socket if it is in
    /// the room.
    pub fn within(&self, room: impl Into<Room>) -> Operators<A> {
        self.operators().within(room)
    }

    /// Exclude every socket of the given room from the broadcast.
    pub fn except(&self, room: impl Into<Room>) -> Operators<A> {
        self.operators().except(room)
    }

    /// Broadcast to every socket of the namespace but this one.
    pub fn broadcast(&self) -> Operators<A> {
        self.operators().broadcast()
    }

    /// Keep the next operation on this server node.
    pub fn local(&self) -> Operators<A> {
        self.operators().local()
    }

    /// Override the ack timeout for the next emit.
    pub fn timeout(&self, timeout: Duration) -> Operators<A> {
        self.operators().timeout(timeout)
    }

    /// Attach binary payloads to the next emit.
    pub fn bin(&self, binary: Vec<Vec<u8>>) -> Operators<A> {
        self.operators().bin(binary)
    }

    /// Disconnect the socket from its namespace. The engine.io session
    /// stays open, the client may reconnect to the namespace.
    pub fn disconnect(self: &Arc<Self>) -> Result<(), SendError> {
        self.send(Packet::disconnect(&self.ns.path))?;
        self.clone().close(DisconnectReason::ServerNSDisconnect);
        Ok(())
    }

    /// Whether the socket is still connected to its namespace.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The namespace path of this socket.
    pub fn ns(&self) -> String {
        self.ns.path.clone()
    }

    fn operators(&self) -> Operators<A> {
        Operators::new(self.ns.clone(), Some(self.sid))
    }

    /// Serialize and queue a packet on the engine.io session, the binary
    /// attachments following as separate binary packets.
    pub(crate) fn send(&self, mut packet: Packet) -> Result<(), SendError> {
        let binary = match &mut packet.inner {
            PacketData::BinaryEvent(_, bin, _) | PacketData::BinaryAck(bin, _) => {
                std::mem::take(&mut bin.bin)
            }
            _ => vec![],
        };
        let msg: String = packet.try_into()?;
        self.esocket.emit(SendPacket::Message(msg))?;
        for payload in binary {
            self.esocket.emit(SendPacket::Binary(payload))?;
        }
        Ok(())
    }

    /// Send a packet with a fresh ack id and wait for the response.
    pub(crate) async fn send_with_ack<V>(
        &self,
        mut packet: Packet,
        timeout: Option<Duration>,
    ) -> Result<AckResponse<V>, AckError>
    where
        V: DeserializeOwned,
    {
        let (tx, rx) = oneshot::channel();
        let ack_id = self.ack_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.ack_message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(ack_id, tx);
        packet.set_ack_id(ack_id);
        self.send(packet)?;

        let timeout = timeout.unwrap_or(self.config.ack_timeout);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok((data, binary))) => Ok((serde_json::from_value(data)?, binary)),
            Ok(Err(e)) => Err(e.into()),
            Err(elapsed) => {
                self.ack_message
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&ack_id);
                Err(elapsed.into())
            }
        }
    }

    /// Dispatch an incoming packet addressed to this socket.
    pub(crate) fn recv(self: Arc<Self>, packet: PacketData) -> Result<(), Error> {
        match packet {
            PacketData::Event(e, data, ack_id) => self.recv_event(e, data, vec![], ack_id),
            PacketData::BinaryEvent(e, bin, ack_id) => {
                self.recv_event(e, bin.data, bin.bin, ack_id)
            }
            PacketData::EventAck(data, ack_id) => self.recv_ack(data, vec![], ack_id),
            PacketData::BinaryAck(bin, ack_id) => self.recv_ack(bin.data, bin.bin, ack_id),
            PacketData::Disconnect => {
                self.close(DisconnectReason::ClientNSDisconnect);
                Ok(())
            }
            _ => Err(Error::InvalidPacketType),
        }
    }

    fn recv_event(
        self: Arc<Self>,
        e: String,
        data: Value,
        binary: Vec<Vec<u8>>,
        ack_id: Option<i64>,
    ) -> Result<(), Error> {
        let res = {
            let handlers = self
                .message_handlers
                .read()
                .unwrap_or_else(|e| e.into_inner());
            match handlers.get(&e) {
                Some(handler) => handler.call(self.clone(), data, binary, ack_id),
                // unknown events are dropped
                None => Ok(()),
            }
        };
        if let Err(err) = res {
            debug!("[sid={}] error dispatching event {}: {}", self.sid, e, err);
            self.report_error(err);
        }
        Ok(())
    }

    fn recv_ack(&self, data: Value, binary: Vec<Vec<u8>>, ack_id: i64) -> Result<(), Error> {
        // a late ack, after a timeout, lands here with no receiver and is
        // dropped silently
        if let Some(tx) = self
            .ack_message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&ack_id)
        {
            tx.send((data, binary)).ok();
        }
        Ok(())
    }

    /// Invoke the error callback if one is registered.
    pub(crate) fn report_error(self: &Arc<Self>, err: Error) {
        let handler = self.error_handler.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handler) = handler.as_ref() {
            handler(self.clone(), err);
        }
    }

    /// Remove the socket from the namespace and run the disconnect
    /// callback. Pending acks are dropped and resolve with an error.
    pub(crate) fn close(self: Arc<Self>, reason: DisconnectReason) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.ns.remove_socket(self.sid);
            self.ack_message
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
            let handler = self
                .disconnect_handler
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(handler) = handler {
                handler(self.clone(), reason);
            }
        }
    }
}

impl<A: Adapter> fmt::Debug for Socket<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("sid", &self.sid)
            .field("ns", &self.ns.path)
            .field("connected", &self.connected())
            .finish()
    }
}
