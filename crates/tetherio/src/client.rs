use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use futures::future::Future;
use serde_json::json;
use tracing::{debug, error};

use crate::adapter::Adapter;
use crate::config::SocketIoConfig;
use crate::errors::Error;
use crate::ns::Namespace;
use crate::packet::{Packet, PacketData};
use crate::socket::Socket;
use tetherio_engine::{EngineIoHandler, Sid};

type EIoSocket = tetherio_engine::Socket<SocketData>;

/// Per engine.io session state.
#[derive(Debug, Default)]
pub struct SocketData {
    /// A binary event or ack waiting for its attachments, which arrive as
    /// separate binary packets on the same session.
    pub partial_bin_packet: Mutex<Option<Packet>>,
}

/// The bridge between the engine.io layer and the namespaces: routes
/// incoming packets to the namespace they address.
pub struct Client<A: Adapter> {
    pub(crate) config: Arc<SocketIoConfig>,
    ns: RwLock<HashMap<String, Arc<Namespace<A>>>>,
}

impl<A: Adapter> Client<A> {
    pub fn new(config: SocketIoConfig) -> Self {
        Self {
            config: Arc::new(config),
            ns: RwLock::new(HashMap::new()),
        }
    }

    /// Register a namespace under the given path with its connection
    /// callback.
    pub fn add_ns<F, Fut>(&self, path: String, callback: F)
    where
        F: Fn(Arc<Socket<A>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        debug!("adding namespace {}", path);
        let ns = Namespace::new(path.clone(), callback);
        self.ns
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path, ns);
    }

    pub fn get_ns(&self, path: &str) -> Option<Arc<Namespace<A>>> {
        self.ns
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    /// Disconnect every socket of every namespace.
    pub fn close(&self) {
        debug!("closing all namespaces");
        let ns = self.ns.read().unwrap_or_else(|e| e.into_inner());
        for ns in ns.values() {
            ns.close();
        }
    }

    /// Called on a connect packet: binds the session to the requested
    /// namespace, or rejects it on the socket.io wire.
    fn sock_connect(&self, auth: Option<String>, ns_path: String, socket: &Arc<EIoSocket>) {
        debug!("[sid={}] connect to namespace {}", socket.id, ns_path);
        match self.get_ns(&ns_path) {
            Some(ns) => {
                if let Err(e) = ns.connect(socket.id, socket.clone(), auth, self.config.clone()) {
                    error!("[sid={}] namespace connect failed: {}", socket.id, e);
                }
            }
            None => {
                let packet = Packet {
                    inner: PacketData::ConnectError(json!("Invalid namespace")),
                    ns: ns_path,
                    query: None,
                };
                if let Ok(msg) = TryInto::<String>::try_into(packet) {
                    socket
                        .emit(tetherio_engine::SendPacket::Message(msg))
                        .ok();
                }
            }
        }
    }

    /// Packets other than connect go straight to the namespace socket.
    fn sock_propagate(&self, sid: Sid, ns_path: &str, inner: PacketData) -> Result<(), Error> {
        let socket = self
            .get_ns(ns_path)
            .and_then(|ns| ns.get_socket(sid))
            .ok_or(Error::InvalidNamespace)?;
        socket.recv(inner)
    }

    /// Stash a binary event or ack until all its attachments have arrived.
    fn sock_park_binary(&self, socket: &Arc<EIoSocket>, packet: Packet) {
        *socket
            .data
            .partial_bin_packet
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(packet);
    }

    /// Feed one binary attachment into the parked packet; when complete,
    /// dispatch it.
    fn apply_payload(&self, socket: &Arc<EIoSocket>, payload: Vec<u8>) -> Result<(), Error> {
        let complete = {
            let mut parked = socket
                .data
                .partial_bin_packet
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            match parked.as_mut() {
                Some(packet) => {
                    let bin = match &mut packet.inner {
                        PacketData::BinaryEvent(_, bin, _) | PacketData::BinaryAck(bin, _) => bin,
                        _ => return Err(Error::InvalidPacketType),
                    };
                    bin.add_payload(payload);
                    if bin.is_complete() {
                        parked.take()
                    } else {
                        None
                    }
                }
                None => {
                    debug!("[sid={}] stray binary payload dropped", socket.id);
                    None
                }
            }
        };
        if let Some(packet) = complete {
            let ns = packet.ns;
            self.sock_propagate(socket.id, &ns, packet.inner)?;
        }
        Ok(())
    }

    /// A malformed packet is terminal for the session, but the application
    /// gets to hear about it before the engine tears it down.
    fn propagate_error(&self, sid: Sid, err: Error) {
        let ns = self.ns.read().unwrap_or_else(|e| e.into_inner());
        if let Some(socket) = ns.values().find_map(|ns| ns.get_socket(sid)) {
            socket.report_error(err);
        }
    }
}

impl<A: Adapter> EngineIoHandler for Client<A> {
    type Data = SocketData;

    fn on_connect(&self, socket: Arc<EIoSocket>) {
        debug!("[sid={}] engine.io session opened", socket.id);
    }

    fn on_disconnect(&self, socket: Arc<EIoSocket>, reason: tetherio_engine::DisconnectReason) {
        debug!("[sid={}] engine.io session closed: {:?}", socket.id, reason);
        let ns = self.ns.read().unwrap_or_else(|e| e.into_inner());
        for ns in ns.values() {
            if let Some(sio_socket) = ns.get_socket(socket.id) {
                sio_socket.close(reason.into());
            }
        }
    }

    fn on_message(&self, msg: String, socket: Arc<EIoSocket>) {
        debug!("[sid={}] received message: {:?}", socket.id, msg);
        let packet = match Packet::try_from(msg) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("[sid={}] packet parse error: {}", socket.id, e);
                self.propagate_error(socket.id, e);
                socket.close(tetherio_engine::DisconnectReason::PacketParsingError);
                return;
            }
        };
        let res = match packet.inner {
            PacketData::Connect => {
                self.sock_connect(packet.query, packet.ns, &socket);
                Ok(())
            }
            PacketData::BinaryEvent(..) | PacketData::BinaryAck(..) => {
                self.sock_park_binary(&socket, packet);
                Ok(())
            }
            inner => self.sock_propagate(socket.id, &packet.ns, inner),
        };
        if let Err(e) = res {
            debug!("[sid={}] packet dispatch error: {}", socket.id, e);
        }
    }

    fn on_binary(&self, data: Vec<u8>, socket: Arc<EIoSocket>) {
        debug!("[sid={}] received {} binary bytes", socket.id, data.len());
        if let Err(e) = self.apply_payload(&socket, data) {
            debug!("[sid={}] binary dispatch error: {}", socket.id, e);
        }
    }
}

impl<A: Adapter> fmt::Debug for Client<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = self.ns.read().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("ns", &ns.keys().collect::<Vec<_>>())
            .finish()
    }
}
