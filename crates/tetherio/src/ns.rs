use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::adapter::Adapter;
use crate::config::SocketIoConfig;
use crate::errors::SendError;
use crate::handler::{ConnectCaller, ConnectHandler};
use crate::handshake::Handshake;
use crate::packet::Packet;
use crate::socket::{DisconnectReason, Socket};
use tetherio_engine::Sid;

use crate::client::SocketData;
type EIoSocket = tetherio_engine::Socket<SocketData>;

/// A namespace: an isolated messaging channel multiplexed over the
/// engine.io sessions, with its own sockets, rooms and handlers.
pub struct Namespace<A: Adapter> {
    pub path: String,
    pub(crate) adapter: A,
    connect_handler: Box<dyn ConnectCaller<A>>,
    sockets: RwLock<HashMap<Sid, Arc<Socket<A>>>>,
}

impl<A: Adapter> Namespace<A> {
    pub(crate) fn new<C, Fut>(path: impl Into<String>, callback: C) -> Arc<Self>
    where
        C: Fn(Arc<Socket<A>>) -> Fut + Send + Sync + 'static,
        Fut: futures::future::Future<Output = ()> + Send + 'static,
    {
        Arc::new_cyclic(|ns| Self {
            path: path.into(),
            adapter: A::new(ns.clone()),
            connect_handler: Box::new(ConnectHandler { handler: callback }),
            sockets: RwLock::new(HashMap::new()),
        })
    }

    /// Connect a client to this namespace: ack the connect packet and run
    /// the connection callback.
    pub(crate) fn connect(
        self: Arc<Self>,
        sid: Sid,
        esocket: Arc<EIoSocket>,
        auth: Option<String>,
        config: Arc<SocketIoConfig>,
    ) -> Result<(), SendError> {
        let handshake = Handshake::new(&esocket.req_parts, auth);
        let socket = Arc::new(Socket::new(self.clone(), sid, esocket, handshake, config));
        self.sockets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(sid, socket.clone());
        debug!("[sid={}] socket connected to {}", sid, self.path);

        socket.send(Packet::connect(&self.path))?;
        self.connect_handler.call(socket);
        Ok(())
    }

    /// Drop a socket from the namespace and from every room it joined.
    pub(crate) fn remove_socket(&self, sid: Sid) {
        self.sockets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&sid);
        self.adapter.del_all(sid);
    }

    pub(crate) fn has(&self, sid: Sid) -> bool {
        self.sockets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&sid)
    }

    pub(crate) fn get_socket(&self, sid: Sid) -> Option<Arc<Socket<A>>> {
        self.sockets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&sid)
            .cloned()
    }

    pub(crate) fn get_sockets(&self) -> Vec<Arc<Socket<A>>> {
        self.sockets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Close every socket of the namespace, e.g. on server shutdown.
    pub(crate) fn close(&self) {
        for socket in self.get_sockets() {
            socket.close(DisconnectReason::ClosingServer);
        }
    }
}

impl<A: Adapter> std::fmt::Debug for Namespace<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace").field("path", &self.path).finish()
    }
}

#[cfg(test)]
impl<A: Adapter> Namespace<A> {
    pub(crate) fn new_for_tests(path: impl Into<String>) -> Arc<Self> {
        Namespace::new(path, |_| async {})
    }

    /// Insert a socket backed by a detached engine socket.
    pub(crate) fn connect_dummy(self: &Arc<Self>, sid: Sid) -> Arc<Socket<A>> {
        let esocket = tetherio_engine::Socket::new_dummy(sid, Box::new(|_, _| {}));
        let handshake = Handshake::new(&esocket.req_parts, None);
        let socket = Arc::new(Socket::new(
            self.clone(),
            sid,
            esocket,
            handshake,
            Arc::new(SocketIoConfig::default()),
        ));
        self.sockets
            .write()
            .unwrap()
            .insert(sid, socket.clone());
        socket
    }
}
