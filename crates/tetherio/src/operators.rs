use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::adapter::{Adapter, BroadcastFlags, BroadcastOptions, Room};
use crate::errors::{AckError, BroadcastError};
use crate::handler::AckResponse;
use crate::ns::Namespace;
use crate::packet::Packet;
use crate::socket::Socket;
use tetherio_engine::Sid;

/// A chainable broadcast selection over a namespace.
///
/// Obtained from a [`Socket`](crate::Socket) (anchored on it, so `to`
/// excludes the sender) or from [`SocketIo::of`](crate::SocketIo::of)
/// (anchored on the whole namespace).
pub struct Operators<A: Adapter> {
    opts: BroadcastOptions,
    ns: Arc<Namespace<A>>,
    binary: Vec<Vec<u8>>,
    timeout: Option<Duration>,
}

impl<A: Adapter> Operators<A> {
    pub(crate) fn new(ns: Arc<Namespace<A>>, sid: Option<Sid>) -> Self {
        Self {
            opts: BroadcastOptions {
                sid,
                ..Default::default()
            },
            ns,
            binary: vec![],
            timeout: None,
        }
    }

    /// Select a room. The emit will reach every socket of the room except
    /// the anchor socket.
    pub fn to(mut self, room: impl Into<Room>) -> Self {
        self.opts.rooms.push(room.into());
        self.opts.flags.insert(BroadcastFlags::Broadcast);
        self
    }

    /// Select a room without excluding the anchor socket.
    pub fn within(mut self, room: impl Into<Room>) -> Self {
        self.opts.rooms.push(room.into());
        self
    }

    /// Exclude every socket of the given room.
    pub fn except(mut self, room: impl Into<Room>) -> Self {
        self.opts.except.push(room.into());
        self.opts.flags.insert(BroadcastFlags::Broadcast);
        self
    }

    /// Broadcast to the whole namespace, except the anchor socket.
    pub fn broadcast(mut self) -> Self {
        self.opts.flags.insert(BroadcastFlags::Broadcast);
        self
    }

    /// Keep the operation on this server node, for adapters spanning
    /// several nodes.
    pub fn local(mut self) -> Self {
        self.opts.flags.insert(BroadcastFlags::Local);
        self
    }

    /// Override the ack timeout for [`emit_with_ack`](Self::emit_with_ack).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.flags.insert(BroadcastFlags::Timeout(timeout));
        self.timeout = Some(timeout);
        self
    }

    /// Attach binary payloads to the next emit.
    pub fn bin(mut self, binary: Vec<Vec<u8>>) -> Self {
        self.binary = binary;
        self
    }

    /// Emit an event to every selected socket.
    pub fn emit(self, event: &str, data: impl Serialize) -> Result<(), BroadcastError> {
        let packet = self.build_packet(event, data)?;
        self.ns.adapter.broadcast(packet, self.opts)
    }

    /// Emit an event to every selected socket and collect one ack future
    /// per recipient.
    pub fn emit_with_ack<V: DeserializeOwned + Send + 'static>(
        self,
        event: &str,
        data: impl Serialize,
    ) -> Result<Vec<BoxFuture<'static, Result<AckResponse<V>, AckError>>>, BroadcastError> {
        let packet = self.build_packet(event, data)?;
        self.ns
            .adapter
            .broadcast_with_ack(packet, self.opts, self.timeout)
    }

    /// The sockets matching the selection.
    pub fn sockets(self) -> Vec<Arc<Socket<A>>> {
        self.ns.adapter.fetch_sockets(self.opts)
    }

    /// Make every selected socket join the given rooms.
    pub fn join(self, rooms: Vec<Room>) {
        self.ns.adapter.add_sockets(self.opts, rooms)
    }

    /// Make every selected socket leave the given rooms.
    pub fn leave(self, rooms: Vec<Room>) {
        self.ns.adapter.del_sockets(self.opts, rooms)
    }

    /// Disconnect every selected socket from the namespace.
    pub fn disconnect(self) -> Result<(), BroadcastError> {
        self.ns.adapter.disconnect_socket(self.opts)
    }

    fn build_packet(&self, event: &str, data: impl Serialize) -> Result<Packet, BroadcastError> {
        let data = serde_json::to_value(data)?;
        let packet = if self.binary.is_empty() {
            Packet::event(&self.ns.path, event, data)
        } else {
            Packet::bin_event(&self.ns.path, event, data, self.binary.clone())
        };
        Ok(packet)
    }
}
