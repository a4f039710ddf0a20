use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

use crate::errors::{AckError, BroadcastError, SendError};
use crate::handler::AckResponse;
use crate::ns::Namespace;
use crate::packet::Packet;
use crate::socket::Socket;

use tetherio_engine::Sid;

pub type Room = String;

/// Flags set by the broadcast operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BroadcastFlags {
    /// Exclude the emitting socket from the recipients.
    Broadcast,
    /// Do not relay to other server nodes.
    Local,
    /// Override the ack timeout for this broadcast.
    Timeout(Duration),
}

/// Target selection of a broadcast.
#[derive(Debug, Clone, Default)]
pub struct BroadcastOptions {
    pub rooms: Vec<Room>,
    pub except: Vec<Room>,
    pub flags: HashSet<BroadcastFlags>,
    /// The emitting socket, unset when the operation comes from the
    /// server facade.
    pub sid: Option<Sid>,
}

/// Room bookkeeping and message routing for one namespace.
///
/// The provided [`LocalAdapter`] keeps everything in memory; a distributed
/// implementation would relay the non-[`Local`](BroadcastFlags::Local)
/// operations to its peers.
pub trait Adapter: Sized + Send + Sync + 'static {
    fn new(ns: Weak<Namespace<Self>>) -> Self;

    /// The number of server nodes in the cluster.
    fn server_count(&self) -> u16;

    fn add_all(&self, sid: Sid, rooms: Vec<Room>);
    fn del(&self, sid: Sid, room: Room);
    fn del_all(&self, sid: Sid);

    fn broadcast(&self, packet: Packet, opts: BroadcastOptions) -> Result<(), BroadcastError>;

    /// Broadcast and collect one ack future per recipient.
    fn broadcast_with_ack<V: DeserializeOwned + Send + 'static>(
        &self,
        packet: Packet,
        opts: BroadcastOptions,
        timeout: Option<Duration>,
    ) -> Result<Vec<BoxFuture<'static, Result<AckResponse<V>, AckError>>>, BroadcastError>;

    /// The ids of the sockets member of any of the given rooms.
    fn sockets(&self, rooms: Vec<Room>) -> Vec<Sid>;
    /// The rooms a socket has joined.
    fn socket_rooms(&self, sid: Sid) -> Vec<Room>;

    /// The sockets matching the broadcast options.
    fn fetch_sockets(&self, opts: BroadcastOptions) -> Vec<Arc<Socket<Self>>>;
    fn add_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>);
    fn del_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>);
    fn disconnect_socket(&self, opts: BroadcastOptions) -> Result<(), BroadcastError>;
}

/// The in-memory adapter, for single node deployments.
pub struct LocalAdapter {
    rooms: RwLock<HashMap<Room, HashSet<Sid>>>,
    ns: Weak<Namespace<Self>>,
}

impl Adapter for LocalAdapter {
    fn new(ns: Weak<Namespace<Self>>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            ns,
        }
    }

    fn server_count(&self) -> u16 {
        1
    }

    fn add_all(&self, sid: Sid, rooms: Vec<Room>) {
        let mut rooms_map = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        for room in rooms {
            rooms_map.entry(room).or_default().insert(sid);
        }
    }

    fn del(&self, sid: Sid, room: Room) {
        let mut rooms_map = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        if let Some(room) = rooms_map.get_mut(&room) {
            room.remove(&sid);
        }
    }

    fn del_all(&self, sid: Sid) {
        let mut rooms_map = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        for room in rooms_map.values_mut() {
            room.remove(&sid);
        }
    }

    fn broadcast(&self, packet: Packet, opts: BroadcastOptions) -> Result<(), BroadcastError> {
        let sockets = self.apply_opts(opts);
        let errors: Vec<SendError> = sockets
            .into_iter()
            .filter_map(|socket| socket.send(packet.clone()).err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }

    fn broadcast_with_ack<V: DeserializeOwned + Send + 'static>(
        &self,
        packet: Packet,
        opts: BroadcastOptions,
        timeout: Option<Duration>,
    ) -> Result<Vec<BoxFuture<'static, Result<AckResponse<V>, AckError>>>, BroadcastError> {
        let sockets = self.apply_opts(opts);
        let futs = sockets
            .into_iter()
            .map(|socket| {
                let packet = packet.clone();
                let fut: BoxFuture<'static, Result<AckResponse<V>, AckError>> =
                    Box::pin(async move { socket.send_with_ack(packet, timeout).await });
                fut
            })
            .collect();
        Ok(futs)
    }

    fn sockets(&self, rooms: Vec<Room>) -> Vec<Sid> {
        let opts = BroadcastOptions {
            rooms,
            ..Default::default()
        };
        self.apply_opts(opts).into_iter().map(|s| s.sid).collect()
    }

    fn socket_rooms(&self, sid: Sid) -> Vec<Room> {
        let rooms_map = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        rooms_map
            .iter()
            .filter(|(_, sockets)| sockets.contains(&sid))
            .map(|(room, _)| room.clone())
            .collect()
    }

    fn fetch_sockets(&self, opts: BroadcastOptions) -> Vec<Arc<Socket<Self>>> {
        self.apply_opts(opts)
    }

    fn add_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>) {
        for socket in self.apply_opts(opts) {
            self.add_all(socket.sid, rooms.clone());
        }
    }

    fn del_sockets(&self, opts: BroadcastOptions, rooms: Vec<Room>) {
        for socket in self.apply_opts(opts) {
            for room in rooms.clone() {
                self.del(socket.sid, room);
            }
        }
    }

    fn disconnect_socket(&self, opts: BroadcastOptions) -> Result<(), BroadcastError> {
        let errors: Vec<SendError> = self
            .apply_opts(opts)
            .into_iter()
            .filter_map(|socket| socket.disconnect().err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

impl LocalAdapter {
    /// Select the sockets targeted by the given options.
    fn apply_opts(&self, opts: BroadcastOptions) -> Vec<Arc<Socket<Self>>> {
        let ns = match self.ns.upgrade() {
            Some(ns) => ns,
            None => return vec![],
        };
        let is_broadcast = opts.flags.contains(&BroadcastFlags::Broadcast);
        let except = self.except_sids(&opts.except);

        if !opts.rooms.is_empty() {
            let sids = {
                let rooms_map = self.rooms.read().unwrap_or_else(|e| e.into_inner());
                opts.rooms
                    .iter()
                    .filter_map(|room| rooms_map.get(room))
                    .flatten()
                    .copied()
                    .collect::<HashSet<Sid>>()
            };
            sids.into_iter()
                .filter(|sid| !except.contains(sid))
                .filter(|sid| !(is_broadcast && opts.sid == Some(*sid)))
                .filter_map(|sid| ns.get_socket(sid))
                .collect()
        } else if is_broadcast {
            ns.get_sockets()
                .into_iter()
                .filter(|socket| !except.contains(&socket.sid))
                .filter(|socket| opts.sid != Some(socket.sid))
                .collect()
        } else {
            // no selection: the operation targets the emitting socket only
            opts.sid.and_then(|sid| ns.get_socket(sid)).into_iter().collect()
        }
    }

    fn except_sids(&self, except: &[Room]) -> HashSet<Sid> {
        let rooms_map = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        except
            .iter()
            .filter_map(|room| rooms_map.get(room))
            .flatten()
            .copied()
            .collect()
    }
}
