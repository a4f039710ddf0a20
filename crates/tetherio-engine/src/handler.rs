use std::sync::Arc;

use crate::socket::{DisconnectReason, Socket};

/// An handler for engine.io session and message events.
///
/// Implemented by the upper protocol layer (or directly by an application
/// using raw engine.io). All callbacks are synchronous; long-running work
/// should be spawned on the runtime.
pub trait EngineIoHandler: std::fmt::Debug + Send + Sync + 'static {
    /// Data shared between the handler and the sockets it manages, stored
    /// on each [`Socket`].
    type Data: Default + Send + Sync + 'static;

    /// Called on a new session, after the open handshake was sent.
    fn on_connect(&self, socket: Arc<Socket<Self::Data>>);

    /// Called when a session is closed, with the reason of the closure.
    fn on_disconnect(&self, socket: Arc<Socket<Self::Data>>, reason: DisconnectReason);

    /// Called on a string message packet.
    fn on_message(&self, msg: String, socket: Arc<Socket<Self::Data>>);

    /// Called on a binary message packet.
    fn on_binary(&self, data: Vec<u8>, socket: Arc<Socket<Self::Data>>);
}

impl<H: EngineIoHandler> EngineIoHandler for Arc<H> {
    type Data = H::Data;

    fn on_connect(&self, socket: Arc<Socket<Self::Data>>) {
        (**self).on_connect(socket)
    }
    fn on_disconnect(&self, socket: Arc<Socket<Self::Data>>, reason: DisconnectReason) {
        (**self).on_disconnect(socket, reason)
    }
    fn on_message(&self, msg: String, socket: Arc<Socket<Self::Data>>) {
        (**self).on_message(msg, socket)
    }
    fn on_binary(&self, data: Vec<u8>, socket: Arc<Socket<Self::Data>>) {
        (**self).on_binary(data, socket)
    }
}
