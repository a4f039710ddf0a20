use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::Future;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::adapter::Adapter;
use crate::errors::{Error, SendError};
use crate::packet::Packet;
use crate::socket::Socket;

/// An ack response: the deserialized payload plus its binary attachments.
pub type AckResponse<T> = (T, Vec<Vec<u8>>);

/// Sends the ack response for an event, if the client requested one.
///
/// Passed to every event callback; calling [`send`](AckSender::send) on an
/// event without an ack id is a no-op, so handlers can ack unconditionally.
pub struct AckSender<A: Adapter> {
    socket: Arc<Socket<A>>,
    binary: Vec<Vec<u8>>,
    ack_id: Option<i64>,
}

impl<A: Adapter> AckSender<A> {
    pub(crate) fn new(socket: Arc<Socket<A>>, ack_id: Option<i64>) -> Self {
        Self {
            socket,
            binary: vec![],
            ack_id,
        }
    }

    /// Attach binary payloads to the ack response.
    pub fn bin(mut self, binary: Vec<Vec<u8>>) -> Self {
        self.binary = binary;
        self
    }

    /// Send the ack response.
    pub fn send<T: Serialize>(self, data: T) -> Result<(), SendError> {
        let ack_id = match self.ack_id {
            Some(ack_id) => ack_id,
            None => return Ok(()),
        };
        let ns = self.socket.ns();
        let data = serde_json::to_value(data)?;
        let packet = if self.binary.is_empty() {
            Packet::ack(&ns, data, ack_id)
        } else {
            Packet::bin_ack(&ns, data, self.binary, ack_id)
        };
        self.socket.send(packet)
    }
}

/// Type-erased event callback stored in the socket handler table.
pub(crate) trait MessageCaller<A: Adapter>: Send + Sync + 'static {
    fn call(
        &self,
        socket: Arc<Socket<A>>,
        data: Value,
        binary: Vec<Vec<u8>>,
        ack_id: Option<i64>,
    ) -> Result<(), Error>;
}

/// Binds a typed async closure to an event: the json payload is
/// deserialized into `Param` before the closure runs.
pub(crate) struct MessageHandler<Param, F> {
    pub handler: F,
    pub param: PhantomData<Param>,
}

impl<Param, F, Fut, A> MessageCaller<A> for MessageHandler<Param, F>
where
    Param: DeserializeOwned + Send + Sync + 'static,
    F: Fn(Arc<Socket<A>>, Param, Vec<Vec<u8>>, AckSender<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
    A: Adapter,
{
    fn call(
        &self,
        socket: Arc<Socket<A>>,
        data: Value,
        binary: Vec<Vec<u8>>,
        ack_id: Option<i64>,
    ) -> Result<(), Error> {
        // a payload that does not bind to Param is a caller error,
        // reported to the namespace error callback by the socket
        let data: Param = serde_json::from_value(data)?;
        let ack = AckSender::new(socket.clone(), ack_id);
        let fut = (self.handler)(socket, data, binary, ack);
        spawn_contained(fut);
        Ok(())
    }
}

/// Type-erased connection callback of a namespace.
pub(crate) trait ConnectCaller<A: Adapter>: Send + Sync + 'static {
    fn call(&self, socket: Arc<Socket<A>>);
}

pub(crate) struct ConnectHandler<F> {
    pub handler: F,
}

impl<F, Fut, A> ConnectCaller<A> for ConnectHandler<F>
where
    F: Fn(Arc<Socket<A>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
    A: Adapter,
{
    fn call(&self, socket: Arc<Socket<A>>) {
        spawn_contained((self.handler)(socket));
    }
}

/// Run a callback future on the runtime, containing panics so a crashing
/// handler only kills its own task.
fn spawn_contained(fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(async move {
        if std::panic::AssertUnwindSafe(fut)
            .catch_unwind()
            .await
            .is_err()
        {
            error!("a handler panicked, the connection stays up");
        }
    });
}
