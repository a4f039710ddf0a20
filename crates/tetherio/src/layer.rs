use std::sync::Arc;

use tower::Layer;

use crate::adapter::Adapter;
use crate::client::Client;
use crate::service::SocketIoService;

/// A [`tower::Layer`] plugging a socket.io server in an existing service
/// stack.
pub struct SocketIoLayer<A: Adapter> {
    client: Arc<Client<A>>,
}

impl<A: Adapter> SocketIoLayer<A> {
    pub(crate) fn new(client: Arc<Client<A>>) -> Self {
        Self { client }
    }
}

impl<A: Adapter> Clone for SocketIoLayer<A> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<S, A: Adapter> Layer<S> for SocketIoLayer<A> {
    type Service = SocketIoService<A, S>;

    fn layer(&self, inner: S) -> Self::Service {
        SocketIoService::with_inner(inner, self.client.clone())
    }
}

impl<A: Adapter> std::fmt::Debug for SocketIoLayer<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIoLayer").finish()
    }
}
