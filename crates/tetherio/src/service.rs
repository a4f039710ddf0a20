use std::sync::Arc;
use std::task::{Context, Poll};

use http::{Request, Response};
use http_body::Body;
use tower::Service;

use crate::adapter::Adapter;
use crate::client::Client;
use crate::config::SocketIoConfig;
use tetherio_engine::body::ResponseBody;
use tetherio_engine::futures::ResponseFuture;
use tetherio_engine::service::{EngineIoService, NotFoundService};

/// The socket.io server as a standalone [`tower::Service`]: requests under
/// the configured path are handled, everything else goes to the inner
/// service.
pub struct SocketIoService<A: Adapter, S = NotFoundService> {
    engine_svc: EngineIoService<Arc<Client<A>>, S>,
}

impl<A: Adapter, S> SocketIoService<A, S> {
    pub(crate) fn with_inner(inner: S, client: Arc<Client<A>>) -> Self {
        let config = client.config.engine_config.clone();
        Self {
            engine_svc: EngineIoService::with_inner(inner, client, config),
        }
    }
}

impl<A: Adapter> SocketIoService<A, NotFoundService> {
    pub(crate) fn new(config: SocketIoConfig) -> (Self, Arc<Client<A>>) {
        let client = Arc::new(Client::new(config));
        let svc = Self::with_inner(NotFoundService, client.clone());
        (svc, client)
    }
}

impl<A: Adapter, S, ReqBody, ResBody> Service<Request<ReqBody>> for SocketIoService<A, S>
where
    ReqBody: Body + Unpin + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: std::fmt::Debug,
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: 'static,
{
    type Response = Response<ResponseBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.engine_svc.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        self.engine_svc.call(req)
    }
}

impl<A: Adapter, S: Clone> Clone for SocketIoService<A, S> {
    fn clone(&self) -> Self {
        Self {
            engine_svc: self.engine_svc.clone(),
        }
    }
}

impl<A: Adapter, S> std::fmt::Debug for SocketIoService<A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIoService").finish()
    }
}
