mod parser;

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body::Empty;
use tower::Service;
use tracing::debug;

pub use parser::RequestInfo;

use crate::body::ResponseBody;
use crate::config::EngineIoConfig;
use crate::engine::EngineIo;
use crate::futures::ResponseFuture;
use crate::handler::EngineIoHandler;
use crate::transport::{polling, ws, TransportType};

/// A [`tower::Service`] handling engine.io requests.
///
/// Requests under the configured
/// [`req_path`](crate::EngineIoConfig::req_path) are dispatched to the
/// transports, everything else is forwarded to the inner service.
pub struct EngineIoService<H: EngineIoHandler, S = NotFoundService> {
    engine: Arc<EngineIo<H>>,
    inner: S,
}

impl<H: EngineIoHandler> EngineIoService<H, NotFoundService> {
    /// Create a service answering `404 Not Found` outside the engine.io
    /// path, to be used as a standalone hyper service.
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, EngineIoConfig::default())
    }

    pub fn with_config(handler: H, config: EngineIoConfig) -> Self {
        Self::with_config_inner(NotFoundService, handler, config)
    }
}

impl<H: EngineIoHandler, S> EngineIoService<H, S> {
    /// Wrap an inner service, which handles all requests outside the
    /// engine.io path.
    pub fn with_inner(inner: S, handler: H, config: EngineIoConfig) -> Self {
        Self::with_config_inner(inner, handler, config)
    }

    pub(crate) fn with_config_inner(inner: S, handler: H, config: EngineIoConfig) -> Self {
        Self {
            engine: Arc::new(EngineIo::new(handler, config)),
            inner,
        }
    }

    pub(crate) fn engine(&self) -> &Arc<EngineIo<H>> {
        &self.engine
    }
}

impl<H: EngineIoHandler, S: Clone> Clone for EngineIoService<H, S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<H: EngineIoHandler, S> std::fmt::Debug for EngineIoService<H, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineIoService")
            .field("engine", &self.engine)
            .finish()
    }
}

impl<H, S, ReqBody, ResBody> Service<Request<ReqBody>> for EngineIoService<H, S>
where
    H: EngineIoHandler,
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ReqBody: http_body::Body + Unpin + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: std::fmt::Debug,
    ResBody: 'static,
{
    type Response = Response<ResponseBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if req.uri().path().starts_with(&self.engine.config.req_path) {
            self.dispatch(req)
        } else {
            ResponseFuture::new(self.inner.call(req))
        }
    }
}

impl<H: EngineIoHandler, S> EngineIoService<H, S> {
    /// Route an engine.io request to the right transport operation.
    fn dispatch<F, ReqBody, ResBody>(&self, req: Request<ReqBody>) -> ResponseFuture<F, ResBody>
    where
        ReqBody: http_body::Body + Unpin + Send + 'static,
        ReqBody::Data: Send,
        ReqBody::Error: std::fmt::Debug,
        ResBody: 'static,
    {
        let engine = self.engine.clone();
        match RequestInfo::parse(&req, &engine.config) {
            Ok(info) => match info.transport {
                TransportType::Polling => match (info.method, info.sid) {
                    (Method::OPTIONS, _) => ResponseFuture::ready(polling::preflight_req()),
                    (Method::GET, None) => {
                        let supports_binary = !info.b64 && info.jsonp.is_none();
                        ResponseFuture::ready(polling::open_req(
                            engine,
                            req,
                            supports_binary,
                            info.jsonp,
                        ))
                    }
                    (Method::GET, Some(sid)) => ResponseFuture::async_response(
                        polling::polling_req(engine, sid, info.jsonp),
                    ),
                    (Method::POST, Some(sid)) => {
                        ResponseFuture::async_response(polling::post_req(engine, sid, req))
                    }
                    _ => ResponseFuture::empty_response(400),
                },
                TransportType::Websocket if info.method == Method::GET => {
                    ResponseFuture::ready(ws::new_req(engine, info.sid, req))
                }
                TransportType::Websocket => ResponseFuture::empty_response(400),
            },
            Err(e) => {
                debug!("error parsing request: {:?}", e);
                ResponseFuture::ready(Err(e))
            }
        }
    }
}

/// The default inner service, answers `404 Not Found` to any request
/// outside the engine.io path.
#[derive(Debug, Clone)]
pub struct NotFoundService;

impl<ReqBody> Service<Request<ReqBody>> for NotFoundService
where
    ReqBody: http_body::Body + Unpin + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: std::fmt::Debug,
{
    type Response = Response<ResponseBody<Empty<Bytes>>>;
    type Error = Infallible;
    type Future = std::future::Ready<Result<Self::Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _: Request<ReqBody>) -> Self::Future {
        std::future::ready(Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(ResponseBody::empty_response())
            .unwrap()))
    }
}
