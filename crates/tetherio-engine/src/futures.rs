use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::{Response, StatusCode};
use pin_project::pin_project;

use crate::body::ResponseBody;
use crate::errors::Error;

/// The future returned by the engine.io tower services.
#[pin_project(project = ResFutProj)]
pub enum ResponseFuture<F, B> {
    /// A response that is ready to be returned, built by a transport.
    ReadyResponse {
        res: Option<Result<Response<ResponseBody<B>>, Error>>,
    },
    /// An empty response with the given status code.
    EmptyResponse { code: StatusCode },
    /// A response that is computed asynchronously by a transport.
    AsyncResponse {
        future: BoxFuture<'static, Result<Response<ResponseBody<B>>, Error>>,
    },
    /// A future from the inner service, for requests outside the engine.io path.
    Future {
        #[pin]
        future: F,
    },
}

impl<F, B> ResponseFuture<F, B> {
    pub fn empty_response(code: u16) -> Self {
        ResponseFuture::EmptyResponse {
            code: StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    pub fn ready(res: Result<Response<ResponseBody<B>>, Error>) -> Self {
        ResponseFuture::ReadyResponse { res: Some(res) }
    }

    pub fn async_response(
        future: impl Future<Output = Result<Response<ResponseBody<B>>, Error>> + Send + 'static,
    ) -> Self {
        ResponseFuture::AsyncResponse {
            future: Box::pin(future),
        }
    }

    pub fn new(future: F) -> Self {
        ResponseFuture::Future { future }
    }
}

impl<ResBody, F, E> Future for ResponseFuture<F, ResBody>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = Result<Response<ResponseBody<ResBody>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let res = match self.project() {
            ResFutProj::ReadyResponse { res } => Poll::Ready(Ok(res
                .take()
                .expect("polled after completion")
                .unwrap_or_else(|e| e.into()))),
            ResFutProj::EmptyResponse { code } => Poll::Ready(Ok(Response::builder()
                .status(*code)
                .body(ResponseBody::empty_response())
                .unwrap())),
            ResFutProj::AsyncResponse { future } => future
                .as_mut()
                .poll(cx)
                .map(|r| Ok(r.unwrap_or_else(|e| e.into()))),
            ResFutProj::Future { future } => future
                .poll(cx)
                .map(|r| r.map(|res| res.map(ResponseBody::new))),
        };
        res
    }
}
