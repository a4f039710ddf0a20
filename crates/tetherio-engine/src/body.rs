use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::HeaderMap;
use http_body::{Body, Empty, Full, SizeHint};
use pin_project::pin_project;

/// Body used for all engine.io responses. Wraps either a generated payload,
/// an empty response or the inner service's body.
#[pin_project]
#[derive(Debug)]
pub struct ResponseBody<B> {
    #[pin]
    inner: ResponseBodyInner<B>,
}

impl<B> ResponseBody<B> {
    pub fn empty_response() -> Self {
        Self {
            inner: ResponseBodyInner::EmptyResponse {
                body: Empty::new(),
            },
        }
    }

    pub fn custom_response(body: Full<Bytes>) -> Self {
        Self {
            inner: ResponseBodyInner::CustomBody { body },
        }
    }

    pub fn new(body: B) -> Self {
        Self {
            inner: ResponseBodyInner::Body { body },
        }
    }
}

#[pin_project(project = BodyProj)]
#[derive(Debug)]
enum ResponseBodyInner<B> {
    EmptyResponse {
        #[pin]
        body: Empty<Bytes>,
    },
    CustomBody {
        #[pin]
        body: Full<Bytes>,
    },
    Body {
        #[pin]
        body: B,
    },
}

impl<B> Body for ResponseBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Data = Bytes;
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn poll_data(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        match self.project().inner.project() {
            BodyProj::EmptyResponse { body } => body.poll_data(cx).map_err(|e| match e {}),
            BodyProj::CustomBody { body } => body.poll_data(cx).map_err(|e| match e {}),
            BodyProj::Body { body } => body
                .poll_data(cx)
                .map(|opt| opt.map(|res| res.map_err(Into::into))),
        }
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        match self.project().inner.project() {
            BodyProj::EmptyResponse { body } => body.poll_trailers(cx).map_err(|e| match e {}),
            BodyProj::CustomBody { body } => body.poll_trailers(cx).map_err(|e| match e {}),
            BodyProj::Body { body } => body.poll_trailers(cx).map_err(Into::into),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            ResponseBodyInner::EmptyResponse { body } => body.is_end_stream(),
            ResponseBodyInner::CustomBody { body } => body.is_end_stream(),
            ResponseBodyInner::Body { body } => body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            ResponseBodyInner::EmptyResponse { body } => body.size_hint(),
            ResponseBodyInner::CustomBody { body } => body.size_hint(),
            ResponseBodyInner::Body { body } => body.size_hint(),
        }
    }
}
