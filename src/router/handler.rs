//! Request handler abstraction shared by the router and its mounts.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Request, Response, StatusCode};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use thiserror::Error;

/// Body type of every response produced by a handler.
pub type ResponseBody = BoxBody<Bytes, hyper::Error>;

/// Response produced by a handler.
pub type HttpResponse = Response<ResponseBody>;

/// Future returned by [`Handler::call`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, HandlerError>> + Send>>;

/// Errors a handler can fail with. These become `fail` outcomes.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("failed to connect to upstream {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to upstream {0}")]
    ConnectTimeout(SocketAddr),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("request cancelled before completion")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Turns a request into a response.
pub trait Handler<B>: Send + Sync {
    fn call(&self, req: Request<B>) -> HandlerFuture;
}

/// Handler backed by a closure, see [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

/// Build a handler from an async closure.
pub fn handler_fn<F, Fut, B>(f: F) -> FnHandler<F>
where
    F: Fn(Request<B>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HttpResponse, HandlerError>> + Send + 'static,
{
    FnHandler { f }
}

impl<F, Fut, B> Handler<B> for FnHandler<F>
where
    F: Fn(Request<B>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HttpResponse, HandlerError>> + Send + 'static,
{
    fn call(&self, req: Request<B>) -> HandlerFuture {
        Box::pin((self.f)(req))
    }
}

/// Wrap bytes into a response body.
pub fn full_body(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed()
}

/// Plain text response with the given status.
pub fn text_response(status: StatusCode, message: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(full_body(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
