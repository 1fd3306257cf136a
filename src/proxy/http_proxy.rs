//! HTTP forwarding to the application upstream.
//!
//! The application handler of the bundled host: every request the scrape
//! router does not claim is sent to the configured upstream over a fresh
//! HTTP/1.1 connection, and the upstream's response is returned as is.

use crate::config::UpstreamConfig;
use crate::router::{Handler, HandlerError, HandlerFuture, HttpResponse};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::{HOST, HeaderValue};
use hyper::{Request, Uri};
use hyper_util::rt::TokioIo;
use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Address of the client that sent a request, stored in request extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// Forwards requests to a single upstream.
#[derive(Clone, Debug)]
pub struct UpstreamHandler {
    address: SocketAddr,
    connect_timeout: Duration,
}

impl UpstreamHandler {
    pub fn new(address: SocketAddr, connect_timeout: Duration) -> Self {
        Self {
            address,
            connect_timeout,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(config.address, config.connect_timeout)
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

impl<B> Handler<B> for UpstreamHandler
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    fn call(&self, req: Request<B>) -> HandlerFuture {
        Box::pin(forward(req, self.address, self.connect_timeout))
    }
}

async fn forward<B>(
    mut req: Request<B>,
    address: SocketAddr,
    connect_timeout: Duration,
) -> Result<HttpResponse, HandlerError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(HandlerError::Connect {
                addr: address,
                source,
            });
        }
        Err(_) => return Err(HandlerError::ConnectTimeout(address)),
    };
    if let Err(e) = stream.set_nodelay(true) {
        warn!(upstream = %address, error = %e, "failed to set TCP_NODELAY on upstream connection");
    }

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;

    // Drive the connection until the response body is consumed.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            warn!(error = %e, "upstream connection error");
        }
    });

    prepare_request(&mut req, address);
    debug!(upstream = %address, method = %req.method(), uri = %req.uri(), "forwarding request");

    let response = sender.send_request(req).await?;
    Ok(response.map(|body| body.boxed()))
}

/// Rewrite `req` for the upstream hop: origin-form URI, forwarding headers,
/// and a Host header when the client sent none.
fn prepare_request<B>(req: &mut Request<B>, upstream: SocketAddr) {
    let origin_form = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .parse::<Uri>()
        .unwrap_or_else(|_| Uri::from_static("/"));
    *req.uri_mut() = origin_form;

    let client_ip = req
        .extensions()
        .get::<ClientAddr>()
        .map(|addr| addr.0.ip().to_string());
    let headers = req.headers_mut();

    if let Some(ip) = client_ip {
        if let Ok(value) = HeaderValue::from_str(&ip) {
            headers.insert("x-forwarded-for", value.clone());
            headers.insert("x-real-ip", value);
        }
    }

    if !headers.contains_key(HOST) {
        if let Ok(value) = HeaderValue::from_str(&upstream.to_string()) {
            headers.insert(HOST, value);
        }
    }
}
