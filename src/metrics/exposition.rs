//! Metrics snapshot endpoint.
//!
//! Renders the instrument registry in the Prometheus text format. Rendering
//! failures produce a 500 on this endpoint only; they are never surfaced as
//! handler errors.

use crate::metrics::registry::InstrumentRegistry;
use crate::router::{Handler, HandlerFuture, HttpResponse, full_body, text_response};
use hyper::header::{ALLOW, CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, error};

/// Content type of the text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Serves the current instrument snapshot on GET.
#[derive(Clone)]
pub struct MetricsEndpoint {
    registry: Arc<InstrumentRegistry>,
}

impl MetricsEndpoint {
    pub fn new(registry: Arc<InstrumentRegistry>) -> Self {
        Self { registry }
    }

    /// Build the response for a request with `method`.
    pub fn respond(&self, method: &Method) -> HttpResponse {
        if method != Method::GET {
            debug!(method = %method, "rejecting non-GET metrics request");
            let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET"));
            return response;
        }

        snapshot_response(self.registry.encode())
    }
}

impl<B> Handler<B> for MetricsEndpoint {
    fn call(&self, req: Request<B>) -> HandlerFuture {
        let response = self.respond(req.method());
        Box::pin(std::future::ready(Ok(response)))
    }
}

fn snapshot_response(encoded: Result<String, std::fmt::Error>) -> HttpResponse {
    match encoded {
        Ok(text) => {
            let mut response = Response::new(full_body(text));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(EXPOSITION_CONTENT_TYPE));
            response
        }
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics\n")
        }
    }
}
