//! Explicit request lifecycle interface driven by the host.

use crate::util::RequestId;
use hyper::StatusCode;
use std::error::Error;

/// What the host knows about a request. Read-only to observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Unique among in-flight requests.
    pub request_id: RequestId,
    /// Name of the entrypoint that accepted the request (the `driver` label).
    pub entrypoint: String,
    /// Logical endpoint that handled it (the `endpoint` label).
    pub endpoint: String,
}

impl RequestDescriptor {
    pub fn new(
        request_id: RequestId,
        entrypoint: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            entrypoint: entrypoint.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Callbacks around every request the host processes.
///
/// For each request the host calls `on_start` once, then exactly one of
/// `on_success` or `on_failure`.
pub trait RequestLifecycle: Send + Sync {
    fn on_start(&self, request: &RequestDescriptor);

    /// The handler produced a response with `status`.
    fn on_success(&self, request: &RequestDescriptor, status: StatusCode);

    /// The handler failed with `error`.
    fn on_failure(&self, request: &RequestDescriptor, error: &(dyn Error + Send + Sync + 'static));
}
