//! Per-request lifecycle driver.
//!
//! Wraps every request in the lifecycle callbacks: start before routing,
//! then exactly one of success or failure once the routed handler returns
//! or the request is abandoned.

use crate::frontend::pools::TaskPools;
use crate::metrics::{RequestDescriptor, RequestLifecycle};
use crate::router::{HandlerError, HttpResponse, ScrapeRouter, text_response};
use crate::util::RequestId;
use hyper::{Request, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};

/// Drives one request through routing and the lifecycle callbacks.
pub struct Dispatcher<B> {
    /// Entrypoint name reported to the lifecycle observer.
    entrypoint: Arc<str>,
    router: Arc<ScrapeRouter<B>>,
    lifecycle: Arc<dyn RequestLifecycle>,
    pools: Arc<TaskPools>,
}

impl<B> Clone for Dispatcher<B> {
    fn clone(&self) -> Self {
        Self {
            entrypoint: Arc::clone(&self.entrypoint),
            router: Arc::clone(&self.router),
            lifecycle: Arc::clone(&self.lifecycle),
            pools: Arc::clone(&self.pools),
        }
    }
}

impl<B> Dispatcher<B> {
    pub fn new(
        entrypoint: &str,
        router: Arc<ScrapeRouter<B>>,
        lifecycle: Arc<dyn RequestLifecycle>,
        pools: Arc<TaskPools>,
    ) -> Self {
        Self {
            entrypoint: Arc::from(entrypoint),
            router,
            lifecycle,
            pools,
        }
    }

    /// Route `req` and report its outcome.
    ///
    /// Handler failures are answered with 502 and reported as failures. If
    /// the returned future is dropped before the handler finishes, the
    /// request is reported as cancelled.
    pub async fn dispatch(&self, req: Request<B>) -> HttpResponse {
        let _worker = self.pools.enter_worker();

        let path = req.uri().path().to_string();
        let request = RequestDescriptor::new(
            RequestId::next(),
            self.entrypoint.as_ref(),
            self.router.mount_name(&path),
        );

        self.lifecycle.on_start(&request);
        let mut outcome = PendingOutcome::new(Arc::clone(&self.lifecycle), request);

        match self.router.route(req).await {
            Ok(response) => {
                debug!(
                    request_id = %outcome.request.request_id,
                    path = %path,
                    endpoint = %outcome.request.endpoint,
                    status = response.status().as_u16(),
                    "request completed"
                );
                outcome.succeed(response.status());
                response
            }
            Err(e) => {
                warn!(
                    request_id = %outcome.request.request_id,
                    path = %path,
                    endpoint = %outcome.request.endpoint,
                    error = %e,
                    "request failed"
                );
                outcome.fail(&e);
                text_response(StatusCode::BAD_GATEWAY, "502 Bad Gateway\n")
            }
        }
    }
}

/// Reports exactly one outcome for a started request.
///
/// Dropped while still armed (the client went away mid-request), it reports
/// [`HandlerError::Cancelled`].
struct PendingOutcome {
    lifecycle: Arc<dyn RequestLifecycle>,
    request: RequestDescriptor,
    armed: bool,
}

impl PendingOutcome {
    fn new(lifecycle: Arc<dyn RequestLifecycle>, request: RequestDescriptor) -> Self {
        Self {
            lifecycle,
            request,
            armed: true,
        }
    }

    fn succeed(&mut self, status: StatusCode) {
        if std::mem::replace(&mut self.armed, false) {
            self.lifecycle.on_success(&self.request, status);
        }
    }

    fn fail(&mut self, error: &HandlerError) {
        if std::mem::replace(&mut self.armed, false) {
            self.lifecycle.on_failure(&self.request, error);
        }
    }
}

impl Drop for PendingOutcome {
    fn drop(&mut self) {
        if self.armed {
            debug!(
                request_id = %self.request.request_id,
                endpoint = %self.request.endpoint,
                "request cancelled before completion"
            );
            self.fail(&HandlerError::Cancelled);
        }
    }
}
