//! Scrape router.
//!
//! One HTTP surface for both the metrics endpoint and the application:
//! requests under the metrics prefix go to the metrics handler, every other
//! request goes to the wrapped application handler. Requests and responses
//! pass through untouched.

use crate::router::handler::{Handler, HandlerFuture};
use crate::router::table::{RouteError, RouteTable};
use hyper::Request;
use std::sync::Arc;
use tracing::trace;

/// Path-based dispatch between the metrics endpoint and the application.
pub struct ScrapeRouter<B> {
    table: RouteTable<B>,
}

impl<B> ScrapeRouter<B> {
    /// Router over an already validated table.
    pub fn new(table: RouteTable<B>) -> Self {
        Self { table }
    }

    /// Mount `metrics` at `metrics_path` in front of the application handler.
    pub fn wrap(
        metrics_path: &str,
        metrics: Arc<dyn Handler<B>>,
        app_name: &str,
        app: Arc<dyn Handler<B>>,
    ) -> Result<Self, RouteError> {
        let table = RouteTable::builder()
            .mount(metrics_path, "metrics", metrics)
            .fallback(app_name, app)
            .build()?;
        Ok(Self::new(table))
    }

    /// Dispatch `req` to the handler its path resolves to.
    pub fn route(&self, req: Request<B>) -> HandlerFuture {
        let mount = self.table.resolve(req.uri().path());
        trace!(path = %req.uri().path(), mount = %mount.name(), "routing request");
        mount.handler().call(req)
    }

    /// Name of the mount serving `path`.
    pub fn mount_name(&self, path: &str) -> &str {
        self.table.resolve(path).name()
    }

    pub fn table(&self) -> &RouteTable<B> {
        &self.table
    }
}

impl<B> Handler<B> for ScrapeRouter<B> {
    fn call(&self, req: Request<B>) -> HandlerFuture {
        self.route(req)
    }
}
