//! Shared application state.
//!
//! The one context object of the process: built once at startup, it owns
//! the instrument registry, the metrics hook, the router and the task pools,
//! and hands shared references to the tasks that need them.

use crate::config::Config;
use crate::frontend::{Dispatcher, TaskPools};
use crate::metrics::{
    HookSettings, InstrumentRegistry, MetricsEndpoint, MetricsHook, RegistryError, TimerSweeper,
};
use crate::proxy::UpstreamHandler;
use crate::router::{Handler, RouteError, ScrapeRouter};
use crate::util::ShutdownSignal;
use hyper::body::Incoming;
use std::sync::Arc;
use thiserror::Error;

/// Configuration errors detected while assembling the state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to register instruments: {0}")]
    Registry(#[from] RegistryError),

    #[error("failed to build route table: {0}")]
    Route(#[from] RouteError),
}

/// Shared state accessible from all tasks.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    registry: Arc<InstrumentRegistry>,
    hook: Arc<MetricsHook>,
    router: Arc<ScrapeRouter<Incoming>>,
    pools: Arc<TaskPools>,
    shutdown: ShutdownSignal,
}

impl AppState {
    /// Register the instruments and build the router for `config`.
    pub fn new(config: Config) -> Result<Self, StartupError> {
        let pools = TaskPools::new();

        let mut registry = InstrumentRegistry::new();
        let settings = HookSettings {
            host: config.server.host.clone(),
            latency_buckets: config.metrics.latency_buckets.clone(),
        };
        let hook = MetricsHook::setup(&mut registry, settings, pools.clone())?;
        let registry = Arc::new(registry);

        let metrics: Arc<dyn Handler<Incoming>> =
            Arc::new(MetricsEndpoint::new(Arc::clone(&registry)));
        let app: Arc<dyn Handler<Incoming>> =
            Arc::new(UpstreamHandler::from_config(&config.upstream));
        let router = ScrapeRouter::wrap(&config.metrics.path, metrics, &config.upstream.name, app)?;

        Ok(Self {
            config: Arc::new(config),
            registry,
            hook: Arc::new(hook),
            router: Arc::new(router),
            pools,
            shutdown: ShutdownSignal::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<InstrumentRegistry> {
        &self.registry
    }

    pub fn hook(&self) -> &Arc<MetricsHook> {
        &self.hook
    }

    pub fn router(&self) -> &Arc<ScrapeRouter<Incoming>> {
        &self.router
    }

    pub fn pools(&self) -> &Arc<TaskPools> {
        &self.pools
    }

    /// Request driver for the listener, reporting to the metrics hook.
    pub fn dispatcher(&self) -> Dispatcher<Incoming> {
        Dispatcher::new(
            &self.config.server.name,
            Arc::clone(&self.router),
            self.hook.clone(),
            Arc::clone(&self.pools),
        )
    }

    /// Sweeper for timers of abandoned requests.
    pub fn sweeper(&self) -> TimerSweeper {
        TimerSweeper::new(
            Arc::clone(&self.hook),
            self.config.metrics.sweep_interval,
            self.config.metrics.pending_timeout,
        )
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn config(metrics_path: &str) -> Config {
        let mut config = parse_config(
            r#"
server:
  host: web-1
upstream:
  name: shop
  address: "127.0.0.1:9000"
"#,
        )
        .unwrap();
        config.metrics.path = metrics_path.to_string();
        config
    }

    #[test]
    fn test_state_wires_router_and_registry() {
        let state = AppState::new(config("/metrics")).unwrap();

        assert_eq!(state.registry().len(), 4);
        assert_eq!(state.router().mount_name("/metrics"), "metrics");
        assert_eq!(state.router().mount_name("/cart"), "shop");
        assert_eq!(state.hook().pending(), 0);
        let _clone = state.clone();
    }

    #[test]
    fn test_invalid_metrics_path_fails_startup() {
        let err = AppState::new(config("metrics")).err().unwrap();
        assert!(matches!(err, StartupError::Route(RouteError::InvalidPrefix(_))));
    }
}
