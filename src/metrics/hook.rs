//! Request lifecycle metrics.
//!
//! [`MetricsHook`] owns four instruments:
//!
//! - `splits_thread_count{host}`: background task count, sampled on every request start
//! - `worker_thread_count{host}`: worker task count, sampled on every request start
//! - `req_current_count{server,driver,endpoint,status}`: completed requests
//! - `req_latency_seconds{server,driver,endpoint,status}`: request latency
//!
//! Latency is measured per request id, so concurrent requests never see
//! each other's start time.

use crate::metrics::clock::{Clock, SystemClock};
use crate::metrics::lifecycle::{RequestDescriptor, RequestLifecycle};
use crate::metrics::registry::{InstrumentRegistry, RegistryError};
use crate::metrics::timer::{MissingTimerError, PendingRequestTimer};
use hyper::StatusCode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::{Family, MetricConstructor};
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SPLITS_THREAD_COUNT: &str = "splits_thread_count";
pub const WORKER_THREAD_COUNT: &str = "worker_thread_count";
pub const REQ_CURRENT_COUNT: &str = "req_current_count";
pub const REQ_LATENCY_SECONDS: &str = "req_latency_seconds";

const INSTRUMENT_NAMES: [&str; 4] = [
    SPLITS_THREAD_COUNT,
    WORKER_THREAD_COUNT,
    REQ_CURRENT_COUNT,
    REQ_LATENCY_SECONDS,
];

/// Latency buckets (seconds) used when none are configured.
pub const DEFAULT_LATENCY_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Reports the current size of the host's task pools.
pub trait PoolSizes: Send + Sync {
    fn background_threads(&self) -> usize;
    fn worker_threads(&self) -> usize;
}

/// Labels for the thread-count gauges.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HostLabels {
    pub host: String,
}

/// How a request ended.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Outcome {
    Succ,
    Fail,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Succ => "succ",
            Outcome::Fail => "fail",
        }
    }
}

impl EncodeLabelValue for Outcome {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
        EncodeLabelValue::encode(&self.as_str(), encoder)
    }
}

/// Labels for the request counter and latency histogram.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub server: String,
    pub driver: String,
    pub endpoint: String,
    pub status: Outcome,
}

/// Builds latency histograms with a fixed bucket layout.
#[derive(Clone, Debug)]
pub struct LatencyBuckets(Arc<[f64]>);

impl MetricConstructor<Histogram> for LatencyBuckets {
    fn new_metric(&self) -> Histogram {
        Histogram::new(self.0.iter().copied())
    }
}

/// Settings for [`MetricsHook::setup`].
#[derive(Clone, Debug)]
pub struct HookSettings {
    /// Value of the `host` and `server` labels.
    pub host: String,
    /// Upper bounds of the latency histogram buckets, in seconds.
    pub latency_buckets: Vec<f64>,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            latency_buckets: DEFAULT_LATENCY_BUCKETS.to_vec(),
        }
    }
}

/// Keeps the request instruments consistent with the live set of requests.
pub struct MetricsHook {
    host: HostLabels,
    splits_thread_count: Family<HostLabels, Gauge>,
    worker_thread_count: Family<HostLabels, Gauge>,
    req_current_count: Family<RequestLabels, Counter>,
    req_latency_seconds: Family<RequestLabels, Histogram, LatencyBuckets>,
    timers: PendingRequestTimer,
    pools: Arc<dyn PoolSizes>,
    clock: Arc<dyn Clock>,
}

impl MetricsHook {
    /// Create the instruments and register them in `registry`.
    ///
    /// Fails without registering anything if any of the instrument names
    /// is already taken, which is what happens when called twice against
    /// the same registry.
    pub fn setup(
        registry: &mut InstrumentRegistry,
        settings: HookSettings,
        pools: Arc<dyn PoolSizes>,
    ) -> Result<Self, RegistryError> {
        if let Some(name) = INSTRUMENT_NAMES.iter().find(|n| registry.contains(n)) {
            return Err(RegistryError::Duplicate {
                name: name.to_string(),
            });
        }

        let splits_thread_count = Family::<HostLabels, Gauge>::default();
        let worker_thread_count = Family::<HostLabels, Gauge>::default();
        let req_current_count = Family::<RequestLabels, Counter>::default();
        let req_latency_seconds =
            Family::<RequestLabels, Histogram, LatencyBuckets>::new_with_constructor(
                LatencyBuckets(settings.latency_buckets.into()),
            );

        registry.register(
            SPLITS_THREAD_COUNT,
            "splits thread count",
            splits_thread_count.clone(),
        )?;
        registry.register(
            WORKER_THREAD_COUNT,
            "worker thread count",
            worker_thread_count.clone(),
        )?;
        registry.register(
            REQ_CURRENT_COUNT,
            "request current count",
            req_current_count.clone(),
        )?;
        registry.register(
            REQ_LATENCY_SECONDS,
            "request latency seconds",
            req_latency_seconds.clone(),
        )?;

        info!(host = %settings.host, "request metrics registered");

        Ok(Self {
            host: HostLabels {
                host: settings.host,
            },
            splits_thread_count,
            worker_thread_count,
            req_current_count,
            req_latency_seconds,
            timers: PendingRequestTimer::new(),
            pools,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sample the pool gauges and start timing `request`.
    pub fn start(&self, request: &RequestDescriptor) {
        self.splits_thread_count
            .get_or_create(&self.host)
            .set(saturating_i64(self.pools.background_threads()));
        self.worker_thread_count
            .get_or_create(&self.host)
            .set(saturating_i64(self.pools.worker_threads()));

        self.timers.start(&request.request_id, self.clock.now());
    }

    /// Stop timing `request` and record its latency and outcome.
    ///
    /// Returns the recorded latency. A request with no pending timer
    /// records nothing.
    pub fn finish(
        &self,
        request: &RequestDescriptor,
        outcome: Outcome,
    ) -> Result<Duration, MissingTimerError> {
        let started = self.timers.stop(&request.request_id)?;
        let elapsed = self.clock.now().saturating_duration_since(started);

        let labels = self.request_labels(request, outcome);
        self.req_latency_seconds
            .get_or_create(&labels)
            .observe(elapsed.as_secs_f64());
        self.req_current_count.get_or_create(&labels).inc();

        debug!(
            request_id = %request.request_id,
            endpoint = %request.endpoint,
            status = outcome.as_str(),
            latency_ms = elapsed.as_millis(),
            "request recorded"
        );

        Ok(elapsed)
    }

    /// Evict timers of requests that started more than `max_age` ago and
    /// never finished.
    pub fn sweep_abandoned(&self, max_age: Duration) -> usize {
        let evicted = self.timers.sweep(self.clock.now(), max_age);
        if evicted > 0 {
            warn!(
                evicted,
                max_age_secs = max_age.as_secs(),
                "evicted timers of abandoned requests"
            );
        }
        evicted
    }

    /// Number of requests currently being timed.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Current `(background, worker)` gauge values for this host.
    ///
    /// Like [`Family::get_or_create`], this creates the series at zero if
    /// no request has started yet.
    pub fn thread_gauges_or_create(&self) -> (i64, i64) {
        (
            self.splits_thread_count.get_or_create(&self.host).get(),
            self.worker_thread_count.get_or_create(&self.host).get(),
        )
    }

    /// Completed requests recorded for the given labels.
    ///
    /// Creates the series at zero when absent; a created series is exported
    /// by every later scrape.
    pub fn completed_or_create(&self, driver: &str, endpoint: &str, outcome: Outcome) -> u64 {
        let labels = RequestLabels {
            server: self.host.host.clone(),
            driver: driver.to_string(),
            endpoint: endpoint.to_string(),
            status: outcome,
        };
        self.req_current_count.get_or_create(&labels).get()
    }

    fn request_labels(&self, request: &RequestDescriptor, outcome: Outcome) -> RequestLabels {
        RequestLabels {
            server: self.host.host.clone(),
            driver: request.entrypoint.clone(),
            endpoint: request.endpoint.clone(),
            status: outcome,
        }
    }

    fn finish_or_drop(&self, request: &RequestDescriptor, outcome: Outcome) {
        if let Err(e) = self.finish(request, outcome) {
            warn!(
                request_id = %request.request_id,
                endpoint = %request.endpoint,
                error = %e,
                "dropping observation for request finished without start"
            );
        }
    }
}

impl RequestLifecycle for MetricsHook {
    fn on_start(&self, request: &RequestDescriptor) {
        self.start(request);
    }

    fn on_success(&self, request: &RequestDescriptor, _status: StatusCode) {
        self.finish_or_drop(request, Outcome::Succ);
    }

    fn on_failure(&self, request: &RequestDescriptor, _error: &(dyn Error + Send + Sync + 'static)) {
        self.finish_or_drop(request, Outcome::Fail);
    }
}

fn saturating_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
