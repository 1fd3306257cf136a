//! Request metrics: instruments, lifecycle hook and exposition.

mod clock;
mod exposition;
mod hook;
mod lifecycle;
mod registry;
mod sweeper;
mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use exposition::{EXPOSITION_CONTENT_TYPE, MetricsEndpoint};
pub use hook::{
    DEFAULT_LATENCY_BUCKETS, HookSettings, HostLabels, LatencyBuckets, MetricsHook, Outcome,
    PoolSizes, REQ_CURRENT_COUNT, REQ_LATENCY_SECONDS, RequestLabels, SPLITS_THREAD_COUNT,
    WORKER_THREAD_COUNT,
};
pub use lifecycle::{RequestDescriptor, RequestLifecycle};
pub use registry::{InstrumentRegistry, RegistryError};
pub use sweeper::TimerSweeper;
pub use timer::{MissingTimerError, PendingRequestTimer};
