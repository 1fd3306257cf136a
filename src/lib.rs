//! reqmeter - request lifecycle metrics with an in-band scrape endpoint
//!
//! This crate provides:
//! - A metrics hook that times every request by id and keeps throughput,
//!   concurrency and latency instruments current
//! - A scrape router that serves the metrics snapshot on a reserved path of
//!   the application's own listener and passes everything else through
//! - A small HTTP host that drives both around an upstream application

pub mod config;
pub mod frontend;
pub mod metrics;
pub mod proxy;
pub mod router;
pub mod state;
pub mod util;

pub use config::Config;
pub use state::AppState;
