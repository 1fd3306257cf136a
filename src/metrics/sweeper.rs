//! Periodic eviction of abandoned request timers.
//!
//! A request aborted before its finish callback would otherwise keep its
//! timer entry forever.

use crate::metrics::MetricsHook;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Background task that sweeps the hook's pending timers.
pub struct TimerSweeper {
    hook: Arc<MetricsHook>,
    /// Time between sweeps.
    interval: Duration,
    /// Entries older than this are evicted.
    max_age: Duration,
}

impl TimerSweeper {
    pub fn new(hook: Arc<MetricsHook>, interval: Duration, max_age: Duration) -> Self {
        Self {
            hook,
            interval,
            max_age,
        }
    }

    /// Sweep every `interval` until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            max_age_secs = self.max_age.as_secs(),
            "timer sweeper started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.hook.sweep_abandoned(self.max_age);
                    debug!(evicted, pending = self.hook.pending(), "timer sweep complete");
                }

                _ = shutdown.recv() => {
                    info!("timer sweeper shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{HookSettings, InstrumentRegistry, ManualClock, PoolSizes, RequestDescriptor};
    use crate::util::{RequestId, ShutdownSignal};

    struct NoPools;

    impl PoolSizes for NoPools {
        fn background_threads(&self) -> usize {
            0
        }

        fn worker_threads(&self) -> usize {
            0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_and_stops() {
        let mut registry = InstrumentRegistry::new();
        let clock = Arc::new(ManualClock::new());
        let hook = Arc::new(
            MetricsHook::setup(&mut registry, HookSettings::default(), Arc::new(NoPools))
                .unwrap()
                .with_clock(clock.clone()),
        );

        hook.start(&RequestDescriptor::new(RequestId::from("stuck"), "http", "app"));
        clock.advance(Duration::from_secs(600));

        let shutdown = ShutdownSignal::new();
        let sweeper = TimerSweeper::new(
            Arc::clone(&hook),
            Duration::from_secs(30),
            Duration::from_secs(300),
        );
        let handle = tokio::spawn(sweeper.run(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(hook.pending(), 0);

        shutdown.shutdown();
        handle.await.unwrap();
    }
}
