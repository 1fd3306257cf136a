//! Live task pool sizes.
//!
//! The host counts its request (worker) tasks and its connection and
//! maintenance (background) tasks. Counts are held by RAII guards so a task
//! leaves its pool however it ends.

use crate::metrics::PoolSizes;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Which pool a task belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolKind {
    Background,
    Worker,
}

/// Counters of live tasks per pool.
#[derive(Debug, Default)]
pub struct TaskPools {
    background: AtomicUsize,
    workers: AtomicUsize,
}

impl TaskPools {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count the calling task as a request worker until the guard drops.
    pub fn enter_worker(self: &Arc<Self>) -> PoolGuard {
        self.enter(PoolKind::Worker)
    }

    /// Count the calling task as a background task until the guard drops.
    pub fn enter_background(self: &Arc<Self>) -> PoolGuard {
        self.enter(PoolKind::Background)
    }

    fn enter(self: &Arc<Self>, kind: PoolKind) -> PoolGuard {
        self.counter(kind).fetch_add(1, Ordering::AcqRel);
        PoolGuard {
            pools: Arc::clone(self),
            kind,
        }
    }

    fn counter(&self, kind: PoolKind) -> &AtomicUsize {
        match kind {
            PoolKind::Background => &self.background,
            PoolKind::Worker => &self.workers,
        }
    }
}

impl PoolSizes for TaskPools {
    fn background_threads(&self) -> usize {
        self.background.load(Ordering::Acquire)
    }

    fn worker_threads(&self) -> usize {
        self.workers.load(Ordering::Acquire)
    }
}

/// Membership of one task in one pool.
#[derive(Debug)]
pub struct PoolGuard {
    pools: Arc<TaskPools>,
    kind: PoolKind,
}

impl PoolGuard {
    pub fn kind(&self) -> PoolKind {
        self.kind
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        self.pools.counter(self.kind).fetch_sub(1, Ordering::AcqRel);
    }
}
