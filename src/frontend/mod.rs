//! The host runtime: accepts connections and drives request lifecycles.

mod dispatch;
mod listener;
mod pools;

pub use dispatch::Dispatcher;
pub use listener::FrontendListener;
pub use pools::{PoolGuard, PoolKind, TaskPools};
