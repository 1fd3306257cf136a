//! Application upstream forwarding.

mod http_proxy;

pub use http_proxy::{ClientAddr, UpstreamHandler};
