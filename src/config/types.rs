//! Configuration data types.

use crate::metrics::DEFAULT_LATENCY_BUCKETS;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Listener and label identity
    #[serde(default)]
    pub server: ServerConfig,

    /// Metrics endpoint and instrument settings
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Application upstream that non-metrics requests are forwarded to
    pub upstream: UpstreamConfig,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// The listening side of the host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Entrypoint name, reported as the `driver` label
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Address and port to listen on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Host identity, reported as the `host` and `server` labels
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            listen: default_listen(),
            host: default_host(),
        }
    }
}

/// Metrics endpoint and instrument configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Reserved path serving the metrics snapshot
    #[serde(default = "default_metrics_path")]
    pub path: String,

    /// Latency histogram bucket upper bounds, in seconds
    #[serde(default = "default_latency_buckets")]
    pub latency_buckets: Vec<f64>,

    /// Requests pending longer than this are considered abandoned
    #[serde(default = "default_pending_timeout", with = "humantime_serde")]
    pub pending_timeout: Duration,

    /// How often abandoned requests are swept
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            latency_buckets: default_latency_buckets(),
            pending_timeout: default_pending_timeout(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Application upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Mount name, reported as the `endpoint` label for application requests
    #[serde(default = "default_upstream_name")]
    pub name: String,

    /// Upstream address and port
    pub address: SocketAddr,

    /// Connection timeout
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_server_name() -> String {
    "http".to_string()
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_host() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_latency_buckets() -> Vec<f64> {
    DEFAULT_LATENCY_BUCKETS.to_vec()
}

fn default_pending_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_upstream_name() -> String {
    "app".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Serde adapter for humantime durations ("30s", "5m").
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
