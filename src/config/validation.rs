//! Configuration validation.

use crate::config::Config;

/// Validate the configuration.
///
/// Checks for:
/// - A metrics path that starts with `/` and is not `/` itself
/// - Non-empty, finite, positive, strictly increasing latency buckets
/// - Non-zero pending timeout, sweep interval and connect timeout
/// - Non-empty entrypoint, host and upstream names
/// - A known log level
///
/// # Returns
///
/// `Ok(())` if valid, or every problem found joined by `; `.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    // Metrics path
    let path = &config.metrics.path;
    if !path.starts_with('/') || path.trim_end_matches('/').is_empty() {
        errors.push(format!(
            "metrics path '{}' must start with '/' and not be '/'",
            path
        ));
    }

    // Latency buckets
    let buckets = &config.metrics.latency_buckets;
    if buckets.is_empty() {
        errors.push("at least one latency bucket must be defined".to_string());
    }
    if buckets.iter().any(|b| !b.is_finite() || *b <= 0.0) {
        errors.push("latency buckets must be finite and positive".to_string());
    }
    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        errors.push("latency buckets must be strictly increasing".to_string());
    }

    // Durations
    if config.metrics.pending_timeout.is_zero() {
        errors.push("metrics pending_timeout must be greater than zero".to_string());
    }
    if config.metrics.sweep_interval.is_zero() {
        errors.push("metrics sweep_interval must be greater than zero".to_string());
    }
    if config.upstream.connect_timeout.is_zero() {
        errors.push("upstream connect_timeout must be greater than zero".to_string());
    }

    // Label identities
    if config.server.name.is_empty() {
        errors.push("server name cannot be empty".to_string());
    }
    if config.server.host.is_empty() {
        errors.push("server host cannot be empty".to_string());
    }
    if config.upstream.name.is_empty() {
        errors.push("upstream name cannot be empty".to_string());
    }
    if config.upstream.name == "metrics" {
        errors.push("upstream name 'metrics' is reserved for the metrics endpoint".to_string());
    }

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
