//! Instrument registry.
//!
//! Thin wrapper over the `prometheus-client` registry that refuses to
//! register the same instrument name twice. `prometheus-client` itself
//! accepts duplicates and would emit two families with one name.

use prometheus_client::encoding::text::encode;
use prometheus_client::registry::{Metric, Registry};
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised while registering instruments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("instrument '{name}' is already registered")]
    Duplicate { name: String },

    #[error("invalid instrument name '{name}'")]
    InvalidName { name: String },
}

/// Named instruments and their text exposition.
#[derive(Debug, Default)]
pub struct InstrumentRegistry {
    registry: Registry,
    names: HashSet<String>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `metric` under `name`.
    pub fn register(
        &mut self,
        name: &str,
        help: &str,
        metric: impl Metric,
    ) -> Result<(), RegistryError> {
        if !is_valid_name(name) {
            return Err(RegistryError::InvalidName {
                name: name.to_string(),
            });
        }
        if !self.names.insert(name.to_string()) {
            return Err(RegistryError::Duplicate {
                name: name.to_string(),
            });
        }

        self.registry.register(name, help, metric);
        Ok(())
    }

    /// Whether an instrument named `name` has been registered.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of registered instruments.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Render every instrument in the text exposition format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

/// Prometheus metric names: `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}
