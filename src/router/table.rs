//! Immutable path-prefix routing table.

use crate::router::handler::Handler;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Errors detected while building a [`RouteTable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route table has no fallback handler")]
    MissingFallback,

    #[error("invalid mount prefix '{0}': must start with '/' and not be '/'")]
    InvalidPrefix(String),

    #[error("prefix '{0}' is mounted more than once")]
    DuplicatePrefix(String),
}

/// A named handler and the prefix it serves.
pub struct Mount<B> {
    prefix: String,
    name: String,
    handler: Arc<dyn Handler<B>>,
}

impl<B> Mount<B> {
    /// Path prefix, empty for the fallback.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &Arc<dyn Handler<B>> {
        &self.handler
    }

    /// Whether `path` is the prefix itself or lies below it.
    fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Prefix mounts plus the fallback that serves every other path.
pub struct RouteTable<B> {
    /// Sorted by descending prefix length so the first match is the longest.
    mounts: Vec<Mount<B>>,
    fallback: Mount<B>,
}

impl<B> RouteTable<B> {
    pub fn builder() -> RouteTableBuilder<B> {
        RouteTableBuilder {
            mounts: Vec::new(),
            fallback: None,
        }
    }

    /// The mount serving `path`: the longest matching prefix, or the fallback.
    pub fn resolve(&self, path: &str) -> &Mount<B> {
        self.mounts
            .iter()
            .find(|m| m.matches(path))
            .unwrap_or(&self.fallback)
    }

    /// Prefix mounts, longest first.
    pub fn mounts(&self) -> &[Mount<B>] {
        &self.mounts
    }

    pub fn fallback(&self) -> &Mount<B> {
        &self.fallback
    }
}

/// Builder for [`RouteTable`].
pub struct RouteTableBuilder<B> {
    mounts: Vec<Mount<B>>,
    fallback: Option<Mount<B>>,
}

impl<B> RouteTableBuilder<B> {
    /// Serve `prefix` and everything below it with `handler`.
    pub fn mount(
        mut self,
        prefix: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn Handler<B>>,
    ) -> Self {
        self.mounts.push(Mount {
            prefix: prefix.into(),
            name: name.into(),
            handler,
        });
        self
    }

    /// Serve every path no mount matches with `handler`.
    pub fn fallback(mut self, name: impl Into<String>, handler: Arc<dyn Handler<B>>) -> Self {
        self.fallback = Some(Mount {
            prefix: String::new(),
            name: name.into(),
            handler,
        });
        self
    }

    pub fn build(self) -> Result<RouteTable<B>, RouteError> {
        let fallback = self.fallback.ok_or(RouteError::MissingFallback)?;

        let mut seen = HashSet::new();
        let mut mounts = Vec::with_capacity(self.mounts.len());
        for mut mount in self.mounts {
            let normalized = mount.prefix.trim_end_matches('/');
            if !mount.prefix.starts_with('/') || normalized.is_empty() {
                return Err(RouteError::InvalidPrefix(mount.prefix));
            }
            mount.prefix = normalized.to_string();
            if !seen.insert(mount.prefix.clone()) {
                return Err(RouteError::DuplicatePrefix(mount.prefix));
            }
            mounts.push(mount);
        }
        mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        Ok(RouteTable { mounts, fallback })
    }
}
