//! Request identifiers.
//!
//! Every request the host processes gets an identifier that is unique
//! among in-flight requests. The identifier keys the pending latency
//! timer, so two live requests must never share one.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter backing [`RequestId::next`].
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Opaque per-request identifier.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Allocate the next process-unique identifier.
    ///
    /// Format: `req-{counter}` with the counter zero-padded to 16 hex digits.
    pub fn next() -> Self {
        let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("req-{:016x}", count))
    }

    /// Wrap an identifier supplied by the caller.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the request ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_next_ids_are_unique() {
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            assert!(ids.insert(RequestId::next()), "duplicate ID generated");
        }
    }

    #[test]
    fn test_next_id_format() {
        let id = RequestId::next();
        assert!(id.as_str().starts_with("req-"));
        assert_eq!(id.as_str().len(), 4 + 16);
    }

    #[test]
    fn test_from_string_and_display() {
        let id = RequestId::from_string("custom-123");
        assert_eq!(id.as_str(), "custom-123");
        assert_eq!(format!("{}", id), "custom-123");
        assert_eq!(RequestId::from("custom-123"), id);
    }
}
