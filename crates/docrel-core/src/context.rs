//! Per-request context threaded through mutations.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Who is asking, and under which request identifier.
///
/// Authorization happens before the engine is called; the context only
/// labels the tracing spans of each mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Process-unique request identifier.
    pub request_id: u64,
    /// Caller identity, if known.
    pub actor: Option<String>,
}

impl RequestContext {
    /// Create a context for an identified caller.
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            request_id: next_request_id(),
            actor: Some(actor.into()),
        }
    }

    /// Create a context for an internal caller.
    pub fn system() -> Self {
        Self {
            request_id: next_request_id(),
            actor: None,
        }
    }

    /// Use a caller-supplied request identifier.
    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = request_id;
        self
    }

    /// Caller identity for logs.
    pub fn actor_name(&self) -> &str {
        self.actor.as_deref().unwrap_or("system")
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::system()
    }
}

fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestContext::new("alice");
        let b = RequestContext::system();
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.actor_name(), "alice");
        assert_eq!(b.actor_name(), "system");
        assert_eq!(b.with_request_id(42).request_id, 42);
    }
}
