//! Engine configuration.

/// Default maximum number of relation hops in a projection.
pub const DEFAULT_MAX_PROJECTION_DEPTH: u32 = 5;

/// Default maximum recursion depth of a cascading delete.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 100;

/// Default number of lock rounds before a write gives up.
pub const DEFAULT_LOCK_RETRY_LIMIT: usize = 8;

/// Default page size for finds without an explicit limit.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Limits applied by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deepest projection accepted, in relation hops.
    pub max_projection_depth: u32,

    /// Deepest cascade accepted before a delete aborts.
    pub max_cascade_depth: usize,

    /// Lock rounds a write may take to cover every document it touches.
    pub lock_retry_limit: usize,

    /// Results per find when the caller gives no limit.
    pub default_page_size: usize,
}

impl EngineConfig {
    /// Create a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_projection_depth: DEFAULT_MAX_PROJECTION_DEPTH,
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            lock_retry_limit: DEFAULT_LOCK_RETRY_LIMIT,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the maximum projection depth.
    pub fn with_max_projection_depth(mut self, depth: u32) -> Self {
        self.max_projection_depth = depth;
        self
    }

    /// Set the maximum cascade depth.
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    /// Set the lock retry limit.
    pub fn with_lock_retry_limit(mut self, attempts: usize) -> Self {
        self.lock_retry_limit = attempts.max(1);
        self
    }

    /// Set the default page size.
    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
