//! Pool configuration with documented defaults.
//!
//! All knobs are constructor parameters with defaults; there is no external
//! configuration surface. Construct a [`PoolConfig`] and hand it to
//! [`BrowserPool::new`](crate::pool::BrowserPool::new).

use std::time::Duration;

/// Default maximum number of concurrently managed browser processes.
///
/// Each Chrome process costs hundreds of MB of resident memory; five
/// processes is a comfortable ceiling for a single scraping host.
pub const DEFAULT_MAX_BROWSERS: usize = 5;

/// Default maximum isolated contexts per browser process.
pub const DEFAULT_MAX_CONTEXTS_PER_BROWSER: usize = 10;

/// Default maximum pages per context (advisory, see `PoolConfig::max_pages_per_context`).
pub const DEFAULT_MAX_PAGES_PER_CONTEXT: usize = 5;

/// Default browser time-to-live: 1 hour.
///
/// Long-lived Chrome processes accumulate memory even with context recycling;
/// an hourly restart of idle instances keeps the fleet fresh.
pub const DEFAULT_BROWSER_TTL: Duration = Duration::from_secs(3600);

/// Default context time-to-live: 10 minutes of instance idleness.
pub const DEFAULT_CONTEXT_TTL: Duration = Duration::from_secs(600);

/// Default per-browser memory ceiling in MB (2 GB).
pub const DEFAULT_MEMORY_LIMIT_MB: f64 = 2048.0;

/// Default minimum interval between cleanup sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// What `acquire_browser` does when the pool is full and no idle instance
/// has spare context capacity.
///
/// This is an explicit policy, not an accident of iteration order: the pool
/// never blocks a caller, so the only real choice is what to sacrifice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaturationPolicy {
    /// Select the globally least-recently-used instance, including instances
    /// currently checked out, forcibly close all of its contexts, and hand it
    /// to the new caller.
    ///
    /// Under sustained overload this can evict the contexts of an instance
    /// that is actively serving another caller. That is documented,
    /// best-effort behavior: the pool degrades isolation rather than making
    /// anyone wait.
    #[default]
    EvictLru,

    /// Select the least-recently-used *idle* instance only. If every instance
    /// is in use, return [`PoolError::Saturated`](crate::error::PoolError::Saturated)
    /// immediately instead of evicting a live session.
    FailFast,
}

/// Configuration for [`BrowserPool`](crate::pool::BrowserPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of browser processes.
    pub max_browsers: usize,
    /// Maximum contexts per browser; enforced at acquire time only.
    pub max_contexts_per_browser: usize,
    /// Maximum pages per context. Advisory: exceeding it logs a warning but
    /// never fails `get_page`, matching the acquire-time-only enforcement of
    /// the context limit.
    pub max_pages_per_context: usize,
    /// Maximum age of an idle browser before the sweep closes it.
    pub browser_ttl: Duration,
    /// Maximum instance idleness before the sweep closes its contexts.
    pub context_ttl: Duration,
    /// Per-browser memory ceiling in MB. A reading above this evicts the
    /// instance on the next sweep; a missing reading never does.
    pub memory_limit_mb: f64,
    /// Minimum interval between cleanup sweeps (run opportunistically inside
    /// acquisition, not on a timer).
    pub cleanup_interval: Duration,
    /// Behavior when the pool is saturated.
    pub saturation_policy: SaturationPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_browsers: DEFAULT_MAX_BROWSERS,
            max_contexts_per_browser: DEFAULT_MAX_CONTEXTS_PER_BROWSER,
            max_pages_per_context: DEFAULT_MAX_PAGES_PER_CONTEXT,
            browser_ttl: DEFAULT_BROWSER_TTL,
            context_ttl: DEFAULT_CONTEXT_TTL,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            saturation_policy: SaturationPolicy::default(),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_browsers(mut self, max_browsers: usize) -> Self {
        self.max_browsers = max_browsers;
        self
    }

    pub fn with_max_contexts_per_browser(mut self, max_contexts: usize) -> Self {
        self.max_contexts_per_browser = max_contexts;
        self
    }

    pub fn with_max_pages_per_context(mut self, max_pages: usize) -> Self {
        self.max_pages_per_context = max_pages;
        self
    }

    pub fn with_browser_ttl(mut self, ttl: Duration) -> Self {
        self.browser_ttl = ttl;
        self
    }

    pub fn with_context_ttl(mut self, ttl: Duration) -> Self {
        self.context_ttl = ttl;
        self
    }

    pub fn with_memory_limit_mb(mut self, limit_mb: f64) -> Self {
        self.memory_limit_mb = limit_mb;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_saturation_policy(mut self, policy: SaturationPolicy) -> Self {
        self.saturation_policy = policy;
        self
    }
}
