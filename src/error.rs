//! Error types for the browser pool.
//!
//! Only caller-input errors (unsupported engine kind, explicit fail-fast
//! saturation, use-after-close) propagate out of the pool. Transient
//! per-instance failures are logged at the point of occurrence and swallowed.

use thiserror::Error;

/// Errors surfaced to callers of the pool and optimizer.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The requested engine kind is unknown, or known but not launchable
    /// by the CDP backend (which drives Chromium-family binaries only).
    #[error("unsupported browser engine: {0}")]
    UnsupportedEngine(String),

    /// Pool is at capacity and every instance is serving a caller.
    ///
    /// Only returned under [`SaturationPolicy::FailFast`](crate::config::SaturationPolicy);
    /// the default policy resolves saturation by forced eviction instead.
    #[error("browser pool saturated: all {0} instances are in use")]
    Saturated(usize),

    /// The pool has been shut down via [`BrowserPool::close`](crate::pool::BrowserPool::close).
    #[error("browser pool is closed")]
    PoolClosed,

    /// Browser process launch or CDP command failure.
    #[error("browser error: {0}")]
    Browser(String),
}

impl From<chromiumoxide::error::CdpError> for PoolError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Self::Browser(err.to_string())
    }
}

impl From<anyhow::Error> for PoolError {
    fn from(err: anyhow::Error) -> Self {
        // Use {:#} to preserve the full context chain
        Self::Browser(format!("{err:#}"))
    }
}

/// Convenience alias for Result with [`PoolError`]
pub type PoolResult<T> = Result<T, PoolError>;
