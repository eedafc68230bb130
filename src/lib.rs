//! Bounded browser pool with per-page resource optimization.
//!
//! A [`BrowserPool`] manages a fixed-size fleet of headless Chromium
//! processes, handing out instances, isolated contexts and pages on demand.
//! Eviction is layered (memory limit, then browser age, then context idle
//! time) and runs as an opportunistic sweep inside acquisition rather than as
//! a background reaper. When the pool is saturated it degrades instead of
//! blocking: by default the least-recently-used instance is stripped of its
//! contexts and reused.
//!
//! A [`ResourceOptimizer`] wraps one page from the pool and layers request
//! blocking, network accounting, CPU-saving page tweaks and a memory monitor
//! that can recycle the page on top of it.
//!
//! ```no_run
//! use browserpool::{BrowserKind, BrowserPool, ContextOptions, LaunchOptions, PoolConfig};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let pool = BrowserPool::new(PoolConfig::default());
//! let instance = pool
//!     .acquire_browser(BrowserKind::Chromium, &LaunchOptions::default())
//!     .await?;
//! let context = pool.get_context(&instance, &ContextOptions::default()).await?;
//! let page = pool.get_page(&context, &instance).await?;
//! page.goto("https://example.com").await?;
//! pool.release_browser(&instance).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod instance;
pub mod launch;
pub mod optimizer;
pub mod pool;

pub use config::{PoolConfig, SaturationPolicy};
pub use error::{PoolError, PoolResult};
pub use instance::{BrowserInstance, ContextOptions};
pub use launch::{BrowserKind, LaunchOptions};
pub use optimizer::{
    MemorySnapshot, NetworkStats, OptimizeSettings, ResourceOptimizer, ResourceStats,
    ResourceTypeStats,
};
pub use pool::{BrowserPool, PoolStats};
