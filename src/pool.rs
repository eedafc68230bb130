//! Bounded browser pool with layered eviction.
//!
//! One cooperative mutex guards every pool-membership decision (scan, launch,
//! forced eviction, cleanup sweep); long-running page work happens strictly
//! after the mutex is released, holding only the exclusively checked-out
//! instance. The pool is an explicitly constructed, explicitly closed object:
//! no process-wide singleton, so shutdown and tests stay deterministic.

use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::page::Page;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{PoolConfig, SaturationPolicy};
use crate::error::{PoolError, PoolResult};
use crate::instance::{BrowserInstance, ContextOptions, InstanceSnapshot};
use crate::launch::{BrowserKind, LaunchOptions};

/// Why the cleanup sweep retires an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictReason {
    MemoryLimit,
    TtlExpired,
}

/// Whole-instance eviction decision for one sweep pass.
///
/// Memory wins over TTL so an over-limit reading short-circuits the age
/// check, and a missing reading never evicts by itself (fails open).
pub(crate) fn evict_reason(
    snapshot: &InstanceSnapshot,
    config: &PoolConfig,
    now: Instant,
) -> Option<EvictReason> {
    if let Some(memory_mb) = snapshot.memory_usage_mb {
        if memory_mb > config.memory_limit_mb {
            return Some(EvictReason::MemoryLimit);
        }
    }
    if now.duration_since(snapshot.created_at) > config.browser_ttl {
        return Some(EvictReason::TtlExpired);
    }
    None
}

/// First idle instance with spare context capacity. Ties are meaningless:
/// idle instances are interchangeable.
pub(crate) fn pick_idle(snapshots: &[InstanceSnapshot], max_contexts: usize) -> Option<usize> {
    snapshots
        .iter()
        .position(|s| !s.in_use && s.context_count < max_contexts)
}

/// Saturation victim per policy. `EvictLru` deliberately does NOT filter on
/// `in_use`; `FailFast` considers idle instances only and yields `None` when
/// everything is busy.
pub(crate) fn pick_victim(
    snapshots: &[InstanceSnapshot],
    policy: SaturationPolicy,
) -> Option<usize> {
    let candidates = snapshots
        .iter()
        .enumerate()
        .filter(|(_, s)| policy == SaturationPolicy::EvictLru || !s.in_use);
    candidates
        .min_by_key(|(_, s)| s.last_used_at)
        .map(|(idx, _)| idx)
}

/// Diagnostic snapshot of the pool.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_browsers: usize,
    pub in_use: usize,
    pub total_contexts: usize,
    pub total_pages: usize,
    pub total_requests: u64,
}

struct PoolState {
    browsers: Vec<Arc<BrowserInstance>>,
    last_cleanup: Instant,
    closed: bool,
}

/// Bounded collection of [`BrowserInstance`]s.
///
/// Two operations matter to the fetch layer: `acquire_browser` ("give me a
/// ready browsing surface", via `get_context`/`get_page`) and
/// `release_browser`/`release_context` ("I am done with it"). Everything else
/// is policy running behind those calls.
pub struct BrowserPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
}

impl BrowserPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState {
                browsers: Vec::new(),
                last_cleanup: Instant::now(),
                closed: false,
            }),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Check out a browser instance, running the layered policy:
    /// opportunistic cleanup, idle reuse, launch-below-capacity, then the
    /// configured saturation fallback. Never blocks waiting for a release.
    pub async fn acquire_browser(
        &self,
        kind: BrowserKind,
        options: &LaunchOptions,
    ) -> PoolResult<Arc<BrowserInstance>> {
        if kind != BrowserKind::Chromium {
            return Err(PoolError::UnsupportedEngine(kind.as_str().to_string()));
        }

        let mut state = self.state.lock().await;
        if state.closed {
            return Err(PoolError::PoolClosed);
        }

        // Opportunistic, time-gated sweep inside the acquisition path
        if state.last_cleanup.elapsed() > self.config.cleanup_interval {
            self.sweep(&mut state).await;
            state.last_cleanup = Instant::now();
        }

        let snapshots = Self::snapshots(&state.browsers).await;

        // 1. Reuse an idle instance with spare context capacity
        if let Some(idx) = pick_idle(&snapshots, self.config.max_contexts_per_browser) {
            let instance = Arc::clone(&state.browsers[idx]);
            Self::check_out(&instance).await;
            debug!("Reusing idle browser instance {}", instance.id());
            return Ok(instance);
        }

        // 2. Launch a fresh process while under capacity
        if state.browsers.len() < self.config.max_browsers {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let instance = BrowserInstance::launch(id, kind, options).await?;
            Self::check_out(&instance).await;
            state.browsers.push(Arc::clone(&instance));
            info!(
                "Launched browser instance {} ({}/{})",
                id,
                state.browsers.len(),
                self.config.max_browsers
            );
            return Ok(instance);
        }

        // 3. Saturated: degrade rather than block
        warn!(
            "Browser pool is full ({} instances); applying {:?} policy",
            state.browsers.len(),
            self.config.saturation_policy
        );
        let Some(idx) = pick_victim(&snapshots, self.config.saturation_policy) else {
            return Err(PoolError::Saturated(state.browsers.len()));
        };
        let instance = Arc::clone(&state.browsers[idx]);
        // Reclaim memory by dropping every context; under EvictLru this can
        // hit an instance another caller is actively holding.
        instance.close_all_contexts().await;
        Self::check_out(&instance).await;
        info!(
            "Recycled least-recently-used browser instance {} for new caller",
            instance.id()
        );
        Ok(instance)
    }

    /// Return an instance to the pool: marked idle, kept warm, nothing closed.
    pub async fn release_browser(&self, instance: &Arc<BrowserInstance>) {
        let _guard = self.state.lock().await;
        let mut inst_state = instance.state.lock().await;
        inst_state.in_use = false;
        inst_state.last_used_at = Instant::now();
    }

    /// Create a fresh isolated context on a checked-out instance. The context
    /// budget was enforced when the instance was acquired; exceeding it out
    /// of band is possible and only logged.
    pub async fn get_context(
        &self,
        instance: &Arc<BrowserInstance>,
        options: &ContextOptions,
    ) -> PoolResult<BrowserContextId> {
        let context_id = instance.create_context(options).await?;

        let context_count = instance.context_count().await;
        if context_count > self.config.max_contexts_per_browser {
            warn!(
                "Instance {} holds {} contexts, above the budget of {}",
                instance.id(),
                context_count,
                self.config.max_contexts_per_browser
            );
        }

        Ok(context_id)
    }

    /// Create a new page in a context and record the page → context mapping.
    pub async fn get_page(
        &self,
        context: &BrowserContextId,
        instance: &Arc<BrowserInstance>,
    ) -> PoolResult<Page> {
        let page = instance.create_page(context).await?;

        let pages = instance.pages_in_context(context).await;
        if pages > self.config.max_pages_per_context {
            warn!(
                "Context {:?} holds {} pages, above the budget of {}",
                context, pages, self.config.max_pages_per_context
            );
        }

        Ok(page)
    }

    /// Close a context and drop all page mappings that pointed at it.
    pub async fn release_context(
        &self,
        context: &BrowserContextId,
        instance: &Arc<BrowserInstance>,
    ) -> PoolResult<()> {
        instance.close_context(context).await?;
        Ok(())
    }

    /// Shut the whole pool down: every context closed, every process
    /// terminated. Idempotent.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;

        for instance in state.browsers.drain(..) {
            instance.shutdown().await;
        }
        info!("Browser pool closed");
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let mut stats = PoolStats {
            total_browsers: state.browsers.len(),
            in_use: 0,
            total_contexts: 0,
            total_pages: 0,
            total_requests: 0,
        };
        for instance in &state.browsers {
            let inst_state = instance.state.lock().await;
            if inst_state.in_use {
                stats.in_use += 1;
            }
            stats.total_contexts += inst_state.contexts.len();
            stats.total_pages += inst_state.pages.len();
            stats.total_requests += inst_state.total_requests;
        }
        stats
    }

    async fn snapshots(browsers: &[Arc<BrowserInstance>]) -> Vec<InstanceSnapshot> {
        let mut snapshots = Vec::with_capacity(browsers.len());
        for instance in browsers {
            snapshots.push(instance.snapshot().await);
        }
        snapshots
    }

    async fn check_out(instance: &Arc<BrowserInstance>) {
        let mut inst_state = instance.state.lock().await;
        inst_state.in_use = true;
        inst_state.last_used_at = Instant::now();
        inst_state.total_requests += 1;
    }

    /// Cleanup Sweep. Runs under the pool mutex. Per-instance failures are
    /// logged and never abort the pass for the remaining instances.
    async fn sweep(&self, state: &mut PoolState) {
        let now = Instant::now();
        let mut retired: Vec<usize> = Vec::new();

        for (idx, instance) in state.browsers.iter().enumerate() {
            if instance.is_in_use().await {
                continue;
            }

            // Best-effort refresh; a failed sample leaves `None` and the
            // memory check simply doesn't fire.
            instance.sample_memory_mb().await;

            let snapshot = instance.snapshot().await;
            match evict_reason(&snapshot, &self.config, now) {
                Some(EvictReason::MemoryLimit) => {
                    info!(
                        "Instance {} memory usage ({:.0}MB) exceeds limit ({:.0}MB), closing",
                        instance.id(),
                        snapshot.memory_usage_mb.unwrap_or_default(),
                        self.config.memory_limit_mb
                    );
                    retired.push(idx);
                }
                Some(EvictReason::TtlExpired) => {
                    info!(
                        "Instance {} exceeded browser TTL ({:?}), closing",
                        instance.id(),
                        self.config.browser_ttl
                    );
                    retired.push(idx);
                }
                None => {
                    instance.close_idle_contexts(self.config.context_ttl).await;
                }
            }
        }

        for idx in retired.into_iter().rev() {
            let instance = state.browsers.remove(idx);
            instance.shutdown().await;
        }
    }
}

impl std::fmt::Debug for BrowserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserPool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
