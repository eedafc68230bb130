//! A pooled browser process and its usage metadata.
//!
//! [`BrowserInstance`] exclusively owns one Chrome process (closing it
//! terminates the process), the chromiumoxide handler task and the profile
//! directory. Contexts are CDP browser contexts owned by the instance; pages
//! are tracked through a non-owning back-reference map keyed by target id so
//! that closing a context can never be blocked by a lingering page handle.

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams, TargetId,
};
use chromiumoxide::page::Page;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::launch::{self, BrowserKind, LaunchOptions};

/// Expression sampling the JS heap, in MB. Returns `null` where
/// `performance.memory` is unavailable (non-Chromium engines, some
/// cross-origin setups) so the caller can fail open.
const JS_HEAP_MB: &str = r"(() => {
    const m = window.performance && window.performance.memory;
    if (!m) { return null; }
    return m.usedJSHeapSize / (1024 * 1024);
})()";

/// Options for context creation. Contexts are isolated cookie/storage scopes;
/// the only per-context knobs the CDP exposes at creation are proxy routing.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub proxy_server: Option<String>,
    pub proxy_bypass_list: Option<String>,
}

pub(crate) struct PageBinding {
    pub page: Page,
    pub context_id: BrowserContextId,
}

/// Context-expiry decision for the cleanup sweep: a context is closed when
/// it has no mapped pages, or when its instance has sat idle longer than
/// `context_ttl` (idleness is per instance, not per page).
pub(crate) fn context_expired(page_count: usize, idle_for: Duration, context_ttl: Duration) -> bool {
    page_count == 0 || idle_for > context_ttl
}

/// Mutable usage metadata, guarded by the instance mutex.
///
/// Mutated under the pool mutex during acquire/release/sweep, and by the
/// exclusive holder of the instance between acquire and release. The pool
/// mutex is always taken before an instance mutex, never the reverse.
pub(crate) struct InstanceState {
    pub last_used_at: Instant,
    pub in_use: bool,
    pub total_requests: u64,
    /// Last sampled JS-heap usage. `None` means "no reading", which never
    /// triggers eviction by itself.
    pub memory_usage_mb: Option<f64>,
    pub contexts: Vec<BrowserContextId>,
    pub pages: HashMap<TargetId, PageBinding>,
}

/// Point-in-time copy of the metadata the pool's decision logic needs.
#[derive(Debug, Clone)]
pub(crate) struct InstanceSnapshot {
    pub in_use: bool,
    pub context_count: usize,
    pub last_used_at: Instant,
    pub created_at: Instant,
    pub memory_usage_mb: Option<f64>,
}

/// One running browser process managed by the pool.
pub struct BrowserInstance {
    id: u64,
    kind: BrowserKind,
    created_at: Instant,
    browser: Arc<Browser>,
    handler: parking_lot::Mutex<Option<JoinHandle<()>>>,
    user_data_dir: parking_lot::Mutex<Option<PathBuf>>,
    pub(crate) state: Mutex<InstanceState>,
}

impl BrowserInstance {
    /// Launch a new browser process and wrap it as a pool instance.
    pub(crate) async fn launch(id: u64, kind: BrowserKind, options: &LaunchOptions) -> Result<Arc<Self>> {
        let (browser, handler, user_data_dir) = launch::launch(options).await?;
        let now = Instant::now();

        info!("Created browser instance {id} ({kind})");

        Ok(Arc::new(Self {
            id,
            kind,
            created_at: now,
            browser: Arc::new(browser),
            handler: parking_lot::Mutex::new(Some(handler)),
            user_data_dir: parking_lot::Mutex::new(Some(user_data_dir)),
            state: Mutex::new(InstanceState {
                last_used_at: now,
                in_use: false,
                total_requests: 0,
                memory_usage_mb: None,
                contexts: Vec::new(),
                pages: HashMap::new(),
            }),
        }))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> BrowserKind {
        self.kind
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// The underlying process handle. Shared so the optimizer and the caller
    /// can issue CDP commands while the pool retains the instance.
    pub fn browser(&self) -> Arc<Browser> {
        Arc::clone(&self.browser)
    }

    pub async fn is_in_use(&self) -> bool {
        self.state.lock().await.in_use
    }

    pub async fn context_count(&self) -> usize {
        self.state.lock().await.contexts.len()
    }

    pub async fn total_requests(&self) -> u64 {
        self.state.lock().await.total_requests
    }

    pub(crate) async fn snapshot(&self) -> InstanceSnapshot {
        let state = self.state.lock().await;
        InstanceSnapshot {
            in_use: state.in_use,
            context_count: state.contexts.len(),
            last_used_at: state.last_used_at,
            created_at: self.created_at,
            memory_usage_mb: state.memory_usage_mb,
        }
    }

    /// Create a fresh isolated context and register it.
    pub(crate) async fn create_context(&self, options: &ContextOptions) -> Result<BrowserContextId> {
        let mut params = CreateBrowserContextParams::default();
        params.proxy_server = options.proxy_server.clone();
        params.proxy_bypass_list = options.proxy_bypass_list.clone();

        let resp = self
            .browser
            .execute(params)
            .await
            .context("Failed to create browser context")?;
        let context_id = resp.browser_context_id.clone();

        let mut state = self.state.lock().await;
        state.contexts.push(context_id.clone());
        debug!(
            "Instance {}: created context {:?} ({} live)",
            self.id,
            context_id,
            state.contexts.len()
        );

        Ok(context_id)
    }

    /// Create a page inside `context_id` and record the back-reference.
    pub(crate) async fn create_page(&self, context_id: &BrowserContextId) -> Result<Page> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build create-target params: {e}"))?;

        let page = self
            .browser
            .new_page(params)
            .await
            .context("Failed to create page")?;

        let mut state = self.state.lock().await;
        state.pages.insert(
            page.target_id().clone(),
            PageBinding {
                page: page.clone(),
                context_id: context_id.clone(),
            },
        );

        Ok(page)
    }

    /// Number of pages currently mapped to `context_id`.
    pub(crate) async fn pages_in_context(&self, context_id: &BrowserContextId) -> usize {
        let state = self.state.lock().await;
        state
            .pages
            .values()
            .filter(|binding| binding.context_id == *context_id)
            .count()
    }

    /// Close one context: unmap its pages, dispose the CDP context (which
    /// closes its pages), unregister it.
    pub(crate) async fn close_context(&self, context_id: &BrowserContextId) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state
                .pages
                .retain(|_, binding| binding.context_id != *context_id);
            state.contexts.retain(|id| id != context_id);
        }

        self.browser
            .execute(DisposeBrowserContextParams::new(context_id.clone()))
            .await
            .context("Failed to dispose browser context")?;

        Ok(())
    }

    /// Forcibly close every context. Used by the saturation fallback and by
    /// shutdown; per-context failures are logged, not propagated.
    pub(crate) async fn close_all_contexts(&self) {
        let contexts: Vec<BrowserContextId> = {
            let mut state = self.state.lock().await;
            state.pages.clear();
            std::mem::take(&mut state.contexts)
        };

        for context_id in contexts {
            if let Err(e) = self
                .browser
                .execute(DisposeBrowserContextParams::new(context_id.clone()))
                .await
            {
                warn!(
                    "Instance {}: failed to dispose context {:?}: {e}",
                    self.id, context_id
                );
            }
        }
    }

    /// Close contexts the sweep considers expired (see [`context_expired`]).
    pub(crate) async fn close_idle_contexts(&self, context_ttl: Duration) {
        let expired: Vec<BrowserContextId> = {
            let state = self.state.lock().await;
            let idle_for = state.last_used_at.elapsed();
            state
                .contexts
                .iter()
                .filter(|context_id| {
                    let page_count = state
                        .pages
                        .values()
                        .filter(|binding| binding.context_id == **context_id)
                        .count();
                    context_expired(page_count, idle_for, context_ttl)
                })
                .cloned()
                .collect()
        };

        for context_id in expired {
            debug!("Instance {}: closing expired context {:?}", self.id, context_id);
            if let Err(e) = self.close_context(&context_id).await {
                warn!(
                    "Instance {}: failed to close expired context {:?}: {e}",
                    self.id, context_id
                );
            }
        }
    }

    /// Refresh the instance's memory reading from the JS heap of any live
    /// page. Returns `None` (and logs) when sampling is impossible or fails;
    /// the eviction policy treats that as "no trigger".
    pub(crate) async fn sample_memory_mb(&self) -> Option<f64> {
        let probe = {
            let state = self.state.lock().await;
            state.pages.values().next().map(|binding| binding.page.clone())
        };

        let Some(page) = probe else {
            let mut state = self.state.lock().await;
            state.memory_usage_mb = None;
            return None;
        };

        let sampled = match page.evaluate(JS_HEAP_MB).await {
            Ok(result) => match result.into_value::<Option<f64>>() {
                Ok(value) => value,
                Err(e) => {
                    warn!("Instance {}: failed to decode memory reading: {e}", self.id);
                    None
                }
            },
            Err(e) => {
                warn!("Instance {}: failed to get memory usage: {e}", self.id);
                None
            }
        };

        let mut state = self.state.lock().await;
        state.memory_usage_mb = sampled;
        sampled
    }

    /// Close the process and release everything it owns. Best effort: every
    /// step is logged on failure and the remaining steps still run.
    pub(crate) async fn shutdown(&self) {
        info!("Shutting down browser instance {}", self.id);

        self.close_all_contexts().await;

        // Browser.close over CDP asks the process to exit without needing
        // exclusive ownership of the Browser handle; the chromiumoxide Drop
        // impl kills the child if the command never lands.
        if let Err(e) = self.browser.execute(CloseParams::default()).await {
            warn!("Instance {}: graceful browser close failed: {e}", self.id);
        }

        if let Some(handler) = self.handler.lock().take() {
            handler.abort();
        }

        self.cleanup_user_data_dir();
    }

    /// Remove the profile directory (blocking; also callable from Drop).
    fn cleanup_user_data_dir(&self) {
        if let Some(path) = self.user_data_dir.lock().take() {
            debug!("Instance {}: removing profile dir {}", self.id, path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Instance {}: failed to remove profile dir {}: {e}. Manual cleanup may be required.",
                    self.id,
                    path.display()
                );
            }
        }
    }
}

impl Drop for BrowserInstance {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.lock().take() {
            handler.abort();
        }
        // Fallback if shutdown() was never called
        self.cleanup_user_data_dir();
    }
}

impl std::fmt::Debug for BrowserInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserInstance")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
