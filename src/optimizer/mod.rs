//! Per-page resource optimizer.
//!
//! Layered on top of a page acquired from the pool: installs request
//! interception rules (block images/fonts/media/stylesheets/third-party),
//! tracks network counters, applies CPU/GPU-saving page tweaks, and runs a
//! background memory monitor that can force a context/page recycle when the
//! JS heap grows past its limit.

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCacheParams, ClearBrowserCookiesParams, ErrorReason, EventLoadingFailed,
    EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived, RequestId, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::FrameId;
use chromiumoxide::cdp::browser_protocol::target::{
    CloseTargetParams, CreateBrowserContextParams, CreateTargetParams,
    DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

pub mod stats;

pub use stats::{MemorySnapshot, NetworkStats, ResourceStats, ResourceTypeStats};

/// Optimization settings. Construct with `..Default::default()` to override
/// only the flags you care about; the defaults mirror a conservative fetcher
/// (nothing blocked, cache cleared, monitor armed).
#[derive(Debug, Clone)]
pub struct OptimizeSettings {
    pub block_images: bool,
    /// Also blocks websocket traffic, which tends to keep pages alive.
    pub block_media: bool,
    pub block_fonts: bool,
    pub block_stylesheets: bool,
    /// Abort requests whose origin differs from the current document origin.
    pub block_third_party: bool,
    pub auto_clear_cache: bool,
    pub auto_clear_cookies: bool,
    /// Zero disables the background memory monitor.
    pub memory_monitor_interval: Duration,
    pub memory_limit_mb: f64,
    /// When the JS heap exceeds `memory_limit_mb`, recycle the context and
    /// page instead of just logging.
    pub auto_restart_on_memory_limit: bool,
}

impl Default for OptimizeSettings {
    fn default() -> Self {
        Self {
            block_images: false,
            block_media: false,
            block_fonts: false,
            block_stylesheets: false,
            block_third_party: false,
            auto_clear_cache: true,
            auto_clear_cookies: false,
            memory_monitor_interval: Duration::from_secs(60),
            memory_limit_mb: 2048.0,
            auto_restart_on_memory_limit: true,
        }
    }
}

/// Zero out CSS animation/transition durations.
const DISABLE_ANIMATIONS_JS: &str = r"(() => {
    const style = document.createElement('style');
    style.innerHTML = '* { animation-duration: 0.001s !important; transition-duration: 0.001s !important; }';
    document.head.appendChild(style);
})()";

/// Coarsen performance.now() to 10ms steps; fine-grained timers burn CPU in
/// polling loops and nothing a fetcher cares about needs the precision.
const COARSEN_TIMERS_JS: &str = r"(() => {
    if (window.performance && window.performance.now) {
        const originalNow = window.performance.now;
        window.performance.now = function() {
            return Math.round(originalNow.call(window.performance) / 10) * 10;
        };
    }
})()";

/// Cap requestAnimationFrame callbacks to ~30fps.
const THROTTLE_RAF_JS: &str = r"(() => {
    if (window.requestAnimationFrame) {
        const originalRAF = window.requestAnimationFrame;
        let lastRAFTime = 0;
        window.requestAnimationFrame = function(callback) {
            const currentTime = Date.now();
            if (currentTime - lastRAFTime < 32) {
                return null;
            }
            lastRAFTime = currentTime;
            return originalRAF.call(window, callback);
        };
    }
})()";

const MEMORY_SNAPSHOT_JS: &str = r"(() => {
    const m = window.performance && window.performance.memory;
    if (!m) { return null; }
    return {
        used: m.usedJSHeapSize,
        total: m.totalJSHeapSize,
        limit: m.jsHeapSizeLimit
    };
})()";

#[derive(Debug, Deserialize)]
struct RawMemory {
    used: f64,
    total: f64,
    limit: f64,
}

/// `scheme://host[:port]` of a URL, `None` when it doesn't parse.
fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    })
}

/// Same-origin check against an already-computed document origin.
/// Unparseable URLs are treated as cross-origin, matching the conservative
/// "block what we can't classify" stance for third-party filtering.
fn is_same_origin(url: &str, document_origin: &str) -> bool {
    origin_of(url).is_some_and(|origin| origin == document_origin)
}

/// Per-request abort/continue decision against one document origin.
///
/// Type rules run first; the third-party rule applies to whatever they let
/// through. Without a known document origin the third-party rule cannot
/// classify and lets the request continue.
fn should_block(
    settings: &OptimizeSettings,
    resource_type: &ResourceType,
    url: &str,
    document_origin: Option<&str>,
) -> bool {
    match resource_type {
        ResourceType::Image if settings.block_images => true,
        ResourceType::Media | ResourceType::WebSocket if settings.block_media => true,
        ResourceType::Font if settings.block_fonts => true,
        ResourceType::Stylesheet if settings.block_stylesheets => true,
        _ if settings.block_third_party => match document_origin {
            Some(origin) => !is_same_origin(url, origin),
            None => false,
        },
        _ => false,
    }
}

/// Frame-aware block decision: each frame's subresources are classified
/// against that frame's own document origin, so a cross-origin iframe never
/// changes how main-frame requests are judged.
fn blocked_for_frame<K: Eq + Hash>(
    settings: &OptimizeSettings,
    frame_origins: &HashMap<K, String>,
    frame_id: &K,
    resource_type: &ResourceType,
    url: &str,
) -> bool {
    let origin = frame_origins.get(frame_id).map(String::as_str);
    should_block(settings, resource_type, url, origin)
}

/// Stat-bucket key for a resource type ("image", "xhr", "websocket", ...).
fn resource_type_name(resource_type: &ResourceType) -> String {
    format!("{resource_type:?}").to_lowercase()
}

/// Upload sizes aren't reported on the wire; approximate from the serialized
/// header map plus the post body when one is attached.
fn approximate_request_bytes(event: &EventRequestWillBeSent) -> u64 {
    let header_bytes = serde_json::to_vec(&event.request.headers)
        .map(|bytes| bytes.len() as u64)
        .unwrap_or(0);
    let body_bytes = event.request.post_data_entries.as_ref().map_or(0, |entries| {
        entries
            .iter()
            .filter_map(|entry| entry.bytes.as_ref())
            .map(|bytes| AsRef::<str>::as_ref(bytes).len() as u64)
            .sum()
    });
    header_bytes + body_bytes
}

/// Controller for one optimized page.
///
/// Created around a page and the browser it lives in; all background work
/// (listener tasks, interception, memory monitor) is owned by this object
/// and stops at [`cleanup`](Self::cleanup).
pub struct ResourceOptimizer {
    browser: Arc<Browser>,
    page: Mutex<Page>,
    /// Context created by a recycle. The page's original context belongs to
    /// the pool and is never disposed from here.
    owned_context: Mutex<Option<BrowserContextId>>,
    settings: Arc<parking_lot::Mutex<OptimizeSettings>>,
    stats: Arc<parking_lot::Mutex<ResourceStats>>,
    pending: Arc<parking_lot::Mutex<HashMap<RequestId, Instant>>>,
    /// Resource type per in-flight request, attributed to the transfer total
    /// when `loadingFinished` reports the authoritative byte count.
    inflight_types: Arc<parking_lot::Mutex<HashMap<RequestId, String>>>,
    /// Document origin per frame, fed from Document-type paused requests.
    frame_origins: Arc<parking_lot::Mutex<HashMap<FrameId, String>>>,
    listeners_attached: AtomicBool,
    listener_tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    intercept_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    monitor_shutdown: Arc<AtomicBool>,
}

impl ResourceOptimizer {
    pub fn new(page: Page, browser: Arc<Browser>) -> Arc<Self> {
        Arc::new(Self {
            browser,
            page: Mutex::new(page),
            owned_context: Mutex::new(None),
            settings: Arc::new(parking_lot::Mutex::new(OptimizeSettings::default())),
            stats: Arc::new(parking_lot::Mutex::new(ResourceStats::default())),
            pending: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            inflight_types: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            frame_origins: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            listeners_attached: AtomicBool::new(false),
            listener_tasks: parking_lot::Mutex::new(Vec::new()),
            intercept_task: parking_lot::Mutex::new(None),
            monitor_task: Mutex::new(None),
            monitor_shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The page currently managed by this optimizer. Changes when a memory
    /// recycle replaces the browsing surface.
    pub async fn page(&self) -> Page {
        self.page.lock().await.clone()
    }

    /// Attach request/response/failure listeners. Idempotent; re-runs only
    /// after a recycle resets the guard.
    pub async fn setup(&self) -> Result<()> {
        if self.listeners_attached.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let page = self.page().await;
        if let Err(e) = self.attach_listeners(&page).await {
            self.listeners_attached.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Apply optimization settings: interception rules, cache/cookie policy,
    /// memory monitoring and page-level CPU tweaks.
    pub async fn optimize(self: &Arc<Self>, settings: OptimizeSettings) -> Result<()> {
        *self.settings.lock() = settings.clone();

        self.setup().await?;

        let page = self.page().await;
        self.install_interception(&page).await?;

        if settings.auto_clear_cache {
            if let Err(e) = self.clear_cache().await {
                warn!("Failed to clear cache during optimize: {e:#}");
            }
        }
        if settings.auto_clear_cookies {
            if let Err(e) = self.clear_cookies().await {
                warn!("Failed to clear cookies during optimize: {e:#}");
            }
        }

        if settings.memory_monitor_interval > Duration::ZERO {
            self.start_memory_monitoring().await;
        }

        self.apply_page_tweaks(&page).await;
        Ok(())
    }

    async fn attach_listeners(&self, page: &Page) -> Result<()> {
        let mut tasks = Vec::with_capacity(4);

        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("Failed to listen for request events")?;
        let stats = Arc::clone(&self.stats);
        let pending = Arc::clone(&self.pending);
        let inflight_types = Arc::clone(&self.inflight_types);
        tasks.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let type_name = event
                    .r#type
                    .as_ref()
                    .map_or_else(|| "other".to_string(), resource_type_name);
                pending.lock().insert(event.request_id.clone(), Instant::now());
                inflight_types
                    .lock()
                    .insert(event.request_id.clone(), type_name.clone());
                stats
                    .lock()
                    .record_request(&type_name, approximate_request_bytes(&event));
            }
        }));

        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .context("Failed to listen for response events")?;
        let stats = Arc::clone(&self.stats);
        let pending = Arc::clone(&self.pending);
        tasks.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let elapsed = pending
                    .lock()
                    .remove(&event.request_id)
                    .map(|start| start.elapsed());
                stats.lock().record_response(elapsed);
            }
        }));

        // responseReceived reports bytes-so-far (usually just headers);
        // loadingFinished carries the final encoded size of the transfer.
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .context("Failed to listen for loading-finished events")?;
        let stats = Arc::clone(&self.stats);
        let inflight_types = Arc::clone(&self.inflight_types);
        tasks.push(tokio::spawn(async move {
            while let Some(event) = finished.next().await {
                let type_name = inflight_types
                    .lock()
                    .remove(&event.request_id)
                    .unwrap_or_else(|| "other".to_string());
                let size = event.encoded_data_length.max(0.0) as u64;
                stats.lock().record_transfer(&type_name, size);
            }
        }));

        let mut failures = page
            .event_listener::<EventLoadingFailed>()
            .await
            .context("Failed to listen for request failures")?;
        let stats = Arc::clone(&self.stats);
        let pending = Arc::clone(&self.pending);
        let inflight_types = Arc::clone(&self.inflight_types);
        tasks.push(tokio::spawn(async move {
            while let Some(event) = failures.next().await {
                pending.lock().remove(&event.request_id);
                inflight_types.lock().remove(&event.request_id);
                stats.lock().record_failure();
            }
        }));

        self.listener_tasks.lock().extend(tasks);
        Ok(())
    }

    /// Enable `Fetch` with a single catch-all pattern and spawn the task that
    /// aborts or continues every paused request.
    async fn install_interception(&self, page: &Page) -> Result<()> {
        if let Some(task) = self.intercept_task.lock().take() {
            task.abort();
        }

        // Listen before enabling Fetch so no paused request slips past
        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .context("Failed to listen for paused requests")?;

        let enable = FetchEnableParams::builder()
            .patterns(vec![RequestPattern::builder().url_pattern("*").build()])
            .build();
        page.execute(enable)
            .await
            .context("Failed to enable request interception")?;

        let page = page.clone();
        let settings = Arc::clone(&self.settings);
        let frame_origins = Arc::clone(&self.frame_origins);
        let task = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let url = event.request.url.clone();

                // A document request moves its frame's origin; it is always
                // same-origin with itself.
                if event.resource_type == ResourceType::Document {
                    let mut origins = frame_origins.lock();
                    match origin_of(&url) {
                        Some(origin) => {
                            origins.insert(event.frame_id.clone(), origin);
                        }
                        None => {
                            origins.remove(&event.frame_id);
                        }
                    }
                }

                let block = {
                    let settings = settings.lock();
                    let origins = frame_origins.lock();
                    blocked_for_frame(
                        &settings,
                        &origins,
                        &event.frame_id,
                        &event.resource_type,
                        &url,
                    )
                };

                if block {
                    debug!("Blocking {:?} request: {url}", event.resource_type);
                    let params = FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    );
                    if let Err(e) = page.execute(params).await {
                        debug!("Failed to abort request: {e}");
                    }
                } else if let Err(e) = page
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                {
                    debug!("Failed to continue request: {e}");
                }
            }
        });
        *self.intercept_task.lock() = Some(task);

        Ok(())
    }

    /// Clear the browser cache (CDP) and the page's CacheStorage entries.
    pub async fn clear_cache(&self) -> Result<()> {
        let page = self.page().await;
        page.execute(ClearBrowserCacheParams::default())
            .await
            .context("Failed to clear browser cache")?;

        // CacheStorage is not covered by Network.clearBrowserCache
        if let Err(e) = page
            .evaluate(
                r"(() => {
                    if (window.caches) {
                        caches.keys().then(keys => keys.forEach(key => caches.delete(key)));
                    }
                })()",
            )
            .await
        {
            debug!("CacheStorage eviction failed: {e}");
        }
        Ok(())
    }

    pub async fn clear_cookies(&self) -> Result<()> {
        let page = self.page().await;
        page.execute(ClearBrowserCookiesParams::default())
            .await
            .context("Failed to clear cookies")?;
        Ok(())
    }

    /// Replace the browsing surface: fresh context, fresh page navigated to
    /// the old page's URL, listeners and interception re-attached, old page
    /// closed and any optimizer-owned context disposed.
    pub async fn recycle_page(&self) -> Result<()> {
        let old_page = self.page().await;
        let current_url = old_page.url().await.ok().flatten();

        let resp = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .context("Failed to create replacement context")?;
        let new_context = resp.browser_context_id.clone();

        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(new_context.clone())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build create-target params: {e}"))?;
        let new_page = self
            .browser
            .new_page(params)
            .await
            .context("Failed to create replacement page")?;

        // Warm the replacement before discarding the old surface
        if let Some(url) = current_url.filter(|u| u != "about:blank") {
            if let Err(e) = new_page.goto(url.clone()).await {
                warn!("Replacement page failed to reach {url}: {e}");
            }
        }

        *self.page.lock().await = new_page.clone();

        if let Err(e) = self
            .browser
            .execute(CloseTargetParams::new(old_page.target_id().clone()))
            .await
        {
            warn!("Failed to close recycled page: {e}");
        }
        let previous_context = self.owned_context.lock().await.replace(new_context);
        if let Some(context_id) = previous_context {
            if let Err(e) = self
                .browser
                .execute(DisposeBrowserContextParams::new(context_id))
                .await
            {
                warn!("Failed to dispose recycled context: {e}");
            }
        }

        // The new target needs its own listeners and interception
        for task in self.listener_tasks.lock().drain(..) {
            task.abort();
        }
        self.listeners_attached.store(false, Ordering::SeqCst);
        self.setup().await?;
        self.install_interception(&new_page).await?;

        debug!("Recycled optimizer page");
        Ok(())
    }

    /// Refresh and return the JS-heap snapshot; `None` when the engine does
    /// not expose `performance.memory`.
    pub async fn get_memory_usage(&self) -> Result<Option<MemorySnapshot>> {
        let page = self.page().await;
        let raw: Option<RawMemory> = page
            .evaluate(MEMORY_SNAPSHOT_JS)
            .await
            .context("Failed to sample page memory")?
            .into_value()
            .context("Failed to decode memory sample")?;

        let snapshot = raw.map(|m| {
            let mb = 1024.0 * 1024.0;
            MemorySnapshot {
                js_heap_used_mb: m.used / mb,
                js_heap_total_mb: m.total / mb,
                js_heap_limit_mb: m.limit / mb,
                js_heap_usage_percent: if m.limit > 0.0 { m.used / m.limit * 100.0 } else { 0.0 },
            }
        });
        self.stats.lock().set_memory(snapshot);
        Ok(snapshot)
    }

    /// Start the background memory monitor; a no-op when already running.
    pub async fn start_memory_monitoring(self: &Arc<Self>) {
        let mut monitor = self.monitor_task.lock().await;
        if monitor.is_some() {
            return;
        }
        self.monitor_shutdown.store(false, Ordering::SeqCst);

        let optimizer = Arc::clone(self);
        let interval = self.settings.lock().memory_monitor_interval;
        *monitor = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if optimizer.monitor_shutdown.load(Ordering::SeqCst) {
                    break;
                }

                match optimizer.get_memory_usage().await {
                    Ok(Some(snapshot)) => {
                        let (limit_mb, auto_restart) = {
                            let settings = optimizer.settings.lock();
                            (settings.memory_limit_mb, settings.auto_restart_on_memory_limit)
                        };
                        if auto_restart && snapshot.js_heap_used_mb > limit_mb {
                            warn!(
                                "Memory limit exceeded: {:.0}MB > {:.0}MB, recycling page",
                                snapshot.js_heap_used_mb, limit_mb
                            );
                            if let Err(e) = optimizer.clear_cache().await {
                                warn!("Monitor cache clear failed: {e:#}");
                            }
                            if let Err(e) = optimizer.recycle_page().await {
                                warn!("Monitor page recycle failed: {e:#}");
                            }
                        }
                    }
                    Ok(None) => {}
                    // Self-healing: log and try again next interval
                    Err(e) => warn!("Memory monitor error: {e:#}"),
                }
            }
            debug!("Memory monitor loop exiting");
        }));
    }

    /// Stop the memory monitor, awaiting the cancelled task.
    pub async fn stop_memory_monitoring(&self) {
        self.monitor_shutdown.store(true, Ordering::SeqCst);
        let task = self.monitor_task.lock().await.take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }

    /// Counters snapshot with a freshly sampled memory reading (best effort).
    pub async fn get_resource_stats(&self) -> ResourceStats {
        if let Err(e) = self.get_memory_usage().await {
            debug!("Memory refresh for stats snapshot failed: {e:#}");
        }
        self.stats.lock().clone()
    }

    /// Write a timestamped JSON stats report.
    pub async fn save_resource_stats(&self, path: &std::path::Path) -> Result<()> {
        let stats = self.get_resource_stats().await;
        stats.save(path)
    }

    pub fn reset_stats(&self) {
        self.stats.lock().reset();
        self.pending.lock().clear();
        self.inflight_types.lock().clear();
    }

    /// Stop background work and clear cache/cookies. The page itself is left
    /// for the pool to reclaim.
    pub async fn cleanup(&self) {
        self.stop_memory_monitoring().await;

        if let Some(task) = self.intercept_task.lock().take() {
            task.abort();
        }
        for task in self.listener_tasks.lock().drain(..) {
            task.abort();
        }
        self.listeners_attached.store(false, Ordering::SeqCst);

        if let Err(e) = self.clear_cache().await {
            warn!("Cleanup cache clear failed: {e:#}");
        }
        if let Err(e) = self.clear_cookies().await {
            warn!("Cleanup cookie clear failed: {e:#}");
        }
    }

    async fn apply_page_tweaks(&self, page: &Page) {
        for (name, script) in [
            ("disable-animations", DISABLE_ANIMATIONS_JS),
            ("coarsen-timers", COARSEN_TIMERS_JS),
            ("throttle-raf", THROTTLE_RAF_JS),
        ] {
            if let Err(e) = page.evaluate(script).await {
                debug!("Page tweak '{name}' failed: {e}");
            }
        }
    }
}

impl Drop for ResourceOptimizer {
    fn drop(&mut self) {
        self.monitor_shutdown.store(true, Ordering::SeqCst);
        if let Some(task) = self.monitor_task.get_mut().take() {
            task.abort();
        }
        if let Some(task) = self.intercept_task.lock().take() {
            task.abort();
        }
        for task in self.listener_tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_conservative_fetcher() {
        let settings = OptimizeSettings::default();
        assert!(!settings.block_images);
        assert!(!settings.block_third_party);
        assert!(settings.auto_clear_cache);
        assert!(!settings.auto_clear_cookies);
        assert_eq!(settings.memory_monitor_interval, Duration::from_secs(60));
        assert_eq!(settings.memory_limit_mb, 2048.0);
        assert!(settings.auto_restart_on_memory_limit);
    }

    #[test]
    fn origin_extraction() {
        assert_eq!(
            origin_of("https://example.com/a/b?q=1").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            origin_of("http://example.com:8080/x").as_deref(),
            Some("http://example.com:8080")
        );
        assert_eq!(origin_of("not a url"), None);
    }

    #[test]
    fn same_origin_requires_scheme_host_and_port() {
        assert!(is_same_origin("https://example.com/img.png", "https://example.com"));
        assert!(!is_same_origin("http://example.com/img.png", "https://example.com"));
        assert!(!is_same_origin("https://cdn.example.com/img.png", "https://example.com"));
        assert!(!is_same_origin("garbage", "https://example.com"));
    }

    #[test]
    fn blocks_images_when_flagged() {
        let settings = OptimizeSettings {
            block_images: true,
            ..Default::default()
        };
        assert!(should_block(&settings, &ResourceType::Image, "https://a.com/x.png", None));
        // Documents always continue under a type-only policy
        assert!(!should_block(&settings, &ResourceType::Document, "https://a.com/", None));
    }

    #[test]
    fn block_media_also_covers_websockets() {
        let settings = OptimizeSettings {
            block_media: true,
            ..Default::default()
        };
        assert!(should_block(&settings, &ResourceType::Media, "https://a.com/v.mp4", None));
        assert!(should_block(&settings, &ResourceType::WebSocket, "wss://a.com/ws", None));
        assert!(!should_block(&settings, &ResourceType::Image, "https://a.com/x.png", None));
    }

    #[test]
    fn third_party_blocking_compares_document_origin() {
        let settings = OptimizeSettings {
            block_third_party: true,
            ..Default::default()
        };
        let origin = Some("https://example.com");
        assert!(!should_block(
            &settings,
            &ResourceType::Script,
            "https://example.com/app.js",
            origin
        ));
        assert!(should_block(
            &settings,
            &ResourceType::Script,
            "https://tracker.io/t.js",
            origin
        ));
        // No known document origin: cannot classify, let it through
        assert!(!should_block(
            &settings,
            &ResourceType::Script,
            "https://tracker.io/t.js",
            None
        ));
    }

    #[test]
    fn type_rules_apply_before_third_party() {
        let settings = OptimizeSettings {
            block_images: true,
            block_third_party: true,
            ..Default::default()
        };
        // Same-origin image is still blocked by the type rule
        assert!(should_block(
            &settings,
            &ResourceType::Image,
            "https://example.com/x.png",
            Some("https://example.com")
        ));
    }

    #[test]
    fn frames_are_classified_against_their_own_origin() {
        let settings = OptimizeSettings {
            block_third_party: true,
            ..Default::default()
        };
        let mut origins: HashMap<&str, String> = HashMap::new();
        origins.insert("main", "https://example.com".to_string());
        origins.insert("iframe", "https://ads.example.net".to_string());

        // A main-frame resource stays first-party even after a cross-origin
        // iframe document has been seen
        assert!(!blocked_for_frame(
            &settings,
            &origins,
            &"main",
            &ResourceType::Script,
            "https://example.com/app.js"
        ));
        // The iframe's own subresource is first-party for the iframe
        assert!(!blocked_for_frame(
            &settings,
            &origins,
            &"iframe",
            &ResourceType::Script,
            "https://ads.example.net/ad.js"
        ));
        // ...but third-party from the main frame's point of view
        assert!(blocked_for_frame(
            &settings,
            &origins,
            &"main",
            &ResourceType::Script,
            "https://ads.example.net/ad.js"
        ));
        // Unknown frame: no origin to compare against, continue
        assert!(!blocked_for_frame(
            &settings,
            &origins,
            &"popup",
            &ResourceType::Script,
            "https://tracker.io/t.js"
        ));
    }

    #[test]
    fn resource_type_bucket_names() {
        assert_eq!(resource_type_name(&ResourceType::Image), "image");
        assert_eq!(resource_type_name(&ResourceType::WebSocket), "websocket");
        assert_eq!(resource_type_name(&ResourceType::Xhr), "xhr");
    }
}
