use std::time::Duration;

use browserpool::{
    BrowserKind, BrowserPool, ContextOptions, LaunchOptions, OptimizeSettings, PoolConfig,
    ResourceOptimizer,
};

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

async fn optimized_page_fixture() -> (BrowserPool, std::sync::Arc<ResourceOptimizer>) {
    init_tracing();
    let pool = BrowserPool::new(PoolConfig::default().with_max_browsers(1));
    let instance = pool
        .acquire_browser(BrowserKind::Chromium, &LaunchOptions::default())
        .await
        .expect("acquire browser");
    let context = pool
        .get_context(&instance, &ContextOptions::default())
        .await
        .expect("create context");
    let page = pool.get_page(&context, &instance).await.expect("create page");
    let optimizer = ResourceOptimizer::new(page, instance.browser());
    (pool, optimizer)
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn optimize_attaches_and_counts_navigation_traffic() {
    let (pool, optimizer) = optimized_page_fixture().await;

    optimizer
        .optimize(OptimizeSettings {
            // Monitor noise is pointless in a short test
            memory_monitor_interval: Duration::ZERO,
            ..Default::default()
        })
        .await
        .expect("optimize page");

    let page = optimizer.page().await;
    page.goto("https://example.com").await.expect("navigate");
    page.wait_for_navigation().await.expect("load");

    let stats = optimizer.get_resource_stats().await;
    assert!(stats.network.requests >= 1, "document request should be counted");
    assert!(stats.network.bytes_received > 0);
    assert!(stats.resources_by_type.contains_key("document"));

    optimizer.reset_stats();
    let stats = optimizer.get_resource_stats().await;
    assert_eq!(stats.network.requests, 0);

    optimizer.cleanup().await;
    pool.close().await;
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn blocked_resource_types_show_up_as_failures() {
    let (pool, optimizer) = optimized_page_fixture().await;

    optimizer
        .optimize(OptimizeSettings {
            block_images: true,
            block_stylesheets: true,
            memory_monitor_interval: Duration::ZERO,
            ..Default::default()
        })
        .await
        .expect("optimize page");

    let page = optimizer.page().await;
    page.goto("https://example.com").await.expect("navigate");
    page.wait_for_navigation().await.expect("load");

    // The document itself must never be blocked
    let stats = optimizer.get_resource_stats().await;
    assert!(stats.resources_by_type.contains_key("document"));
    assert!(stats.network.responses >= 1);

    optimizer.cleanup().await;
    pool.close().await;
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn recycle_replaces_the_page_and_keeps_the_url() {
    let (pool, optimizer) = optimized_page_fixture().await;
    optimizer.setup().await.expect("setup listeners");

    let before = optimizer.page().await;
    before.goto("https://example.com").await.expect("navigate");
    before.wait_for_navigation().await.expect("load");

    optimizer.recycle_page().await.expect("recycle");

    let after = optimizer.page().await;
    assert_ne!(after.target_id(), before.target_id());
    let url = after.url().await.expect("url").unwrap_or_default();
    assert!(url.starts_with("https://example.com"));

    optimizer.cleanup().await;
    pool.close().await;
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn memory_snapshot_and_stats_report() {
    let (pool, optimizer) = optimized_page_fixture().await;
    optimizer.setup().await.expect("setup listeners");

    let page = optimizer.page().await;
    page.goto("https://example.com").await.expect("navigate");
    page.wait_for_navigation().await.expect("load");

    // Chromium exposes performance.memory, so a reading should come back
    let snapshot = optimizer.get_memory_usage().await.expect("sample memory");
    if let Some(snapshot) = snapshot {
        assert!(snapshot.js_heap_used_mb > 0.0);
        assert!(snapshot.js_heap_limit_mb >= snapshot.js_heap_used_mb);
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("report.json");
    optimizer.save_resource_stats(&path).await.expect("save report");

    let raw = std::fs::read_to_string(&path).expect("read report");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert!(value["timestamp"].is_string());
    assert!(value["stats"]["network"]["requests"].is_u64());

    optimizer.cleanup().await;
    pool.close().await;
}
