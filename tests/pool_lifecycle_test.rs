use std::time::Duration;

use browserpool::{
    BrowserKind, BrowserPool, ContextOptions, LaunchOptions, PoolConfig, PoolError,
    SaturationPolicy,
};

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn small_pool_config() -> PoolConfig {
    PoolConfig::default()
        .with_max_browsers(1)
        .with_max_contexts_per_browser(2)
        .with_cleanup_interval(Duration::from_secs(3600))
}

#[tokio::test]
async fn stats_on_empty_pool_are_zero() {
    let pool = BrowserPool::new(small_pool_config());
    let stats = pool.stats().await;
    assert_eq!(stats.total_browsers, 0);
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.total_contexts, 0);
    assert_eq!(stats.total_pages, 0);
    assert_eq!(stats.total_requests, 0);
}

#[tokio::test]
async fn firefox_and_webkit_are_rejected() {
    let pool = BrowserPool::new(small_pool_config());
    for kind in [BrowserKind::Firefox, BrowserKind::Webkit] {
        let err = pool
            .acquire_browser(kind, &LaunchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::UnsupportedEngine(_)), "{kind} should be rejected");
    }
}

#[tokio::test]
async fn failed_launch_leaves_no_profile_dir_behind() {
    fn profile_dir_count() -> usize {
        std::fs::read_dir(std::env::temp_dir())
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| {
                        entry
                            .file_name()
                            .to_string_lossy()
                            .starts_with("browserpool_")
                    })
                    .count()
            })
            .unwrap_or(0)
    }

    let before = profile_dir_count();
    let options = LaunchOptions {
        executable: Some("/nonexistent/chromium-binary".into()),
        ..Default::default()
    };
    let pool = BrowserPool::new(small_pool_config());
    let err = pool.acquire_browser(BrowserKind::Chromium, &options).await;
    assert!(err.is_err(), "launch with a missing binary must fail");
    assert_eq!(profile_dir_count(), before, "failed launch must not orphan its profile dir");
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn acquire_use_release_round_trip() {
    init_tracing();
    let pool = BrowserPool::new(small_pool_config());
    let instance = pool
        .acquire_browser(BrowserKind::Chromium, &LaunchOptions::default())
        .await
        .expect("acquire browser");
    assert!(instance.is_in_use().await);

    let context = pool
        .get_context(&instance, &ContextOptions::default())
        .await
        .expect("create context");
    let page = pool.get_page(&context, &instance).await.expect("create page");
    page.goto("about:blank").await.expect("navigate");

    let stats = pool.stats().await;
    assert_eq!(stats.total_browsers, 1);
    assert_eq!(stats.in_use, 1);
    assert_eq!(stats.total_contexts, 1);
    assert_eq!(stats.total_pages, 1);
    assert_eq!(stats.total_requests, 1);

    pool.release_context(&context, &instance).await.expect("release context");
    assert_eq!(instance.context_count().await, 0);

    pool.release_browser(&instance).await;
    assert!(!instance.is_in_use().await);

    // The released instance is handed out again instead of a new launch
    let again = pool
        .acquire_browser(BrowserKind::Chromium, &LaunchOptions::default())
        .await
        .expect("re-acquire browser");
    assert_eq!(again.id(), instance.id());
    assert_eq!(pool.stats().await.total_browsers, 1);

    pool.close().await;
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn saturation_recycles_the_lru_instance() {
    init_tracing();
    let pool = BrowserPool::new(small_pool_config());
    let first = pool
        .acquire_browser(BrowserKind::Chromium, &LaunchOptions::default())
        .await
        .expect("acquire browser");
    let context = pool
        .get_context(&first, &ContextOptions::default())
        .await
        .expect("create context");
    let _page = pool.get_page(&context, &first).await.expect("create page");

    // Pool of one, instance still checked out: the fallback strips the
    // same instance and hands it back rather than blocking.
    let second = pool
        .acquire_browser(BrowserKind::Chromium, &LaunchOptions::default())
        .await
        .expect("acquire under saturation");
    assert_eq!(second.id(), first.id());
    assert!(second.is_in_use().await);
    assert_eq!(second.context_count().await, 0, "contexts are force-closed");

    pool.close().await;
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn fail_fast_policy_errors_when_all_instances_are_busy() {
    init_tracing();
    let config = small_pool_config().with_saturation_policy(SaturationPolicy::FailFast);
    let pool = BrowserPool::new(config);
    let first = pool
        .acquire_browser(BrowserKind::Chromium, &LaunchOptions::default())
        .await
        .expect("acquire browser");

    let err = pool
        .acquire_browser(BrowserKind::Chromium, &LaunchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::Saturated(1)));

    // After a release the same instance is available again
    pool.release_browser(&first).await;
    let again = pool
        .acquire_browser(BrowserKind::Chromium, &LaunchOptions::default())
        .await
        .expect("acquire after release");
    assert_eq!(again.id(), first.id());

    pool.close().await;
}

#[tokio::test]
#[ignore] // Requires browser installation
async fn close_is_idempotent_with_live_instances() {
    init_tracing();
    let pool = BrowserPool::new(small_pool_config());
    let _instance = pool
        .acquire_browser(BrowserKind::Chromium, &LaunchOptions::default())
        .await
        .expect("acquire browser");

    pool.close().await;
    pool.close().await;

    let err = pool
        .acquire_browser(BrowserKind::Chromium, &LaunchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::PoolClosed));
}
