//! Browser process launching.
//!
//! Builds a hardened default flag set suitable for headless servers, merges
//! caller overrides on top (caller wins on conflicting flag keys), and tracks
//! the chromiumoxide event-handler task so it can be stopped when the
//! instance is retired.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use futures::StreamExt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::PoolError;

/// Browser engine families a caller can ask for.
///
/// The CDP backend only drives Chromium-family binaries; asking for Firefox
/// or Webkit is a configuration error surfaced as
/// [`PoolError::UnsupportedEngine`], as is any unrecognized kind string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserKind {
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::Webkit => "webkit",
        }
    }
}

impl FromStr for BrowserKind {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Self::Chromium),
            "firefox" => Ok(Self::Firefox),
            "webkit" => Ok(Self::Webkit),
            other => Err(PoolError::UnsupportedEngine(other.to_string())),
        }
    }
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hardened defaults for a headless scraping server.
///
/// GPU and sandbox flags keep Chrome bootable inside containers; the
/// background-throttling flags stop hidden tabs from starving the fetcher.
const DEFAULT_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-component-extensions-with-background-pages",
    "--disable-features=TranslateUI,BlinkGenPropertyTrees",
    "--disable-ipc-flooding-protection",
    "--disable-renderer-backgrounding",
    "--disable-hang-monitor",
    "--disable-prompt-on-repost",
    "--disable-popup-blocking",
    "--enable-features=NetworkService,NetworkServiceInProcess",
    "--force-color-profile=srgb",
    "--hide-scrollbars",
    "--metrics-recording-only",
    "--mute-audio",
    "--no-first-run",
    "--no-default-browser-check",
    "--password-store=basic",
    "--use-mock-keychain",
];

/// Launch options for a pooled browser process.
///
/// `args` are merged over [`DEFAULT_ARGS`]; a caller flag replaces a default
/// flag with the same key (the text before `=`).
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Explicit browser binary. When `None`, chromiumoxide auto-detects an
    /// installed Chrome/Chromium.
    pub executable: Option<PathBuf>,
    pub window_size: (u32, u32),
    /// Timeout for individual CDP requests, including the launch handshake.
    pub request_timeout: Duration,
    pub args: Vec<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            window_size: (1920, 1080),
            request_timeout: Duration::from_secs(30),
            args: Vec::new(),
        }
    }
}

fn remove_profile_dir(path: &PathBuf) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        debug!("Failed to remove profile dir {}: {e}", path.display());
    }
}

/// The flag identity used for override resolution: everything before `=`.
fn flag_key(arg: &str) -> &str {
    arg.split_once('=').map_or(arg, |(key, _)| key)
}

/// Merge caller args over the defaults. Caller flags win on key conflicts;
/// relative order is defaults-then-overrides with replaced defaults removed.
pub(crate) fn merge_args(defaults: &[&str], overrides: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = defaults
        .iter()
        .filter(|default| {
            !overrides
                .iter()
                .any(|over| flag_key(over) == flag_key(default))
        })
        .map(|s| (*s).to_string())
        .collect();
    merged.extend(overrides.iter().cloned());
    merged
}

/// Launch a browser process and spawn its CDP event-handler loop.
///
/// Returns the browser, the handler task (MUST be aborted when the instance
/// is retired) and the unique user-data directory that must be removed after
/// the process exits.
pub(crate) async fn launch(options: &LaunchOptions) -> Result<(Browser, JoinHandle<()>, PathBuf)> {
    // Unique profile per instance prevents SingletonLock contention when
    // several pooled browsers run side by side.
    let user_data_dir = std::env::temp_dir().join(format!("browserpool_{}", Uuid::new_v4()));
    std::fs::create_dir_all(&user_data_dir).context("Failed to create user data directory")?;

    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(options.request_timeout)
        .window_size(options.window_size.0, options.window_size.1)
        .user_data_dir(user_data_dir.clone());

    if let Some(ref executable) = options.executable {
        config_builder = config_builder.chrome_executable(executable.clone());
    }

    if options.headless {
        config_builder = config_builder.headless_mode(HeadlessMode::default());
    } else {
        config_builder = config_builder.with_head();
    }

    for arg in merge_args(DEFAULT_ARGS, &options.args) {
        config_builder = config_builder.arg(arg);
    }

    let browser_config = match config_builder.build() {
        Ok(config) => config,
        Err(e) => {
            remove_profile_dir(&user_data_dir);
            return Err(anyhow::anyhow!("Failed to build browser config: {e}"));
        }
    };

    info!("Launching browser process (headless: {})", options.headless);
    let (browser, mut handler) = match Browser::launch(browser_config).await {
        Ok(launched) => launched,
        Err(e) => {
            // The process never started, so the fresh profile dir is orphaned
            remove_profile_dir(&user_data_dir);
            return Err(e).context("Failed to launch browser");
        }
    };

    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let error_msg = e.to_string();

                // Chrome sends CDP events chromiumoxide doesn't recognize;
                // those deserialization failures are noise, not faults.
                // See mattsse/chromiumoxide#167 and #229.
                let is_benign_serialization_error = error_msg
                    .contains("data did not match any variant of untagged enum Message")
                    || error_msg.contains("Failed to deserialize WS response");

                if !is_benign_serialization_error {
                    error!("Browser handler error: {error_msg}");
                }
            }
        }
        debug!("Browser event handler task completed");
    });

    Ok((browser, handler_task, user_data_dir))
}
