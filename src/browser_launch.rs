//! Headless browser discovery and launch for the browser fetch-client
//! variant (4.E) and the engine's startup sequence (4.G step 5).

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

use crate::constants::CHROME_USER_AGENT;

/// Locate a Chrome/Chromium executable. `explicit` (from `--browser`) wins
/// outright; otherwise search a platform-specific list of canonical paths,
/// then fall back to `which`.
pub async fn find_browser_executable(explicit: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.clone());
        }
        warn!(path = %path.display(), "explicit --browser path does not exist");
    }

    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!(path = %path.display(), "using browser from CHROMIUM_PATH");
            return Ok(path);
        }
    }

    let paths = if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"%LOCALAPPDATA%\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };

    for path_str in paths {
        let path = if path_str.contains('%') && cfg!(target_os = "windows") {
            PathBuf::from(expand_windows_env_vars(path_str))
        } else {
            PathBuf::from(path_str)
        };
        if path.exists() {
            info!(path = %path.display(), "found browser");
            return Ok(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in &["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path_str.is_empty() {
                        return Ok(PathBuf::from(path_str));
                    }
                }
            }
        }
    }

    warn!("no Chrome/Chromium executable found; will download managed browser");
    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

fn expand_windows_env_vars(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '%' {
            let mut var_name = String::new();
            let mut found_closing = false;
            for c in chars.by_ref() {
                if c == '%' {
                    found_closing = true;
                    break;
                }
                var_name.push(c);
            }
            if found_closing && !var_name.is_empty() {
                match std::env::var(&var_name) {
                    Ok(value) => result.push_str(&value),
                    Err(_) => {
                        result.push('%');
                        result.push_str(&var_name);
                        result.push('%');
                    }
                }
            } else if found_closing {
                result.push('%');
            } else {
                result.push('%');
                result.push_str(&var_name);
            }
        } else {
            result.push(ch);
        }
    }
    result
}

/// Download a managed Chromium build into the system temp directory's
/// cache subfolder, used when no local install is found.
pub async fn download_managed_browser() -> Result<PathBuf> {
    info!("downloading managed Chromium browser");
    let cache_dir = std::env::temp_dir().join("polite_crawler_chrome_cache");
    std::fs::create_dir_all(&cache_dir).context("failed to create browser cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("failed to build browser fetcher options")?,
    );
    let revision_info = fetcher.fetch().await.context("failed to fetch browser")?;
    info!(path = %revision_info.folder_path.display(), "downloaded Chromium");
    Ok(revision_info.executable_path)
}

/// Launch a headless (or windowed, for `--no-headless`) browser, optionally
/// configured to egress through the local proxy gateway via
/// `--proxy-server`.
pub async fn launch_browser(
    headless: bool,
    explicit_browser: Option<&PathBuf>,
    gateway_proxy_url: Option<&str>,
    cdp_port: u16,
) -> Result<(Browser, JoinHandle<()>, PathBuf)> {
    let chrome_path = match find_browser_executable(explicit_browser).await {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    let user_data_dir =
        std::env::temp_dir().join(format!("polite_crawler_chrome_{}", std::process::id()));
    std::fs::create_dir_all(&user_data_dir).context("failed to create browser user data dir")?;

    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(1920, 1080)
        .port(cdp_port)
        .user_data_dir(user_data_dir.clone())
        .chrome_executable(chrome_path);

    config_builder = if headless {
        config_builder.headless_mode(HeadlessMode::default())
    } else {
        config_builder.with_head()
    };

    config_builder = config_builder
        .arg(format!("--user-agent={CHROME_USER_AGENT}"))
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--no-sandbox")
        .arg("--disable-extensions")
        .arg("--disable-popup-blocking")
        .arg("--mute-audio");

    if let Some(proxy_url) = gateway_proxy_url {
        config_builder = config_builder.arg(format!("--proxy-server={proxy_url}"));
    }

    let browser_config = config_builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                let msg = e.to_string();
                let benign = msg.contains("data did not match any variant of untagged enum Message")
                    || msg.contains("Failed to deserialize WS response");
                if benign {
                    trace!(error = %msg, "suppressed benign CDP serialization error");
                } else {
                    error!(error = %msg, "browser handler error");
                }
            }
        }
        info!("browser handler task completed");
    });

    Ok((browser, handler_task, user_data_dir))
}

/// Basic stealth JS injection: hide `navigator.webdriver`, pin the user
/// agent, and fix `navigator.languages`. Intentionally lighter than a full
/// fingerprint-evasion suite; nothing in scope needs more.
pub async fn apply_stealth_measures(page: &chromiumoxide::Page) -> Result<()> {
    page.evaluate("Object.defineProperty(navigator, 'webdriver', { get: () => false });")
        .await?;
    page.evaluate(format!(
        "Object.defineProperty(navigator, 'userAgent', {{ value: '{CHROME_USER_AGENT}' }});"
    ))
    .await?;
    page.evaluate("Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });")
        .await?;
    Ok(())
}
