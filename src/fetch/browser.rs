//! Browser-rendered fetch-client variant (4.E): issues a HEAD first to
//! decide whether a URL is a downloadable binary (routed straight through
//! the direct client) or HTML worth rendering (driven through a headless
//! browser and read back as `outerHTML`).

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chromiumoxide::Browser;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::warn;

use super::{DirectClient, ErrorType, HttpClient, Response};
use crate::browser_launch::{apply_stealth_measures, launch_browser};
use crate::constants::PAGE_LOAD_TIMEOUT;
use crate::mime_map::is_downloadable_binary;

struct BrowserHandle {
    browser: Browser,
    _handler_task: JoinHandle<()>,
    _user_data_dir: PathBuf,
}

/// Lazily-launched headless browser plus a `DirectClient` delegate for the
/// HEAD probe and for binary-content GETs that don't need rendering.
pub struct BrowserClient {
    direct: DirectClient,
    headless: bool,
    explicit_browser: Option<PathBuf>,
    gateway_proxy_url: Mutex<Option<String>>,
    cdp_port: u16,
    handle: AsyncMutex<Option<BrowserHandle>>,
}

impl BrowserClient {
    #[must_use]
    pub fn new(headless: bool, explicit_browser: Option<PathBuf>, cdp_port: u16) -> Self {
        Self {
            direct: DirectClient::new(),
            headless,
            explicit_browser,
            gateway_proxy_url: Mutex::new(None),
            cdp_port,
            handle: AsyncMutex::new(None),
        }
    }

    async fn ensure_browser<'a>(
        &'a self,
        guard: &mut tokio::sync::MutexGuard<'a, Option<BrowserHandle>>,
    ) -> Result<(), String> {
        if guard.is_some() {
            return Ok(());
        }
        let proxy_url = self.gateway_proxy_url.lock().expect("mutex poisoned").clone();
        let (browser, handler_task, user_data_dir) = launch_browser(
            self.headless,
            self.explicit_browser.as_ref(),
            proxy_url.as_deref(),
            self.cdp_port,
        )
        .await
        .map_err(|e| e.to_string())?;
        **guard = Some(BrowserHandle {
            browser,
            _handler_task: handler_task,
            _user_data_dir: user_data_dir,
        });
        Ok(())
    }

    async fn render(&self, url: &str) -> Response {
        let browser = {
            let mut guard = self.handle.lock().await;
            if let Err(e) = self.ensure_browser(&mut guard).await {
                return Response::transport_error(url, ErrorType::Browser, e);
            }
            // `Browser` is an Arc-backed handle to the CDP connection; clone
            // it out and drop the lock so concurrent fetches don't serialize
            // on one mutex for the whole page lifetime.
            guard.as_ref().expect("just ensured").browser.clone()
        };

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => return Response::transport_error(url, ErrorType::Browser, e.to_string()),
        };

        if let Err(e) = apply_stealth_measures(&page).await {
            warn!(url, error = %e, "stealth measures failed, continuing anyway");
        }

        if let Err(e) = page.goto(url).await {
            return Response::transport_error(url, ErrorType::Render, e.to_string());
        }

        match tokio::time::timeout(PAGE_LOAD_TIMEOUT, page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Response::transport_error(url, ErrorType::Render, e.to_string()),
            Err(_) => return Response::transport_error(url, ErrorType::Timeout, "page load timed out"),
        }

        let effective_url = page.url().await.ok().flatten().unwrap_or_else(|| url.to_string());

        let js_result = match page.evaluate("document.documentElement.outerHTML").await {
            Ok(r) => r,
            Err(e) => {
                let _ = page.close().await;
                return Response::transport_error(url, ErrorType::Render, e.to_string());
            }
        };
        let html: Result<String, _> = js_result.into_value();

        let _ = page.close().await;

        match html {
            Ok(body) => Response {
                effective_url,
                status: 200,
                content_type: "text/html".to_string(),
                body: body.into_bytes(),
                error_message: None,
                error_type: ErrorType::None,
            },
            Err(e) => Response::transport_error(url, ErrorType::Render, e.to_string()),
        }
    }

    async fn fetch(&self, url: &str) -> Response {
        let head = self.direct.head(url).await;
        if head.status == 0 {
            // HEAD can fail on servers that reject it outright; fall back to
            // rendering, which performs its own full navigation regardless.
            return self.render(url).await;
        }
        if is_downloadable_binary(&head.content_type) {
            return self.direct.get(url).await;
        }
        self.render(url).await
    }
}

impl HttpClient for BrowserClient {
    fn set_proxy(&self, proxy: Option<String>) {
        self.direct.set_proxy(proxy.clone());
        *self.gateway_proxy_url.lock().expect("mutex poisoned") = proxy;
    }

    fn set_connect_timeout(&self, timeout: Duration) {
        self.direct.set_connect_timeout(timeout);
    }

    fn get<'a>(&'a self, url: &'a str) -> super::BoxFuture<'a, Response> {
        Box::pin(self.fetch(url))
    }

    fn head<'a>(&'a self, url: &'a str) -> super::BoxFuture<'a, Response> {
        Box::pin(self.direct.head(url))
    }
}
