//! Direct HTTP client: establishes its own connection (optionally through
//! an upstream proxy) and speaks HTTP directly to the target.
//!
//! Proxy handshakes (SOCKS4/5, HTTP CONNECT, absolute-URI-over-HTTP-proxy)
//! are delegated to `reqwest`'s own `Proxy` builder rather than hand-rolled
//! here — see SPEC_FULL.md Section 10. The hand-rolled dial state machine
//! is reserved for the local proxy gateway (`crate::gateway`), which must
//! terminate arbitrary inbound browser traffic rather than originate one
//! outbound request.

use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::debug;

use super::{ErrorType, HttpClient, Response};
use crate::constants::{CHROME_USER_AGENT, CONNECT_TIMEOUT, REQUEST_TIMEOUT};

pub struct DirectClient {
    proxy: Mutex<Option<String>>,
    connect_timeout: Mutex<Duration>,
    /// One reqwest client per distinct proxy URL seen so far, plus a
    /// no-proxy client under the empty-string key. reqwest clients bundle
    /// connection pools, so we avoid rebuilding one per request.
    clients: DashMap<String, Client>,
}

impl DirectClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            proxy: Mutex::new(None),
            connect_timeout: Mutex::new(CONNECT_TIMEOUT),
            clients: DashMap::new(),
        }
    }

    fn client_for(&self, proxy_url: Option<&str>) -> Result<Client, String> {
        let key = proxy_url.unwrap_or_default().to_string();
        if let Some(existing) = self.clients.get(&key) {
            return Ok(existing.clone());
        }
        let connect_timeout = *self.connect_timeout.lock().expect("mutex poisoned");
        let mut builder = ClientBuilder::new()
            .user_agent(CHROME_USER_AGENT)
            .connect_timeout(connect_timeout)
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10));
        if let Some(url) = proxy_url {
            let proxy = Proxy::all(url).map_err(|e| e.to_string())?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| e.to_string())?;
        self.clients.insert(key, client.clone());
        Ok(client)
    }

    async fn request(&self, url: &str, head_only: bool) -> Response {
        let proxy_url = self.proxy.lock().expect("mutex poisoned").clone();
        let client = match self.client_for(proxy_url.as_deref()) {
            Ok(c) => c,
            Err(e) => {
                let error_type = if proxy_url.is_some() {
                    ErrorType::Proxy
                } else {
                    ErrorType::Other
                };
                return Response::transport_error(url, error_type, e);
            }
        };

        let request = if head_only {
            client.head(url)
        } else {
            client.get(url)
        };

        let resp = match request.send().await {
            Ok(r) => r,
            Err(e) => return Self::map_transport_error(url, &e, proxy_url.is_some()),
        };

        let effective_url = resp.url().to_string();
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if !head_only && content_type.starts_with("image/") {
            debug!(url, content_type, "aborting body download, image content type");
            return Response {
                effective_url,
                status: 200,
                content_type,
                body: Vec::new(),
                error_message: None,
                error_type: ErrorType::Skipped,
            };
        }

        let body = if head_only {
            Vec::new()
        } else {
            match resp.bytes().await {
                Ok(b) => b.to_vec(),
                Err(e) => return Self::map_transport_error(url, &e, proxy_url.is_some()),
            }
        };

        Response {
            effective_url,
            status,
            content_type,
            body,
            error_message: None,
            error_type: ErrorType::None,
        }
    }

    fn map_transport_error(url: &str, e: &reqwest::Error, proxied: bool) -> Response {
        let error_type = if e.is_timeout() {
            ErrorType::Timeout
        } else if e.is_connect() {
            if proxied {
                ErrorType::Proxy
            } else {
                ErrorType::Network
            }
        } else {
            ErrorType::Network
        };
        Response::transport_error(url, error_type, e.to_string())
    }
}

impl Default for DirectClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for DirectClient {
    fn set_proxy(&self, proxy: Option<String>) {
        *self.proxy.lock().expect("mutex poisoned") = proxy;
    }

    fn set_connect_timeout(&self, timeout: Duration) {
        *self.connect_timeout.lock().expect("mutex poisoned") = timeout;
    }

    fn get<'a>(&'a self, url: &'a str) -> super::BoxFuture<'a, Response> {
        Box::pin(self.request(url, false))
    }

    fn head<'a>(&'a self, url: &'a str) -> super::BoxFuture<'a, Response> {
        Box::pin(self.request(url, true))
    }
}
