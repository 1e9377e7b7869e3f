//! Proxy rotation scenario (spec section 8, scenario 6). The failing proxy
//! is placed in a higher priority tier (SOCKS5) than the healthy one
//! (HTTP) so it is always preferred while it survives, isolating the test
//! from the separate round-robin-within-a-tier behavior (already covered
//! by `proxy::pool`'s own unit tests). `max_retries = 2` means its third
//! failure evicts it, after which the engine's per-URL retry budget is
//! exhausted too, so the URL is requeued and picked up again with only the
//! healthy proxy left.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use polite_crawler::crawl::{Engine, EngineConfig};
use polite_crawler::fetch::{ErrorType, HttpClient, Response};
use polite_crawler::proxy::ProxyPool;

/// Fails (429) whenever the currently-set proxy URL contains "bad".
struct ProxyAwareClient {
    current_proxy: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ProxyAwareClient {
    fn new() -> Self {
        Self {
            current_proxy: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }
}

impl HttpClient for ProxyAwareClient {
    fn set_proxy(&self, proxy: Option<String>) {
        *self.current_proxy.lock().expect("mutex poisoned") = proxy;
    }
    fn set_connect_timeout(&self, _timeout: Duration) {}

    fn get<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = Response> + Send + 'a>> {
        Box::pin(async move {
            if url.ends_with("/robots.txt") {
                return Response {
                    effective_url: url.to_string(),
                    status: 404,
                    content_type: String::new(),
                    body: Vec::new(),
                    error_message: None,
                    error_type: ErrorType::None,
                };
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            let using_bad_proxy = self
                .current_proxy
                .lock()
                .expect("mutex poisoned")
                .as_deref()
                .map(|p| p.contains("bad"))
                .unwrap_or(false);
            let status = if using_bad_proxy { 429 } else { 200 };
            Response {
                effective_url: url.to_string(),
                status,
                content_type: "text/html".to_string(),
                body: b"ok".to_vec(),
                error_message: None,
                error_type: ErrorType::None,
            }
        })
    }

    fn head<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = Response> + Send + 'a>> {
        self.get(url)
    }
}

#[tokio::test]
async fn failing_higher_tier_proxy_is_evicted_and_rotation_falls_through() {
    let priorities = HashMap::from([
        ("http".to_string(), 0),
        ("socks4".to_string(), 1),
        ("socks5".to_string(), 2),
    ]);
    let pool = Arc::new(ProxyPool::new(
        vec![
            "http://good-proxy:8080".to_string(),
            "socks5://bad-proxy:8080".to_string(),
        ],
        2,
        &priorities,
    ));
    let client = Arc::new(ProxyAwareClient::new());
    let out = tempfile::tempdir().expect("tempdir");
    let engine = Arc::new(Engine::new(
        "example.com".to_string(),
        client.clone(),
        Some(Arc::clone(&pool)),
        EngineConfig {
            max_depth: 0,
            output_dir: out.path().to_path_buf(),
            tree_structure: true,
            user_agent: "polite-crawler-test/1.0".to_string(),
        },
    ));
    engine.add_seed("http://example.com/page".to_string());
    engine.run(1).await;

    assert!(
        out.path().join("example.com/page.md").exists(),
        "content should have been saved once the pool fell through to the healthy proxy"
    );
    assert_eq!(pool.len(), 1, "the bad proxy should have been evicted");
    let survivor = pool.get_proxy().expect("one proxy remains");
    assert!(survivor.url.contains("good"), "the healthy proxy should be the one left");
    // 3 failing attempts against the bad proxy (evicted once failure_count
    // exceeds max_retries=2) plus 1 successful attempt against the good one.
    assert_eq!(client.calls.load(Ordering::SeqCst), 4);
}
