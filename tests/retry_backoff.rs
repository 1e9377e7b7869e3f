//! Retry/backoff timing (spec Testable Property 7) and retry-recovery
//! scenario, driven with a scripted `HttpClient` double instead of real
//! sockets so the sleep durations can be asserted precisely.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use polite_crawler::crawl::{Engine, EngineConfig};
use polite_crawler::fetch::{ErrorType, HttpClient, Response};

/// Returns a fixed sequence of statuses for `/flaky`, one per call; the last
/// entry repeats once exhausted. Everything else (robots.txt) succeeds as a
/// permissive 404.
struct ScriptedClient {
    statuses: Vec<u16>,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedClient {
    fn new(statuses: Vec<u16>) -> Self {
        Self {
            statuses,
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }
}

impl HttpClient for ScriptedClient {
    fn set_proxy(&self, _proxy: Option<String>) {}
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
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            self.call_times.lock().expect("mutex poisoned").push(Instant::now());
            let status = *self.statuses.get(idx).unwrap_or_else(|| self.statuses.last().unwrap());
            Response {
                effective_url: url.to_string(),
                status,
                content_type: "text/html".to_string(),
                body: b"recovered".to_vec(),
                error_message: None,
                error_type: ErrorType::None,
            }
        })
    }

    fn head<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = Response> + Send + 'a>> {
        self.get(url)
    }
}

fn engine_config(out: &std::path::Path) -> EngineConfig {
    EngineConfig {
        max_depth: 0,
        output_dir: out.to_path_buf(),
        tree_structure: true,
        user_agent: "polite-crawler-test/1.0".to_string(),
    }
}

#[tokio::test]
async fn three_failures_sleep_roughly_one_then_two_seconds_then_gives_up() {
    let client = Arc::new(ScriptedClient::new(vec![503, 503, 503]));
    let out = tempfile::tempdir().expect("tempdir");
    let engine = Arc::new(Engine::new(
        "example.com".to_string(),
        client.clone(),
        None,
        engine_config(out.path()),
    ));
    engine.add_seed("http://example.com/flaky".to_string());

    let started = Instant::now();
    engine.run(1).await;
    let elapsed = started.elapsed();

    // attempt 1 fails immediately, sleep ~1s; attempt 2 fails, sleep ~2s;
    // attempt 3 fails, no further sleep (gives up). Lower bound only — CI
    // jitter only ever adds time, never removes it.
    assert!(
        elapsed >= Duration::from_millis(2900),
        "expected at least ~3s of backoff, got {elapsed:?}"
    );
    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    assert!(!out.path().join("example.com/flaky.md").exists());
}

#[tokio::test]
async fn success_on_second_attempt_stops_retrying_and_saves_content() {
    let client = Arc::new(ScriptedClient::new(vec![503, 200]));
    let out = tempfile::tempdir().expect("tempdir");
    let engine = Arc::new(Engine::new(
        "example.com".to_string(),
        client.clone(),
        None,
        engine_config(out.path()),
    ));
    engine.add_seed("http://example.com/flaky".to_string());

    let started = Instant::now();
    engine.run(1).await;
    let elapsed = started.elapsed();

    assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    assert!(elapsed >= Duration::from_millis(900), "missing the one backoff sleep");
    assert!(elapsed < Duration::from_millis(2900), "slept past the second backoff window");
    assert!(out.path().join("example.com/flaky.md").exists());
}
