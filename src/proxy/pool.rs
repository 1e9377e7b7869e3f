//! Priority-tiered, failure-aware proxy pool (4.D).
//!
//! `get_proxy` always serves from the highest present priority tier, and
//! within that tier from the candidates tied for lowest failure count,
//! round-robining via a per-tier cursor rather than always returning the
//! first candidate. `report` resets a proxy's failure count on success or
//! increments it on failure, then sweeps out every proxy that has now
//! exceeded `max_retries` (not just the one just reported on).

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{error, warn};

/// The wire protocol a proxy URL's scheme implies, used to pick the dial
/// handshake. Independent of priority: a deployment may rank a slower SOCKS5
/// proxy above a faster HTTP one, but the scheme still dictates how to talk
/// to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
    Http,
    Socks4,
    Socks5,
}

impl ProxyScheme {
    fn from_url(url: &str) -> Self {
        if url.contains("socks5") {
            ProxyScheme::Socks5
        } else if url.contains("socks4") {
            ProxyScheme::Socks4
        } else {
            ProxyScheme::Http
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Socks4 => "socks4",
            ProxyScheme::Socks5 => "socks5",
        }
    }

    fn default_priority(self) -> i32 {
        match self {
            ProxyScheme::Http => 0,
            ProxyScheme::Socks4 => 1,
            ProxyScheme::Socks5 => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Proxy {
    pub url: String,
    pub failure_count: u32,
    pub scheme: ProxyScheme,
    /// Selection tier, looked up from the configured `{scheme: tier}` map at
    /// construction time. Higher is preferred; ties broken by failure count,
    /// then by round-robin cursor.
    pub priority: i32,
    /// Stable insertion-order id, used only for logging; selection order is
    /// driven by the pool's own candidate-index list, not this id.
    pub id: usize,
}

struct Inner {
    proxies: Vec<Proxy>,
    last_idx: HashMap<i32, usize>,
}

/// Thread-safe proxy pool. Uses a plain `std::sync::Mutex` rather than an
/// async one: every critical section below is pure bookkeeping with no
/// `.await` inside it.
pub struct ProxyPool {
    inner: Mutex<Inner>,
    max_retries: u32,
}

impl ProxyPool {
    /// `priorities` maps a scheme name (`"http"`, `"socks4"`, `"socks5"`) to
    /// its selection tier; a scheme missing from the map falls back to the
    /// built-in `{http: 0, socks4: 1, socks5: 2}` ranking.
    #[must_use]
    pub fn new(urls: Vec<String>, max_retries: u32, priorities: &HashMap<String, i32>) -> Self {
        let proxies = urls
            .into_iter()
            .enumerate()
            .map(|(id, url)| {
                let scheme = ProxyScheme::from_url(&url);
                let priority = priorities
                    .get(scheme.as_str())
                    .copied()
                    .unwrap_or_else(|| scheme.default_priority());
                Proxy {
                    url,
                    failure_count: 0,
                    scheme,
                    priority,
                    id,
                }
            })
            .collect();
        Self {
            inner: Mutex::new(Inner {
                proxies,
                last_idx: HashMap::new(),
            }),
            max_retries,
        }
    }

    /// Select a proxy to use, or `None` if the pool is empty. Round-robins
    /// within the lowest-failure-count candidates of the highest present
    /// priority tier.
    #[must_use]
    pub fn get_proxy(&self) -> Option<Proxy> {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        if inner.proxies.is_empty() {
            return None;
        }

        let highest = inner.proxies.iter().map(|p| p.priority).max()?;

        let min_failures = inner
            .proxies
            .iter()
            .filter(|p| p.priority == highest)
            .map(|p| p.failure_count)
            .min()?;

        let candidates: Vec<usize> = inner
            .proxies
            .iter()
            .enumerate()
            .filter(|(_, p)| p.priority == highest && p.failure_count == min_failures)
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let last_idx = *inner.last_idx.get(&highest).unwrap_or(&0);
        let selected_candidate = candidates
            .iter()
            .position(|&idx| idx > last_idx)
            .unwrap_or(0);

        let final_idx = candidates[selected_candidate];
        inner.last_idx.insert(highest, final_idx);

        Some(inner.proxies[final_idx].clone())
    }

    /// Record the outcome of using `proxy`, then evict every proxy (not
    /// just this one) whose failure count now exceeds `max_retries`.
    pub fn report(&self, proxy: &Proxy, success: bool) {
        let mut inner = self.inner.lock().expect("mutex poisoned");

        if let Some(p) = inner.proxies.iter_mut().find(|p| p.url == proxy.url) {
            if success {
                p.failure_count = 0;
            } else {
                p.failure_count += 1;
                if p.failure_count <= self.max_retries {
                    warn!(
                        url = p.url,
                        failures = p.failure_count,
                        max = self.max_retries,
                        "proxy failed"
                    );
                } else {
                    error!(url = p.url, "proxy removed, max retries exceeded");
                }
            }
        }

        let max_retries = self.max_retries;
        inner.proxies.retain(|p| p.failure_count <= max_retries);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("mutex poisoned").proxies.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("mutex poisoned").proxies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls() -> Vec<String> {
        vec![
            "http://a:1".to_string(),
            "http://b:1".to_string(),
            "socks5://c:1".to_string(),
        ]
    }

    fn default_priorities() -> HashMap<String, i32> {
        HashMap::from([
            ("http".to_string(), 0),
            ("socks4".to_string(), 1),
            ("socks5".to_string(), 2),
        ])
    }

    #[test]
    fn prefers_highest_tier() {
        let pool = ProxyPool::new(urls(), 3, &default_priorities());
        let p = pool.get_proxy().expect("pool not empty");
        assert_eq!(p.scheme, ProxyScheme::Socks5);
    }

    #[test]
    fn configured_priority_overrides_the_scheme_default() {
        // socks5 ranked below http: the http proxy should now win.
        let priorities = HashMap::from([("http".to_string(), 10), ("socks5".to_string(), 0)]);
        let pool = ProxyPool::new(urls(), 3, &priorities);
        let p = pool.get_proxy().expect("pool not empty");
        assert_eq!(p.scheme, ProxyScheme::Http);
    }

    #[test]
    fn missing_scheme_falls_back_to_the_built_in_default() {
        let pool = ProxyPool::new(urls(), 3, &HashMap::new());
        let p = pool.get_proxy().expect("pool not empty");
        assert_eq!(p.scheme, ProxyScheme::Socks5);
        assert_eq!(p.priority, 2);
    }

    #[test]
    fn round_robins_within_tier() {
        let pool = ProxyPool::new(
            vec!["http://a:1".to_string(), "http://b:1".to_string()],
            3,
            &default_priorities(),
        );
        let first = pool.get_proxy().expect("not empty").url;
        let second = pool.get_proxy().expect("not empty").url;
        assert_ne!(first, second, "should not repeat the same proxy back-to-back when tied");
    }

    #[test]
    fn eviction_after_max_retries() {
        let pool = ProxyPool::new(vec!["http://a:1".to_string()], 2, &default_priorities());
        let p = pool.get_proxy().expect("not empty");
        pool.report(&p, false);
        pool.report(&p, false);
        assert!(!pool.is_empty(), "still within max_retries after 2 failures");
        pool.report(&p, false);
        assert!(pool.is_empty(), "evicted after exceeding max_retries");
    }

    #[test]
    fn success_resets_failure_count() {
        let pool = ProxyPool::new(vec!["http://a:1".to_string()], 1, &default_priorities());
        let p = pool.get_proxy().expect("not empty");
        pool.report(&p, false);
        pool.report(&p, true);
        pool.report(&p, false);
        assert!(!pool.is_empty(), "success reset the failure count, one more failure is still within budget");
    }

    #[test]
    fn empty_pool_returns_none() {
        let pool = ProxyPool::new(Vec::new(), 3, &default_priorities());
        assert!(pool.get_proxy().is_none());
    }
}
