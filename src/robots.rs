//! Per-host robots.txt fetch, cache, and allow/crawl-delay lookup.
//!
//! Parsing and pattern matching is delegated to `texting_robots`; this
//! module owns only the fetch-once-per-host cache wrapper around it.

use dashmap::DashMap;
use texting_robots::Robot;
use tracing::{debug, warn};

use crate::fetch::HttpClient;
use crate::url_util::parse;

struct RobotsRecord {
    robot: Robot,
}

/// Host-keyed robots.txt cache. Fetches at most once per host per run; a
/// fetch failure or non-2xx status caches an empty, fully-permissive
/// record rather than retrying.
pub struct RobotsCache {
    records: DashMap<String, RobotsRecord>,
}

impl RobotsCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    fn robots_url(url: &str) -> Option<String> {
        let parsed = parse(url)?;
        let authority = if parsed.port.is_empty() {
            parsed.host.clone()
        } else {
            format!("{}:{}", parsed.host, parsed.port)
        };
        Some(format!("{}://{}/robots.txt", parsed.scheme, authority))
    }

    /// Ensure the host owning `url` has a cached robots record, fetching it
    /// via `client` if this is the first time this host has been seen.
    pub async fn ensure_cached(&self, url: &str, user_agent: &str, client: &dyn HttpClient) {
        let Some(host) = parse(url).map(|p| p.host) else {
            return;
        };
        if self.records.contains_key(&host) {
            return;
        }
        let Some(robots_url) = Self::robots_url(url) else {
            return;
        };
        let resp = client.get(&robots_url).await;
        let body = if (200..300).contains(&resp.status) {
            resp.body
        } else if resp.status == 0 {
            warn!(
                host,
                error = ?resp.error_message,
                "robots.txt fetch failed, treating as permissive"
            );
            Vec::new()
        } else {
            debug!(host, status = resp.status, "robots.txt not found, treating as permissive");
            Vec::new()
        };
        // Double-check under the entry API: if another task raced us and
        // already inserted, keep theirs rather than clobbering.
        self.records.entry(host).or_insert_with(|| {
            let robot = Robot::new(user_agent, &body).unwrap_or_else(|_| {
                Robot::new(user_agent, b"").expect("empty robots body always parses")
            });
            RobotsRecord { robot }
        });
    }

    /// Whether `path` on the host owning `url` is allowed for `user_agent`.
    /// A host with no cached record (never fetched) is treated as
    /// permissive.
    #[must_use]
    pub fn is_allowed(&self, url: &str, path: &str) -> bool {
        let Some(host) = parse(url).map(|p| p.host) else {
            return true;
        };
        match self.records.get(&host) {
            Some(record) => record.robot.allowed(path),
            None => true,
        }
    }

    /// Per-UA (falling back to global, falling back to 0) crawl delay in
    /// seconds for the host owning `url`.
    #[must_use]
    pub fn get_crawl_delay(&self, url: &str) -> u64 {
        let Some(host) = parse(url).map(|p| p.host) else {
            return 0;
        };
        self.records
            .get(&host)
            .and_then(|record| record.robot.delay)
            .map(|d| d.round() as u64)
            .unwrap_or(0)
    }
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}
