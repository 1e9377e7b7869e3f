//! Crawl engine (4.G): worker loop, `add_url` admission, the
//! fetch/retry state machine, and content-type routing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::frontier::Frontier;
use super::politeness::PolitenessLedger;
use crate::constants::{
    BASE_BACKOFF, FRONTIER_POLL_DELAY, MAX_FETCH_RETRIES, POLITENESS_SAFETY_CAP,
};
use crate::fetch::{ErrorType, HttpClient, Response};
use crate::links::extract_links;
use crate::markdown::html_to_markdown;
use crate::mime_map::extension_for;
use crate::proxy::ProxyPool;
use crate::robots::RobotsCache;
use crate::storage;
use crate::url_util::{is_image, parse, to_filename, to_filename_with_ext, to_flat_filename, to_flat_filename_with_ext};

pub struct EngineConfig {
    pub max_depth: u8,
    pub output_dir: PathBuf,
    pub tree_structure: bool,
    pub user_agent: String,
}

/// Owns every piece of shared, process-wide state the workers reference.
/// Workers never outlive the engine (9. Design notes).
pub struct Engine {
    frontier: Frontier,
    politeness: PolitenessLedger,
    robots: RobotsCache,
    proxy_pool: Option<Arc<ProxyPool>>,
    client: Arc<dyn HttpClient>,
    config: EngineConfig,
    start_domain: String,
    done: AtomicBool,
}

impl Engine {
    #[must_use]
    pub fn new(
        seed_host: String,
        client: Arc<dyn HttpClient>,
        proxy_pool: Option<Arc<ProxyPool>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            frontier: Frontier::new(crate::bloom::BloomFilter::with_defaults()),
            politeness: PolitenessLedger::new(),
            robots: RobotsCache::new(),
            proxy_pool,
            client,
            config,
            start_domain: seed_host,
            done: AtomicBool::new(false),
        }
    }

    pub fn request_shutdown(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    /// Admit `(url, depth)` per 4.G: drop if too deep, drop if off the
    /// start domain, otherwise push if the bloom filter hasn't seen it.
    pub fn add_url(&self, url: String, depth: u8) {
        if depth > self.config.max_depth {
            return;
        }
        let Some(parsed) = parse(&url) else {
            return;
        };
        if !crate::url_util::is_same_domain(&parsed.host, &self.start_domain) {
            return;
        }
        self.frontier.push_if_new(url, depth);
    }

    /// Seed the frontier with the crawl's starting URL at depth 0. The
    /// domain check is skipped since this URL defines `start_domain`.
    pub fn add_seed(&self, url: String) {
        self.frontier.push_if_new(url, 0);
    }

    /// Run worker tasks until the frontier drains and no content task is
    /// pending, or `request_shutdown` is called. Returns once all spawned
    /// workers have exited.
    pub async fn run(self: &Arc<Self>, virtual_threads: usize) {
        let workers: Vec<_> = (0..virtual_threads)
            .map(|_| {
                let engine = Arc::clone(self);
                tokio::spawn(async move { engine.worker_loop().await })
            })
            .collect();
        for worker in workers {
            let _ = worker.await;
        }
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            if self.done.load(Ordering::SeqCst) {
                return;
            }
            match self.frontier.claim() {
                Some((url, depth)) => {
                    self.process_url_task(url, depth).await;
                    self.frontier.release_worker();
                }
                None => {
                    if self.done.load(Ordering::SeqCst) || self.frontier.is_drained() {
                        return;
                    }
                    tokio::time::sleep(FRONTIER_POLL_DELAY).await;
                }
            }
        }
    }

    async fn process_url_task(&self, url: String, depth: u8) {
        self.robots.ensure_cached(&url, &self.config.user_agent, self.client.as_ref()).await;
        let Some(parsed) = parse(&url) else {
            return;
        };
        if !self.robots.is_allowed(&url, &parsed.path) {
            debug!(url, "robots disallows, dropping");
            return;
        }

        let crawl_delay = Duration::from_secs(self.robots.get_crawl_delay(&url));
        let wait = self.politeness.schedule(&parsed.host, crawl_delay);
        if wait > POLITENESS_SAFETY_CAP {
            self.frontier.requeue(url, depth);
            tokio::time::sleep(FRONTIER_POLL_DELAY).await;
            return;
        }
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        if self.fetch_page(&url, depth).await {
            return;
        }

        if let Some(pool) = &self.proxy_pool {
            if !pool.is_empty() {
                self.frontier.requeue(url, depth);
                return;
            }
        }
        warn!(url, "giving up after exhausting retries");
    }

    /// Returns true on success (including the image-skip short circuit).
    async fn fetch_page(&self, url: &str, depth: u8) -> bool {
        if is_image(url) {
            debug!(url, "image url, skipping download");
            return true;
        }

        for attempt in 1..=MAX_FETCH_RETRIES {
            let proxy = self.proxy_pool.as_ref().and_then(|p| p.get_proxy());
            self.client.set_proxy(proxy.as_ref().map(|p| p.url.clone()));

            info!(url, depth, attempt, proxy = ?proxy.as_ref().map(|p| &p.url), "fetching");
            let res = self.client.get(url).await;

            if res.skipped() || res.error_type == ErrorType::Skipped {
                return true;
            }

            if let (Some(pool), Some(proxy)) = (&self.proxy_pool, &proxy) {
                let proxy_ok = res.success()
                    || (res.error_type != ErrorType::Proxy
                        && res.status != 0
                        && !matches!(res.status, 403 | 429));
                pool.report(proxy, proxy_ok);
            }

            let page_success =
                (res.success() || res.status == 404) && !matches!(res.status, 403 | 429);
            if page_success {
                self.process_successful_response(url, depth, &res).await;
                return true;
            }

            if attempt < MAX_FETCH_RETRIES {
                let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }
        }
        false
    }

    async fn process_successful_response(&self, url: &str, depth: u8, res: &Response) {
        if res.status != 200 {
            debug!(url, status = res.status, "non-200 success status, not persisting");
            return;
        }

        let base = if res.effective_url.is_empty() {
            url.to_string()
        } else {
            res.effective_url.clone()
        };
        let ext = extension_for(&res.content_type, &base);

        if let Some(ext) = ext {
            let ext_no_dot = ext.trim_start_matches('.');
            let key = if self.config.tree_structure {
                to_filename_with_ext(&base, ext_no_dot)
            } else {
                to_flat_filename_with_ext(&base, ext_no_dot)
            };
            if let Some(key) = key {
                storage::save(&self.config.output_dir, &key, &res.body, true).await;
            }
            return;
        }

        self.frontier.begin_content_task();
        let html = String::from_utf8_lossy(&res.body).to_string();
        let markdown = html_to_markdown(&html);
        let key = if self.config.tree_structure {
            to_filename(&base)
        } else {
            to_flat_filename(&base)
        };
        if let Some(key) = key {
            storage::save(&self.config.output_dir, &key, markdown.as_bytes(), false).await;
        }

        if depth < self.config.max_depth {
            for href in extract_links(&html) {
                let resolved = crate::url_util::resolve(&base, &href);
                if !resolved.is_empty() {
                    self.add_url(resolved, depth + 1);
                }
            }
        }
        self.frontier.end_content_task();
    }
}
