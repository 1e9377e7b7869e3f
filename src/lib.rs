//! A concurrent, polite web crawler: work-stealing frontier, per-host
//! politeness, a priority-tiered proxy pool, a local SOCKS/HTTP-CONNECT
//! proxy gateway for browser traffic, and an HTML→Markdown/binary-sink
//! content pipeline.

pub mod bloom;
pub mod browser_launch;
pub mod config;
pub mod constants;
pub mod crawl;
pub mod error;
pub mod fetch;
pub mod gateway;
pub mod links;
pub mod markdown;
pub mod mime_map;
pub mod proxy;
pub mod robots;
pub mod storage;
pub mod url_util;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use config::CrawlConfig;
use crawl::{Engine, EngineConfig};
use error::{CrawlerError, CrawlerResult};
use fetch::{BrowserClient, DirectClient, HttpClient};
use proxy::ProxyPool;

/// A started gateway: its accept-loop task, the proxy URL clients should be
/// pointed at, and the dedicated runtime the accept loop executes on. The
/// runtime must stay alive for as long as the gateway is in use; dropping it
/// tears the gateway down.
struct Gateway {
    task: JoinHandle<()>,
    proxy_url: String,
    runtime: tokio::runtime::Runtime,
}

/// Binds and starts the local proxy gateway on its own executor, sized by
/// `config.proxy_threads` independently of the main I/O runtime, so gateway
/// traffic can't starve (or be starved by) crawl fetches.
fn start_gateway(config: &CrawlConfig, pool: Arc<ProxyPool>) -> CrawlerResult<Option<Gateway>> {
    if !(config.render_js && !config.proxies.is_empty()) {
        return Ok(None);
    }
    let bind_addr = SocketAddr::new(config.proxy_bind_ip, config.proxy_bind_port);
    let listener = gateway::bind(bind_addr).map_err(CrawlerError::GatewayBind)?;
    let bound_addr = listener.local_addr().map_err(CrawlerError::GatewayBind)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.proxy_threads.max(1))
        .thread_name("gateway-io")
        .enable_all()
        .build()
        .map_err(CrawlerError::GatewayBind)?;
    let task = runtime.spawn(gateway::accept_loop(listener, pool));

    Ok(Some(Gateway {
        task,
        proxy_url: format!("http://{bound_addr}"),
        runtime,
    }))
}

/// Run a full crawl to completion per the configured seed URLs.
pub async fn run(config: CrawlConfig) -> CrawlerResult<()> {
    let seed = config
        .seed_urls
        .first()
        .ok_or_else(|| CrawlerError::Config("no seed URLs provided".to_string()))?
        .clone();
    let start_domain = url_util::parse(&seed)
        .ok_or_else(|| CrawlerError::Config(format!("invalid seed URL: {seed}")))?
        .host;

    let proxy_pool = if config.proxies.is_empty() {
        None
    } else {
        Some(Arc::new(ProxyPool::new(
            config.proxies.clone(),
            config.proxy_max_retries,
            &config.proxy_priorities,
        )))
    };

    let gateway = match &proxy_pool {
        Some(pool) => start_gateway(&config, Arc::clone(pool))?,
        None => None,
    };

    let client: Arc<dyn HttpClient> = if config.render_js {
        Arc::new(BrowserClient::new(
            config.headless,
            config.browser.clone(),
            config.cdp_port,
        ))
    } else {
        Arc::new(DirectClient::new())
    };
    if let Some(gateway) = &gateway {
        client.set_proxy(Some(gateway.proxy_url.clone()));
    }

    let engine_config = EngineConfig {
        max_depth: config.max_depth,
        output_dir: config.output_dir.clone(),
        tree_structure: config.tree_structure,
        user_agent: config.user_agent.clone(),
    };

    let engine = Arc::new(Engine::new(start_domain, client, proxy_pool, engine_config));
    for url in &config.seed_urls {
        engine.add_seed(url.clone());
    }

    let shutdown_engine = Arc::clone(&engine);
    let signal_task = tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        warn!("shutdown signal received");
        shutdown_engine.request_shutdown();
    });

    engine.run(config.virtual_threads).await;
    signal_task.abort();

    if let Some(gateway) = gateway {
        gateway.task.abort();
        // A `Runtime` must not be dropped from within another runtime's
        // worker thread (it blocks waiting for its threads to join);
        // `shutdown_background` tears it down without blocking this one.
        gateway.runtime.shutdown_background();
    }

    info!("crawl complete");
    Ok(())
}
