//! CLI parsing and YAML config merging (Section 6). CLI flags win over
//! YAML scalars; both feed the same [`CrawlConfig`].

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use crate::constants::{
    DEFAULT_CDP_PORT, DEFAULT_GATEWAY_THREADS, DEFAULT_IO_THREADS, DEFAULT_MAX_DEPTH,
    DEFAULT_PROXY_MAX_RETRIES, DEFAULT_VIRTUAL_THREADS,
};
use crate::error::{CrawlerError, CrawlerResult};

#[derive(Debug, Parser)]
#[command(name = "polite-crawler", about = "A concurrent, polite web crawler")]
pub struct CliArgs {
    /// Seed URLs to crawl.
    pub urls: Vec<String>,

    #[arg(short = 'd', long = "depth")]
    pub depth: Option<u8>,

    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    #[arg(short = 'p', long = "proxy")]
    pub proxy: Option<String>,

    #[arg(long = "proxy-list")]
    pub proxy_list: Option<PathBuf>,

    #[arg(long = "proxy-retries")]
    pub proxy_retries: Option<u32>,

    #[arg(long = "proxy-bind-ip")]
    pub proxy_bind_ip: Option<IpAddr>,

    #[arg(long = "proxy-bind-port")]
    pub proxy_bind_port: Option<u16>,

    #[arg(long = "proxy-threads")]
    pub proxy_threads: Option<usize>,

    #[arg(long = "cdp-port")]
    pub cdp_port: Option<u16>,

    #[arg(long = "browser")]
    pub browser: Option<PathBuf>,

    #[arg(long = "render")]
    pub render: bool,

    #[arg(long = "no-headless")]
    pub no_headless: bool,

    #[arg(long = "flat")]
    pub flat: bool,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
struct YamlConfig {
    urls: Option<Vec<String>>,
    depth: Option<u8>,
    threads: Option<usize>,
    output: Option<PathBuf>,
    proxy: Option<String>,
    proxies: Option<Vec<String>>,
    proxy_priorities: Option<HashMap<String, i32>>,
    proxy_retries: Option<u32>,
    proxy_bind_ip: Option<IpAddr>,
    proxy_bind_port: Option<u16>,
    proxy_threads: Option<usize>,
    cdp_port: Option<u16>,
    browser: Option<PathBuf>,
    render: Option<bool>,
    no_headless: Option<bool>,
    flat: Option<bool>,
}

/// Fully-resolved, validated crawl configuration: CLI values override any
/// YAML scalar of the same name.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub seed_urls: Vec<String>,
    pub max_depth: u8,
    pub io_threads: usize,
    pub virtual_threads: usize,
    pub output_dir: PathBuf,
    pub tree_structure: bool,
    pub render_js: bool,
    pub headless: bool,
    pub proxies: Vec<String>,
    pub proxy_priorities: HashMap<String, i32>,
    pub proxy_max_retries: u32,
    pub proxy_bind_ip: IpAddr,
    pub proxy_bind_port: u16,
    pub proxy_threads: usize,
    pub cdp_port: u16,
    pub browser: Option<PathBuf>,
    pub user_agent: String,
}

fn load_proxy_list(path: &PathBuf) -> CrawlerResult<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| CrawlerError::Config(format!("failed to read proxy list {path:?}: {e}")))?;
    Ok(contents
        .lines()
        .filter_map(|line| {
            let stripped = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line,
            };
            let trimmed = stripped.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect())
}

impl CrawlConfig {
    pub fn from_cli(cli: CliArgs) -> CrawlerResult<Self> {
        let yaml = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    CrawlerError::Config(format!("failed to read config {path:?}: {e}"))
                })?;
                serde_yaml::from_str::<YamlConfig>(&text)
                    .map_err(|e| CrawlerError::Config(format!("invalid YAML config: {e}")))?
            }
            None => YamlConfig::default(),
        };

        let seed_urls = if !cli.urls.is_empty() {
            cli.urls
        } else {
            yaml.urls.unwrap_or_default()
        };
        if seed_urls.is_empty() {
            return Err(CrawlerError::Config("no seed URLs provided".to_string()));
        }

        let mut proxies = yaml.proxies.unwrap_or_default();
        if let Some(p) = cli.proxy.or(yaml.proxy) {
            proxies.push(p);
        }
        if let Some(path) = &cli.proxy_list {
            proxies.extend(load_proxy_list(path)?);
        }

        let mut proxy_priorities = yaml.proxy_priorities.unwrap_or_default();
        proxy_priorities.entry("http".to_string()).or_insert(0);
        proxy_priorities.entry("socks4".to_string()).or_insert(1);
        proxy_priorities.entry("socks5".to_string()).or_insert(2);

        Ok(Self {
            seed_urls,
            max_depth: cli.depth.or(yaml.depth).unwrap_or(DEFAULT_MAX_DEPTH),
            io_threads: cli.threads.or(yaml.threads).unwrap_or(DEFAULT_IO_THREADS),
            virtual_threads: DEFAULT_VIRTUAL_THREADS,
            output_dir: cli.output.or(yaml.output).unwrap_or_else(|| PathBuf::from("./output")),
            tree_structure: !(cli.flat || yaml.flat.unwrap_or(false)),
            render_js: cli.render || yaml.render.unwrap_or(false),
            headless: !(cli.no_headless || yaml.no_headless.unwrap_or(false)),
            proxies,
            proxy_priorities,
            proxy_max_retries: cli
                .proxy_retries
                .or(yaml.proxy_retries)
                .unwrap_or(DEFAULT_PROXY_MAX_RETRIES),
            proxy_bind_ip: cli
                .proxy_bind_ip
                .or(yaml.proxy_bind_ip)
                .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1])),
            proxy_bind_port: cli.proxy_bind_port.or(yaml.proxy_bind_port).unwrap_or(0),
            proxy_threads: cli
                .proxy_threads
                .or(yaml.proxy_threads)
                .unwrap_or(DEFAULT_GATEWAY_THREADS),
            cdp_port: cli.cdp_port.or(yaml.cdp_port).unwrap_or(DEFAULT_CDP_PORT),
            browser: cli.browser.or(yaml.browser),
            user_agent: crate::constants::CHROME_USER_AGENT.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_list_strips_comments_and_blank_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("proxies.txt");
        std::fs::write(&path, "http://a:1 # primary\n# comment\n\nsocks5://b:2\n").unwrap();
        let list = load_proxy_list(&path).unwrap();
        assert_eq!(list, vec!["http://a:1".to_string(), "socks5://b:2".to_string()]);
    }
}
