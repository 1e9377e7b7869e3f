//! Shared default values and configuration constants.

use std::time::Duration;

/// Default maximum crawl depth.
pub const DEFAULT_MAX_DEPTH: u8 = 3;

/// Default number of I/O runtime threads.
pub const DEFAULT_IO_THREADS: usize = 4;

/// Default number of concurrent in-flight fetch tasks.
pub const DEFAULT_VIRTUAL_THREADS: usize = 16;

/// Default proxy failure threshold before eviction.
pub const DEFAULT_PROXY_MAX_RETRIES: u32 = 3;

/// Default gateway executor thread count.
pub const DEFAULT_GATEWAY_THREADS: usize = 2;

/// Default browser DevTools port.
pub const DEFAULT_CDP_PORT: u16 = 9222;

/// Maximum fetch attempts per URL before giving up.
pub const MAX_FETCH_RETRIES: u32 = 3;

/// Base backoff unit; attempt N sleeps `BASE_BACKOFF * 2^(N-1)`.
pub const BASE_BACKOFF: Duration = Duration::from_millis(1000);

/// HTTP connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum time to wait for a browser page navigation to settle.
pub const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway tunnel idle timeout.
pub const GATEWAY_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Politeness safety cap: re-enqueue rather than block a worker past this wait.
pub const POLITENESS_SAFETY_CAP: Duration = Duration::from_millis(100);

/// Short delay between frontier poll attempts when the queue looks empty.
pub const FRONTIER_POLL_DELAY: Duration = Duration::from_millis(20);

/// Chrome user agent string used by both the direct and browser clients.
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Read buffer size for the gateway's initial client request.
pub const GATEWAY_READ_BUF: usize = 8 * 1024;

/// Pump buffer size for gateway tunneling.
pub const GATEWAY_TUNNEL_BUF: usize = 8 * 1024;

/// Extensions treated as images; `is_image` checks suffix membership, case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg", ".ico", ".tiff", ".avif",
];
