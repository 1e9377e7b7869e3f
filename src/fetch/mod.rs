//! HTTP client capability set: a typed [`Response`], an [`ErrorType`]
//! taxonomy, and the [`HttpClient`] trait with two variants picked at
//! engine construction (4.E).

mod browser;
mod direct;

pub use browser::BrowserClient;
pub use direct::DirectClient;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Per-fetch-attempt error classification. Distinct from
/// [`crate::error::CrawlerError`], which covers fatal/setup failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    None,
    Network,
    Proxy,
    Timeout,
    Skipped,
    Render,
    Browser,
    Other,
}

/// The outcome of one `get`/`head` call.
#[derive(Debug, Clone)]
pub struct Response {
    pub effective_url: String,
    /// 0 denotes a transport/connection failure with no status line.
    pub status: u16,
    /// Lowercased MIME string, possibly empty.
    pub content_type: String,
    pub body: Vec<u8>,
    pub error_message: Option<String>,
    pub error_type: ErrorType,
}

impl Response {
    /// True iff 2xx or 3xx and no transport error.
    #[must_use]
    pub fn success(&self) -> bool {
        self.error_type != ErrorType::Skipped
            && self.status != 0
            && (200..400).contains(&self.status)
    }

    /// True iff the body download was aborted because the content type was
    /// detected to be an image.
    #[must_use]
    pub fn skipped(&self) -> bool {
        self.error_type == ErrorType::Skipped
    }

    fn transport_error(url: &str, error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            effective_url: url.to_string(),
            status: 0,
            content_type: String::new(),
            body: Vec::new(),
            error_message: Some(message.into()),
            error_type,
        }
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Capability set implemented by both the direct and browser-rendered
/// fetch-client variants. Object-safe by construction (methods return a
/// boxed future) so the engine can hold `Box<dyn HttpClient>` and pick the
/// concrete variant once at construction.
pub trait HttpClient: Send + Sync {
    fn set_proxy(&self, proxy: Option<String>);
    fn set_connect_timeout(&self, timeout: Duration);
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Response>;
    fn head<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Response>;
}
