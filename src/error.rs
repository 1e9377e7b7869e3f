//! Fatal/setup error type.
//!
//! Distinct from [`crate::fetch::ErrorType`], which classifies a single
//! fetch attempt's outcome and is always recovered locally by the engine.
//! Errors here abort startup before any worker runs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to bind local proxy gateway: {0}")]
    GatewayBind(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CrawlerResult<T> = Result<T, CrawlerError>;
