//! Crawl engine (4.G): frontier, politeness, and the fetch/retry state
//! machine that ties the other components together.

pub mod engine;
pub mod frontier;
pub mod politeness;

pub use engine::{Engine, EngineConfig};
