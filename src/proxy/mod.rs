//! Proxy pool (4.D) and upstream dial primitives shared by the local
//! gateway (4.F).

pub mod dial;
pub mod pool;

pub use pool::{Proxy, ProxyPool, ProxyScheme};
