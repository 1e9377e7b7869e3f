//! Per-host politeness ledger (4.G, 5).
//!
//! The earliest-next-access instant for a host is advanced *before* the
//! caller awaits the returned wait duration, so two overlapping workers on
//! the same host observe monotonically increasing target instants without
//! holding the mutex across an await.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct PolitenessLedger {
    next_access: Mutex<HashMap<String, Instant>>,
}

impl PolitenessLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_access: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the next slot for `host`, given its `crawl_delay`. Returns how
    /// long the caller must wait before it may issue the request. The
    /// ledger's entry is advanced past this claim immediately, so a second
    /// concurrent caller for the same host is scheduled after this one.
    pub fn schedule(&self, host: &str, crawl_delay: Duration) -> Duration {
        let mut ledger = self.next_access.lock().expect("mutex poisoned");
        let now = Instant::now();
        let earliest = ledger.get(host).copied().unwrap_or(now).max(now);
        ledger.insert(host.to_string(), earliest + crawl_delay);
        earliest.saturating_duration_since(now)
    }
}

impl Default for PolitenessLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_caller_waits_zero() {
        let ledger = PolitenessLedger::new();
        assert_eq!(ledger.schedule("a.com", Duration::from_millis(500)), Duration::ZERO);
    }

    #[test]
    fn second_caller_waits_at_least_crawl_delay() {
        let ledger = PolitenessLedger::new();
        ledger.schedule("a.com", Duration::from_millis(50));
        let second_wait = ledger.schedule("a.com", Duration::from_millis(50));
        assert!(second_wait >= Duration::from_millis(40));
    }

    #[test]
    fn distinct_hosts_are_independent() {
        let ledger = PolitenessLedger::new();
        ledger.schedule("a.com", Duration::from_secs(10));
        assert_eq!(ledger.schedule("b.com", Duration::from_secs(10)), Duration::ZERO);
    }
}
