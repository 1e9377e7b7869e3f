//! Frontier: a single mutex-guarded FIFO of (URL, depth) tasks, plus the
//! `active_workers`/`pending_content` counters consulted under the same
//! lock so the termination check is race-free (4.G, 5).

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::bloom::BloomFilter;

struct Inner {
    queue: VecDeque<(String, u8)>,
    active_workers: usize,
    pending_content: usize,
}

pub struct Frontier {
    inner: Mutex<Inner>,
    bloom: BloomFilter,
}

impl Frontier {
    #[must_use]
    pub fn new(bloom: BloomFilter) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                active_workers: 0,
                pending_content: 0,
            }),
            bloom,
        }
    }

    /// Admit `(url, depth)` if the bloom filter hasn't already seen `url`.
    /// Bloom membership check and queue push happen under the same lock so
    /// admission is exactly-once modulo false positives.
    pub fn push_if_new(&self, url: String, depth: u8) {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        if self.bloom.contains(&url) {
            return;
        }
        self.bloom.add(&url);
        inner.queue.push_back((url, depth));
    }

    /// Claim the next task, incrementing `active_workers` on success. The
    /// caller must call [`Frontier::release_worker`] when done with it.
    pub fn claim(&self) -> Option<(String, u8)> {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        let task = inner.queue.pop_front();
        if task.is_some() {
            inner.active_workers += 1;
        }
        task
    }

    pub fn release_worker(&self) {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.active_workers = inner.active_workers.saturating_sub(1);
    }

    pub fn begin_content_task(&self) {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.pending_content += 1;
    }

    pub fn end_content_task(&self) {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.pending_content = inner.pending_content.saturating_sub(1);
    }

    /// True iff the frontier is empty, no worker is active, and no
    /// content-processing task is pending — the run's termination
    /// predicate.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        let inner = self.inner.lock().expect("mutex poisoned");
        inner.queue.is_empty() && inner.active_workers == 0 && inner.pending_content == 0
    }

    /// Re-enqueue a task without re-consulting the bloom filter (used for
    /// politeness/proxy-rotation retries of a task already admitted once).
    pub fn requeue(&self, url: String, depth: u8) {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.queue.push_back((url, depth));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_url_admitted_once() {
        let frontier = Frontier::new(BloomFilter::with_defaults());
        frontier.push_if_new("https://a.com/x".to_string(), 0);
        frontier.push_if_new("https://a.com/x".to_string(), 0);
        assert!(frontier.claim().is_some());
        assert!(frontier.claim().is_none());
    }

    #[test]
    fn termination_predicate_requires_all_three_conditions() {
        let frontier = Frontier::new(BloomFilter::with_defaults());
        assert!(frontier.is_drained());
        frontier.push_if_new("https://a.com/x".to_string(), 0);
        assert!(!frontier.is_drained());
        let task = frontier.claim().expect("task present");
        assert!(!frontier.is_drained(), "active worker holds a claim");
        frontier.release_worker();
        assert!(frontier.is_drained());
        let _ = task;
    }

    #[test]
    fn pending_content_blocks_termination() {
        let frontier = Frontier::new(BloomFilter::with_defaults());
        frontier.begin_content_task();
        assert!(!frontier.is_drained());
        frontier.end_content_task();
        assert!(frontier.is_drained());
    }
}
