//! Probabilistic visited-URL set.
//!
//! A fixed-size bit vector with `k` double-hashed probes, guarded by a
//! mutex. `add` never removes bits, so `contains(k)` is guaranteed true for
//! every previously-added `k` (no false negatives); it may also return true
//! for keys never added, at roughly the analytical false-positive rate.

use std::sync::Mutex;

use xxhash_rust::xxh3::xxh3_128_with_seed;

const HASH_SEED: u64 = 42;

pub struct BloomFilter {
    bits: Mutex<Vec<bool>>,
    num_hashes: u32,
    items_added: std::sync::atomic::AtomicU64,
}

impl BloomFilter {
    /// `size` is the bit-vector length (m); `num_hashes` is k.
    #[must_use]
    pub fn new(size: usize, num_hashes: u32) -> Self {
        Self {
            bits: Mutex::new(vec![false; size.max(1)]),
            num_hashes,
            items_added: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Sized for roughly 10^6 items at k=7, the spec's stated default shape.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(10_000_000, 7)
    }

    fn probe(&self, key: &str, i: u32, len: usize) -> usize {
        let (h1, h2) = hash_pair(key);
        (h1.wrapping_add((i as u64).wrapping_mul(h2)) as usize) % len
    }

    pub fn add(&self, key: &str) {
        let mut bits = self.bits.lock().expect("bloom filter mutex poisoned");
        let len = bits.len();
        for i in 0..self.num_hashes {
            let idx = self.probe(key, i, len);
            bits[idx] = true;
        }
        self.items_added
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let bits = self.bits.lock().expect("bloom filter mutex poisoned");
        let len = bits.len();
        (0..self.num_hashes).all(|i| bits[self.probe(key, i, len)])
    }

    #[must_use]
    pub fn bit_count(&self) -> usize {
        self.bits.lock().expect("bloom filter mutex poisoned").len()
    }

    #[must_use]
    pub fn items_added(&self) -> u64 {
        self.items_added.load(std::sync::atomic::Ordering::Relaxed)
    }

    #[must_use]
    pub fn set_bits(&self) -> usize {
        self.bits
            .lock()
            .expect("bloom filter mutex poisoned")
            .iter()
            .filter(|b| **b)
            .count()
    }

    /// `(1 - e^(-kn/m))^k`, using the observed item count for n.
    #[must_use]
    pub fn estimated_fp_rate(&self) -> f64 {
        let m = self.bit_count() as f64;
        let k = f64::from(self.num_hashes);
        let n = self.items_added() as f64;
        if m == 0.0 {
            return 1.0;
        }
        (1.0 - (-k * n / m).exp()).powf(k)
    }
}

/// Keyed 128-bit hash split into two u64 halves, matching the original
/// `MurmurHash3_x64_128(key, seed=42)` construction bit-for-bit in shape
/// (not bit-for-bit in output — xxh3 is a different, equally avalanching
/// keyed hash, which satisfies the spec's "or equivalent" clause).
fn hash_pair(key: &str) -> (u64, u64) {
    let h = xxh3_128_with_seed(key.as_bytes(), HASH_SEED);
    let h1 = (h >> 64) as u64;
    let h2 = h as u64;
    (h1, h2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_contains_is_always_true() {
        let filter = BloomFilter::new(10_000, 7);
        for i in 0..1000 {
            filter.add(&format!("https://example.com/page/{i}"));
        }
        for i in 0..1000 {
            assert!(filter.contains(&format!("https://example.com/page/{i}")));
        }
    }

    #[test]
    fn false_positive_rate_bounded() {
        let filter = BloomFilter::new(10_000, 7);
        for i in 0..1000 {
            filter.add(&format!("https://example.com/page/{i}"));
        }
        let mut false_positives = 0usize;
        let trials = 5000;
        for i in 0..trials {
            if filter.contains(&format!("https://absent.example.com/other/{i}")) {
                false_positives += 1;
            }
        }
        let observed_rate = false_positives as f64 / trials as f64;
        assert!(
            observed_rate < 0.05,
            "observed fp rate {observed_rate} exceeded 5%"
        );
    }

    #[test]
    fn empty_filter_contains_nothing() {
        let filter = BloomFilter::new(1000, 7);
        assert!(!filter.contains("https://never-added.example.com"));
    }

    #[test]
    fn is_never_cleared() {
        let filter = BloomFilter::new(1000, 7);
        filter.add("https://example.com/a");
        assert!(filter.contains("https://example.com/a"));
        filter.add("https://example.com/b");
        assert!(filter.contains("https://example.com/a"));
        assert!(filter.contains("https://example.com/b"));
    }
}
