//! Reservoir-sampled key pool used to derive the key-range partition
//!
//! Put traffic offers keys until enough have been seen, then the pool is
//! sorted and every k-th key becomes a range separator. Keys are
//! deduplicated so a write-heavy hot key cannot dominate the partition.

use crate::core::types::KeySpan;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Fixed-capacity reservoir of distinct keys
pub struct SamplesPool {
    pool: Vec<Vec<u8>>,
    filter: HashSet<Vec<u8>>,
    samples_cnt: u64,
    limit: usize,
    maxcnt: u64,
    rng: StdRng,
}

impl SamplesPool {
    /// Create an empty pool with the given capacity and freeze threshold
    pub fn new(limit: usize, maxcnt: u64) -> Self {
        Self {
            pool: Vec::with_capacity(limit),
            filter: HashSet::with_capacity(limit),
            samples_cnt: 0,
            limit,
            maxcnt,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Whether enough samples have been offered to freeze the partition
    pub fn is_ready(&self) -> bool {
        self.samples_cnt >= self.maxcnt
    }

    /// Whether the reservoir is at capacity
    pub fn is_full(&self) -> bool {
        self.pool.len() >= self.limit
    }

    /// Number of distinct keys currently pooled
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Whether the pool holds no keys yet
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Offer one key. Duplicates count toward the freeze threshold but do
    /// not enter the reservoir; once full, Algorithm R decides eviction.
    pub fn offer(&mut self, key: &[u8]) {
        self.samples_cnt += 1;
        if self.filter.contains(key) {
            return;
        }

        if self.pool.len() < self.limit {
            self.pool.push(key.to_vec());
            self.filter.insert(key.to_vec());
            return;
        }

        let slot = self.rng.random_range(0..self.samples_cnt);
        if (slot as usize) < self.limit {
            let evicted = std::mem::replace(&mut self.pool[slot as usize], key.to_vec());
            self.filter.remove(&evicted);
            self.filter.insert(key.to_vec());
        }
    }

    /// Sort the pool; must run before [`determine_k`](Self::determine_k)
    /// and [`divide`](Self::divide).
    pub fn prepare(&mut self) {
        self.pool.sort_unstable();
    }

    /// Choose the separator stride.
    ///
    /// With known segment key spans, every span must contain at least `k`
    /// pooled keys so no segment maps onto fewer than one range; without
    /// spans the stride targets `default_buckets` ranges. Always at least 2.
    pub fn determine_k(&self, spans: &[KeySpan], default_buckets: usize) -> usize {
        let k = if spans.is_empty() {
            self.pool.len() / default_buckets.max(1)
        } else {
            spans
                .iter()
                .map(|span| self.count_in_span(span))
                .min()
                .unwrap_or(0)
        };
        k.max(2)
    }

    /// Count pooled keys inside a span; the pool must be sorted.
    fn count_in_span(&self, span: &KeySpan) -> usize {
        let lo = self.pool.partition_point(|key| key.as_slice() < span.min.as_slice());
        let hi = self.pool.partition_point(|key| key.as_slice() <= span.max.as_slice());
        hi - lo
    }

    /// Produce the interior separators: every `k`-th pooled key starting at
    /// index 0. The pool must be sorted.
    pub fn divide(&self, k: usize) -> Vec<Vec<u8>> {
        debug_assert!(k >= 2, "separator stride below minimum");
        self.pool.iter().step_by(k).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u32) -> Vec<u8> {
        format!("key{:06}", i).into_bytes()
    }

    #[test]
    fn test_dedup_and_counting() {
        let mut pool = SamplesPool::new(100, 10);
        pool.offer(&key(1));
        pool.offer(&key(1));
        pool.offer(&key(2));
        assert_eq!(pool.len(), 2);
        assert!(!pool.is_ready());
        for _ in 0..7 {
            pool.offer(&key(3));
        }
        assert!(pool.is_ready());
    }

    #[test]
    fn test_reservoir_never_exceeds_limit() {
        let mut pool = SamplesPool::new(16, 1_000);
        for i in 0..500 {
            pool.offer(&key(i));
        }
        assert_eq!(pool.len(), 16);
        // the dedup filter tracks exactly the pooled keys
        assert_eq!(pool.filter.len(), 16);
    }

    #[test]
    fn test_determine_k_default() {
        let mut pool = SamplesPool::new(1_000, 1);
        for i in 0..1_000 {
            pool.offer(&key(i));
        }
        pool.prepare();
        assert_eq!(pool.determine_k(&[], 100), 10);
        // stride floor
        assert_eq!(pool.determine_k(&[], 1_000), 2);
    }

    #[test]
    fn test_determine_k_from_spans() {
        let mut pool = SamplesPool::new(1_000, 1);
        for i in 0..100 {
            pool.offer(&key(i));
        }
        pool.prepare();
        let spans = vec![
            KeySpan::new(key(0), key(99)),  // 100 keys
            KeySpan::new(key(10), key(14)), // 5 keys
        ];
        assert_eq!(pool.determine_k(&spans, 500), 5);
    }

    #[test]
    fn test_divide_strides_sorted_pool() {
        let mut pool = SamplesPool::new(100, 1);
        for i in (0..10).rev() {
            pool.offer(&key(i));
        }
        pool.prepare();
        let separators = pool.divide(3);
        assert_eq!(separators, vec![key(0), key(3), key(6), key(9)]);
    }
}
