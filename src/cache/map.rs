//! Segment-id → filter item map with budget accounting
//!
//! Probes take only a shard read lock of the underlying concurrent map, so
//! lookups on disjoint segments do not contend. All mutation is serialized
//! by one space lock that also owns the bits accounting, split into the
//! level-0 pool (never evicted, never adjusted) and everything else.

use crate::cache::item::FilterCacheItem;
use crate::cache::unit::FilterUnitSource;
use crate::core::config::CacheConfig;
use crate::core::types::{SegmentId, UnitCount};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

struct SpaceUsage {
    used_bits: u64,
    level0_bits: u64,
}

/// Filter cache contents and budget accounting
pub struct FilterCacheMap {
    items: DashMap<SegmentId, FilterCacheItem>,
    source: Arc<dyn FilterUnitSource>,
    space: Mutex<SpaceUsage>,
    cache_bits: u64,
    full_rate: f64,
    ready_rate: f64,
}

impl FilterCacheMap {
    /// Create an empty map over the given unit source
    pub fn new(cache: &CacheConfig, source: Arc<dyn FilterUnitSource>) -> Self {
        Self {
            items: DashMap::new(),
            source,
            space: Mutex::new(SpaceUsage {
                used_bits: 0,
                level0_bits: 0,
            }),
            cache_bits: cache.space_bits,
            full_rate: cache.full_rate,
            ready_rate: cache.ready_rate,
        }
    }

    /// Membership probe. A segment without a cached item cannot be
    /// filtered, so the answer is conservatively `true`.
    pub fn probe(&self, segment_id: SegmentId, key: &[u8]) -> bool {
        match self.items.get(&segment_id) {
            Some(item) => item.check_key(key),
            None => true,
        }
    }

    /// Probe variant reporting whether an item was present, so callers can
    /// count cache misses without a second lookup
    pub fn probe_detailed(&self, segment_id: SegmentId, key: &[u8]) -> (bool, bool) {
        match self.items.get(&segment_id) {
            Some(item) => (true, item.check_key(key)),
            None => (false, true),
        }
    }

    /// Whether a segment has a cached item
    pub fn contains(&self, segment_id: SegmentId) -> bool {
        self.items.contains_key(&segment_id)
    }

    /// Enabled units of a segment, if cached
    pub fn enabled_units(&self, segment_id: SegmentId) -> Option<UnitCount> {
        self.items.get(&segment_id).map(|item| item.enabled_units())
    }

    /// Number of cached segments
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no segments are cached
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bits currently enabled across all segments
    pub fn used_bits(&self) -> u64 {
        self.space.lock().used_bits
    }

    /// Bits currently enabled for level-0 segments
    pub fn level0_used_bits(&self) -> u64 {
        self.space.lock().level0_bits
    }

    /// Bits available to non-level-0 segments under the admission threshold
    pub fn non_level0_capacity(&self) -> u64 {
        let space = self.space.lock();
        let threshold = (self.cache_bits as f64 * self.full_rate) as u64;
        threshold.saturating_sub(space.level0_bits)
    }

    /// Utilization reached the admission threshold
    pub fn is_full(&self) -> bool {
        self.space.lock().used_bits as f64 / self.cache_bits as f64 >= self.full_rate
    }

    /// Utilization reached the readiness threshold
    pub fn is_ready(&self) -> bool {
        self.space.lock().used_bits as f64 / self.cache_bits as f64 >= self.ready_rate
    }

    /// Set enabled units for a batch of segments, creating missing items.
    ///
    /// A target is admitted when `forced`, when the segment is level-0, or
    /// when the growth keeps usage below the full-rate threshold; refused
    /// segment ids are returned so the caller can degrade them.
    pub fn enable_batch(
        &self,
        targets: &[(SegmentId, UnitCount)],
        forced: bool,
        level0_ids: &HashSet<SegmentId>,
    ) -> Vec<SegmentId> {
        self.apply_batch(targets, forced, level0_ids, true)
    }

    /// Set enabled units for a batch of segments, skipping missing items
    pub fn update_batch(
        &self,
        targets: &[(SegmentId, UnitCount)],
        forced: bool,
        level0_ids: &HashSet<SegmentId>,
    ) -> Vec<SegmentId> {
        self.apply_batch(targets, forced, level0_ids, false)
    }

    fn apply_batch(
        &self,
        targets: &[(SegmentId, UnitCount)],
        forced: bool,
        level0_ids: &HashSet<SegmentId>,
        create_missing: bool,
    ) -> Vec<SegmentId> {
        let threshold = (self.cache_bits as f64 * self.full_rate) as u64;
        let mut failed = Vec::new();
        let mut space = self.space.lock();

        for &(segment_id, units_num) in targets {
            let is_level0 = level0_ids.contains(&segment_id);
            if !(forced || is_level0) {
                // unforced growth may never push usage past the full-rate
                // threshold, so gate on the prospective usage after this
                // item, not the stale value before it
                let old_bits = self
                    .items
                    .get(&segment_id)
                    .map_or(0, |item| item.approximate_size());
                let new_bits = units_num as u64 * self.source.unit_bits(segment_id);
                if new_bits > old_bits
                    && space.used_bits - old_bits + new_bits >= threshold
                {
                    failed.push(segment_id);
                    continue;
                }
            }

            let mut entry = match self.items.get_mut(&segment_id) {
                Some(entry) => entry,
                None => {
                    if !create_missing {
                        continue;
                    }
                    self.items
                        .entry(segment_id)
                        .or_insert_with(|| FilterCacheItem::new(segment_id, self.source.as_ref()))
                }
            };

            let old_bits = entry.approximate_size();
            entry.enable_units(units_num, self.source.as_ref());
            let new_bits = entry.approximate_size();
            drop(entry);

            space.used_bits = space.used_bits - old_bits + new_bits;
            if is_level0 {
                space.level0_bits = space.level0_bits - old_bits + new_bits;
            }
        }

        assert!(
            space.used_bits <= self.cache_bits,
            "filter cache over capacity: {} > {} bits",
            space.used_bits,
            self.cache_bits
        );
        failed
    }

    /// Remove a batch of segments, releasing their bits
    pub fn release_batch(&self, segment_ids: &[SegmentId], level0_ids: &HashSet<SegmentId>) {
        let mut space = self.space.lock();
        for segment_id in segment_ids {
            if let Some((_, item)) = self.items.remove(segment_id) {
                let bits = item.approximate_size();
                space.used_bits -= bits;
                if level0_ids.contains(segment_id) {
                    space.level0_bits -= bits;
                }
            }
        }
    }

    /// Recompute accounting from the items, for invariant checks
    pub fn audit(&self, level0_ids: &HashSet<SegmentId>) -> (u64, u64) {
        let mut used = 0u64;
        let mut level0 = 0u64;
        for entry in self.items.iter() {
            let bits = entry.approximate_size();
            used += bits;
            if level0_ids.contains(entry.key()) {
                level0 += bits;
            }
        }
        (used, level0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::unit::testing::SetUnitSource;
    use proptest::prelude::*;

    fn small_map(cache_bits: u64) -> FilterCacheMap {
        let cache = CacheConfig {
            space_bits: cache_bits,
            ..CacheConfig::default()
        };
        // 1000-bit units, up to 6 per segment
        let source = Arc::new(SetUnitSource::new(1000, 6).with_keys(vec![b"present".to_vec()]));
        FilterCacheMap::new(&cache, source)
    }

    #[test]
    fn test_probe_missing_segment_is_conservative() {
        let map = small_map(10_000);
        assert!(map.probe(42, b"whatever"));
    }

    #[test]
    fn test_enable_accounts_bits() {
        let map = small_map(10_000);
        let failed = map.enable_batch(&[(1, 2), (2, 2)], false, &HashSet::new());
        assert!(failed.is_empty());
        assert_eq!(map.used_bits(), 4000);
        assert_eq!(map.enabled_units(1), Some(2));
        assert!(!map.probe(1, b"absent"));
        assert!(map.probe(1, b"present"));
    }

    #[test]
    fn test_admission_never_crosses_full_rate() {
        // threshold = 19600 bits; three segments reach 18000, still below
        // it, but any grow whose outcome would land at or past the
        // threshold is refused
        let map = small_map(20_000);
        let failed = map.enable_batch(&[(1, 6), (2, 6), (3, 6)], false, &HashSet::new());
        assert!(failed.is_empty());
        assert_eq!(map.used_bits(), 18_000);

        let failed = map.enable_batch(&[(4, 6)], false, &HashSet::new());
        assert_eq!(failed, vec![4]);
        assert_eq!(map.used_bits(), 18_000);
        assert!(!map.contains(4));

        // a one-unit grow lands at 19000, under the threshold
        let failed = map.enable_batch(&[(4, 1)], false, &HashSet::new());
        assert!(failed.is_empty());
        assert_eq!(map.used_bits(), 19_000);

        // another unit anywhere would reach 20000: refused
        let failed = map.enable_batch(&[(5, 1)], false, &HashSet::new());
        assert_eq!(failed, vec![5]);
        let failed = map.enable_batch(&[(4, 2)], false, &HashSet::new());
        assert_eq!(failed, vec![4]);
        assert_eq!(map.used_bits(), 19_000);
    }

    #[test]
    fn test_forced_growth_crosses_threshold_unforced_does_not() {
        let map = small_map(20_000);
        map.enable_batch(&[(1, 6), (2, 6), (3, 6)], false, &HashSet::new());
        assert_eq!(map.used_bits(), 18_000);
        assert!(!map.is_full());

        // only forced growth (swaps, clamp mirrors) may pass the threshold
        let failed = map.enable_batch(&[(4, 2)], true, &HashSet::new());
        assert!(failed.is_empty());
        assert_eq!(map.used_bits(), 20_000);
        assert!(map.is_full());

        let failed = map.enable_batch(&[(5, 1)], false, &HashSet::new());
        assert_eq!(failed, vec![5]);
        assert!(!map.contains(5));
    }

    #[test]
    fn test_level0_admitted_past_threshold() {
        // a nearly full cache still admits a level-0 segment at full units
        let map = small_map(20_000);
        map.enable_batch(&[(1, 6), (2, 6), (3, 6), (4, 1)], false, &HashSet::new());
        assert_eq!(map.used_bits(), 19_000);

        let level0: HashSet<SegmentId> = [9].into_iter().collect();
        let failed = map.enable_batch(&[(9, 1)], false, &level0);
        assert!(failed.is_empty());
        assert_eq!(map.used_bits(), 20_000);
        assert_eq!(map.level0_used_bits(), 1_000);
    }

    #[test]
    fn test_update_skips_missing() {
        let map = small_map(10_000);
        map.enable_batch(&[(1, 2)], false, &HashSet::new());
        let failed = map.update_batch(&[(1, 3), (99, 3)], true, &HashSet::new());
        assert!(failed.is_empty());
        assert_eq!(map.enabled_units(1), Some(3));
        assert!(!map.contains(99));
        assert_eq!(map.used_bits(), 3000);
    }

    #[test]
    fn test_release_restores_accounting() {
        let map = small_map(10_000);
        let level0: HashSet<SegmentId> = [2].into_iter().collect();
        map.enable_batch(&[(1, 3)], false, &HashSet::new());
        map.enable_batch(&[(2, 6)], false, &level0);
        assert_eq!(map.used_bits(), 9_000);
        assert_eq!(map.level0_used_bits(), 6_000);

        map.release_batch(&[1, 2], &level0);
        assert_eq!(map.used_bits(), 0);
        assert_eq!(map.level0_used_bits(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn test_ready_and_full_rates() {
        let map = small_map(10_000);
        assert!(!map.is_ready());
        map.enable_batch(&[(1, 6), (2, 1)], false, &HashSet::new());
        // 7000 / 10000 = 0.70
        assert!(map.is_ready());
        assert!(!map.is_full());
    }

    proptest! {
        // random interleavings of enable/update/release keep the counters
        // equal to the recomputed sums and under capacity
        #[test]
        fn prop_accounting_matches_items(
            ops in prop::collection::vec(
                (0u32..12, 0u16..=6, prop::bool::ANY, prop::bool::ANY),
                1..60
            ),
        ) {
            let map = small_map(1_000_000);
            let level0: HashSet<SegmentId> = [0, 1].into_iter().collect();

            for (sid, units, forced, release) in ops {
                if release {
                    map.release_batch(&[sid], &level0);
                } else {
                    map.enable_batch(&[(sid, units)], forced, &level0);
                }
                let (used, l0) = map.audit(&level0);
                prop_assert_eq!(map.used_bits(), used);
                prop_assert_eq!(map.level0_used_bits(), l0);
                prop_assert!(used <= 1_000_000);
            }
        }
    }
}
