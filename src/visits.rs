//! Per-segment visit counting across long periods
//!
//! Two maps: `current` accumulates the running long period, `last` holds the
//! finished one. Estimation blends the two by how far the current long
//! period has progressed, so early in a period the previous period still
//! dominates. Compactions inherit counts from merged segments into their
//! successors instead of starting cold.

use crate::core::types::SegmentId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

struct CountMaps {
    last: BTreeMap<SegmentId, u32>,
    current: BTreeMap<SegmentId, u32>,
}

/// Approximate visit counters for the last and current long periods
pub struct VisitCounters {
    maps: Mutex<CountMaps>,
}

impl Default for VisitCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl VisitCounters {
    /// Create empty counters
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(CountMaps {
                last: BTreeMap::new(),
                current: BTreeMap::new(),
            }),
        }
    }

    /// Record one visit to a segment
    pub fn hit(&self, segment_id: SegmentId) {
        let mut maps = self.maps.lock();
        *maps.current.entry(segment_id).or_insert(0) += 1;
    }

    /// Close the current long period: the current counts become the last
    /// counts and every current value resets to zero (keys survive).
    pub fn rollover(&self) {
        let mut maps = self.maps.lock();
        maps.last = maps.current.clone();
        for count in maps.current.values_mut() {
            *count = 0;
        }
    }

    /// Blend current and last counts by the elapsed fraction `progress` of
    /// the current long period: `current + (1 − p) × last`, `p` clamped to
    /// `[0, 1]`.
    pub fn estimate_for_all(&self, progress: f64) -> BTreeMap<SegmentId, u32> {
        let p = progress.clamp(0.0, 1.0);
        let maps = self.maps.lock();

        let mut estimates = maps.current.clone();
        for (sid, estimate) in estimates.iter_mut() {
            if let Some(&last) = maps.last.get(sid) {
                *estimate += ((1.0 - p) * last as f64) as u32;
            }
        }
        estimates
    }

    /// Snapshot of the last long period's counts
    pub fn last_counts(&self) -> BTreeMap<SegmentId, u32> {
        self.maps.lock().last.clone()
    }

    /// Snapshot of the running long period's counts
    pub fn current_counts(&self) -> BTreeMap<SegmentId, u32> {
        self.maps.lock().current.clone()
    }

    /// Replace merged segments with their successors.
    ///
    /// Every old id leaves both maps; every new id enters both maps with
    /// `⌊remain_factor × Σ weight × old_count⌋` computed per map. A new id
    /// absent from the weight matrix (a fresh level-0 flush) is seeded with
    /// `level0_base` in both maps.
    pub fn inherit(
        &self,
        old_ids: &[SegmentId],
        new_ids: &[SegmentId],
        weights: &BTreeMap<SegmentId, HashMap<SegmentId, f64>>,
        remain_factor: f64,
        level0_base: u32,
    ) {
        let mut maps = self.maps.lock();

        let old_last: Vec<u32> = old_ids
            .iter()
            .map(|sid| maps.last.remove(sid).unwrap_or(0))
            .collect();
        let old_current: Vec<u32> = old_ids
            .iter()
            .map(|sid| maps.current.remove(sid).unwrap_or(0))
            .collect();

        for &new_id in new_ids {
            match weights.get(&new_id) {
                Some(row) => {
                    let mut last_sum = 0.0;
                    let mut current_sum = 0.0;
                    for (idx, old_id) in old_ids.iter().enumerate() {
                        if let Some(&w) = row.get(old_id) {
                            last_sum += w * old_last[idx] as f64;
                            current_sum += w * old_current[idx] as f64;
                        }
                    }
                    maps.last
                        .insert(new_id, (remain_factor * last_sum) as u32);
                    maps.current
                        .insert(new_id, (remain_factor * current_sum) as u32);
                }
                None => {
                    maps.last.insert(new_id, level0_base);
                    maps.current.insert(new_id, level0_base);
                }
            }
        }
    }

    /// Drop segments from both maps
    pub fn remove(&self, segment_ids: &[SegmentId]) {
        let mut maps = self.maps.lock();
        for sid in segment_ids {
            maps.last.remove(sid);
            maps.current.remove(sid);
        }
    }

    /// Scale segments' counts in both maps, rounding down
    pub fn decay(&self, segment_ids: &[SegmentId], factor: f64) {
        let mut maps = self.maps.lock();
        for sid in segment_ids {
            if let Some(count) = maps.last.get_mut(sid) {
                *count = (*count as f64 * factor) as u32;
            }
            if let Some(count) = maps.current.get_mut(sid) {
                *count = (*count as f64 * factor) as u32;
            }
        }
    }
}
