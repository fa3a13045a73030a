//! Benefit/cost twin heaps driving continuous one-unit swaps
//!
//! Both heaps cover the same segments with the same
//! `(visit_cnt, current_units, units_limit)` tuple; only the keyed value
//! differs (enable benefit vs disable cost). A swap peeks both tops and,
//! when growing the benefit top pays for shrinking the cost top, replaces
//! all four affected nodes in one upsert. Everything runs under one manager
//! lock; the heaps themselves need no further locking.

use crate::alloc::policy::{disable_cost, enable_benefit};
use crate::core::error::{Error, Result};
use crate::core::types::{SegmentId, UnitCount};
use crate::heaps::heap::{FilterHeap, HeapKind, HeapNode};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// One segment's state as the engine wants it reflected in the heaps
#[derive(Debug, Clone, Copy)]
pub struct HeapItem {
    /// Segment id
    pub segment_id: SegmentId,
    /// Estimated visit count
    pub approx_visit_cnt: u32,
    /// Currently enabled units
    pub current_units: UnitCount,
    /// Prediction ceiling for this segment
    pub units_limit: UnitCount,
}

/// Outcome of one profitable swap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitsSwap {
    /// Segment gaining one unit
    pub gain_segment_id: SegmentId,
    /// Segment losing one unit
    pub loss_segment_id: SegmentId,
    /// Gaining segment's units before the swap
    pub gain_prev_units: UnitCount,
    /// Gaining segment's units after the swap
    pub gain_new_units: UnitCount,
    /// Losing segment's units before the swap
    pub loss_prev_units: UnitCount,
    /// Losing segment's units after the swap
    pub loss_new_units: UnitCount,
    /// Benefit that justified the swap
    pub benefit: f64,
    /// Cost paid by the swap
    pub cost: f64,
}

struct TwinInner {
    benefit_heap: FilterHeap,
    cost_heap: FilterHeap,
    // heap values are only re-keyed when the estimate drifts past the
    // update bound, so the recorders remember what the heaps currently use
    visit_recorder: BTreeMap<SegmentId, u32>,
    limit_recorder: BTreeMap<SegmentId, UnitCount>,
}

/// Twin-heap manager
pub struct TwinHeaps {
    inner: Mutex<TwinInner>,
    bits_per_key: u32,
    min_units: UnitCount,
    max_units: UnitCount,
    visit_update_bound: u32,
}

impl TwinHeaps {
    /// Create empty twin heaps
    pub fn new(
        bits_per_key: u32,
        min_units: UnitCount,
        max_units: UnitCount,
        visit_update_bound: u32,
    ) -> Self {
        Self {
            inner: Mutex::new(TwinInner {
                benefit_heap: FilterHeap::new(HeapKind::Benefit),
                cost_heap: FilterHeap::new(HeapKind::Cost),
                visit_recorder: BTreeMap::new(),
                limit_recorder: BTreeMap::new(),
            }),
            bits_per_key,
            min_units,
            max_units,
            visit_update_bound,
        }
    }

    /// Number of live segments tracked
    pub fn len(&self) -> usize {
        self.inner.lock().benefit_heap.len()
    }

    /// Whether no segments are tracked
    pub fn is_empty(&self) -> bool {
        self.inner.lock().benefit_heap.is_empty()
    }

    /// Whether a segment has live nodes
    pub fn contains(&self, segment_id: SegmentId) -> bool {
        self.inner.lock().benefit_heap.get(segment_id).is_some()
    }

    /// Current `(units, limit, visit)` tuple of a live segment
    pub fn segment_state(&self, segment_id: SegmentId) -> Option<(UnitCount, UnitCount, u32)> {
        let inner = self.inner.lock();
        inner
            .benefit_heap
            .get(segment_id)
            .map(|node| (node.current_units, node.units_limit, node.approx_visit_cnt))
    }

    /// Look up a batch of segments; a slot is `None` when the segment was
    /// never inserted or has been tombstoned
    pub fn batch_query(&self, segment_ids: &[SegmentId]) -> Vec<Option<HeapItem>> {
        let inner = self.inner.lock();
        segment_ids
            .iter()
            .map(|&sid| {
                inner.benefit_heap.get(sid).map(|node| HeapItem {
                    segment_id: sid,
                    approx_visit_cnt: node.approx_visit_cnt,
                    current_units: node.current_units,
                    units_limit: node.units_limit,
                })
            })
            .collect()
    }

    /// Insert or overwrite segments in both heaps, then rebuild both.
    ///
    /// Rejects items whose units exceed their limit or whose limit exceeds
    /// the configured ceiling.
    pub fn upsert_batch(&self, items: &[HeapItem]) -> Result<()> {
        for item in items {
            if item.units_limit > self.max_units {
                return Err(Error::invalid_input(format!(
                    "units limit {} above ceiling {} for segment {}",
                    item.units_limit, self.max_units, item.segment_id
                )));
            }
            if item.current_units < self.min_units || item.current_units > item.units_limit {
                return Err(Error::invalid_input(format!(
                    "units {} outside [{}, {}] for segment {}",
                    item.current_units, self.min_units, item.units_limit, item.segment_id
                )));
            }
        }

        let mut inner = self.inner.lock();
        for item in items {
            self.upsert_one(&mut inner, item);
        }
        inner.benefit_heap.rebuild();
        inner.cost_heap.rebuild();
        Ok(())
    }

    fn upsert_one(&self, inner: &mut TwinInner, item: &HeapItem) {
        let benefit = enable_benefit(
            item.approx_visit_cnt,
            item.current_units,
            item.units_limit,
            self.bits_per_key,
        );
        let cost = disable_cost(
            item.approx_visit_cnt,
            item.current_units,
            self.min_units,
            self.bits_per_key,
        );

        inner.benefit_heap.upsert(HeapNode {
            segment_id: item.segment_id,
            approx_visit_cnt: item.approx_visit_cnt,
            current_units: item.current_units,
            value: benefit,
            units_limit: item.units_limit,
            alive: true,
        });
        inner.cost_heap.upsert(HeapNode {
            segment_id: item.segment_id,
            approx_visit_cnt: item.approx_visit_cnt,
            current_units: item.current_units,
            value: cost,
            units_limit: item.units_limit,
            alive: true,
        });

        inner
            .visit_recorder
            .insert(item.segment_id, item.approx_visit_cnt);
        inner
            .limit_recorder
            .insert(item.segment_id, item.units_limit);
    }

    /// Tombstone segments in both heaps and drop their recorder entries;
    /// the rebuild sweeps the dead nodes out
    pub fn delete_batch(&self, segment_ids: &[SegmentId]) {
        let mut inner = self.inner.lock();
        for &sid in segment_ids {
            inner.visit_recorder.remove(&sid);
            inner.limit_recorder.remove(&sid);
            inner.benefit_heap.tombstone(sid);
            inner.cost_heap.tombstone(sid);
        }
        inner.benefit_heap.rebuild();
        inner.cost_heap.rebuild();
    }

    /// Re-key segments whose estimated visit count drifted past the update
    /// bound; others keep their stale value to avoid useless rebuilds.
    pub fn sync_visit_cnt(&self, current: &BTreeMap<SegmentId, u32>) {
        let mut inner = self.inner.lock();

        let mut stale: Vec<SegmentId> = Vec::new();
        for (&sid, &cnt) in current {
            if let Some(recorded) = inner.visit_recorder.get_mut(&sid) {
                if cnt.abs_diff(*recorded) > self.visit_update_bound {
                    *recorded = cnt;
                    stale.push(sid);
                }
            }
        }
        if stale.is_empty() {
            return;
        }

        for &sid in &stale {
            let cnt = current[&sid];
            if let Some(node) = inner.benefit_heap.get_mut(sid) {
                node.approx_visit_cnt = cnt;
                node.value =
                    enable_benefit(cnt, node.current_units, node.units_limit, self.bits_per_key);
            }
            if let Some(node) = inner.cost_heap.get_mut(sid) {
                node.approx_visit_cnt = cnt;
                node.value = disable_cost(cnt, node.current_units, self.min_units, self.bits_per_key);
            }
        }

        inner.benefit_heap.rebuild();
        inner.cost_heap.rebuild();
    }

    /// Apply new prediction ceilings, clamping enabled units down where the
    /// ceiling dropped below them. Returns `(segment, clamped_units)` for
    /// every segment whose units changed so the caller can mirror the clamp
    /// into the filter cache map.
    pub fn sync_units_num_limit(
        &self,
        current: &BTreeMap<SegmentId, UnitCount>,
    ) -> Vec<(SegmentId, UnitCount)> {
        let mut inner = self.inner.lock();

        let mut stale: Vec<SegmentId> = Vec::new();
        for (&sid, &limit) in current {
            debug_assert!(limit <= self.max_units, "prediction above units ceiling");
            if let Some(recorded) = inner.limit_recorder.get_mut(&sid) {
                if *recorded != limit {
                    *recorded = limit;
                    stale.push(sid);
                }
            }
        }
        if stale.is_empty() {
            return Vec::new();
        }

        let mut clamped = Vec::new();
        for &sid in &stale {
            let limit = current[&sid];
            if let Some(node) = inner.benefit_heap.get_mut(sid) {
                node.units_limit = limit;
                if node.current_units > limit {
                    node.current_units = limit;
                    clamped.push((sid, limit));
                }
                node.value = enable_benefit(
                    node.approx_visit_cnt,
                    node.current_units,
                    limit,
                    self.bits_per_key,
                );
            }
            if let Some(node) = inner.cost_heap.get_mut(sid) {
                node.units_limit = limit;
                node.current_units = node.current_units.min(limit);
                node.value = disable_cost(
                    node.approx_visit_cnt,
                    node.current_units,
                    self.min_units,
                    self.bits_per_key,
                );
            }
        }

        inner.benefit_heap.rebuild();
        inner.cost_heap.rebuild();
        clamped
    }

    /// Attempt one profitable swap between the heap tops.
    ///
    /// Succeeds only when both tops are alive, belong to different
    /// segments, and the benefit of growing one strictly exceeds the cost
    /// of shrinking the other; the four affected nodes are replaced before
    /// returning. The total enabled-unit count across the pair is
    /// preserved.
    pub fn try_modify(&self) -> Option<UnitsSwap> {
        let mut inner = self.inner.lock();

        let (gain, loss) = {
            let benefit_top = inner.benefit_heap.top()?;
            let cost_top = inner.cost_heap.top()?;
            if !benefit_top.alive || !cost_top.alive {
                return None;
            }
            if benefit_top.segment_id == cost_top.segment_id {
                return None;
            }
            if benefit_top.value <= cost_top.value {
                return None;
            }
            (benefit_top.clone(), cost_top.clone())
        };

        let swap = UnitsSwap {
            gain_segment_id: gain.segment_id,
            loss_segment_id: loss.segment_id,
            gain_prev_units: gain.current_units,
            gain_new_units: gain.current_units + 1,
            loss_prev_units: loss.current_units,
            loss_new_units: loss.current_units - 1,
            benefit: gain.value,
            cost: loss.value,
        };

        self.upsert_one(
            &mut inner,
            &HeapItem {
                segment_id: gain.segment_id,
                approx_visit_cnt: gain.approx_visit_cnt,
                current_units: swap.gain_new_units,
                units_limit: gain.units_limit,
            },
        );
        self.upsert_one(
            &mut inner,
            &HeapItem {
                segment_id: loss.segment_id,
                approx_visit_cnt: loss.approx_visit_cnt,
                current_units: swap.loss_new_units,
                units_limit: loss.units_limit,
            },
        );
        inner.benefit_heap.rebuild();
        inner.cost_heap.rebuild();

        Some(swap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{
        BITS_PER_KEY_PER_UNIT, MAX_UNITS_NUM, MIN_UNITS_NUM, VISIT_CNT_UPDATE_BOUND,
    };

    fn twin() -> TwinHeaps {
        TwinHeaps::new(
            BITS_PER_KEY_PER_UNIT,
            MIN_UNITS_NUM,
            MAX_UNITS_NUM,
            VISIT_CNT_UPDATE_BOUND,
        )
    }

    fn item(segment_id: SegmentId, visit: u32, units: UnitCount, limit: UnitCount) -> HeapItem {
        HeapItem {
            segment_id,
            approx_visit_cnt: visit,
            current_units: units,
            units_limit: limit,
        }
    }

    #[test]
    fn test_upsert_validates_bounds() {
        let heaps = twin();
        assert!(heaps.upsert_batch(&[item(1, 10, 7, 7)]).is_err());
        assert!(heaps.upsert_batch(&[item(1, 10, 5, 4)]).is_err());
        assert!(heaps.upsert_batch(&[item(1, 10, 4, 6)]).is_ok());
        assert_eq!(heaps.len(), 1);
    }

    #[test]
    fn test_swap_moves_unit_from_cold_to_hot() {
        // a hot segment at 2 units vs a cold one at 4 units
        let heaps = twin();
        heaps
            .upsert_batch(&[item(1, 1000, 2, 6), item(2, 5, 4, 6)])
            .unwrap();

        let swap = heaps.try_modify().expect("swap should be profitable");
        assert_eq!(swap.gain_segment_id, 1);
        assert_eq!(swap.loss_segment_id, 2);
        assert_eq!(swap.gain_prev_units, 2);
        assert_eq!(swap.gain_new_units, 3);
        assert_eq!(swap.loss_prev_units, 4);
        assert_eq!(swap.loss_new_units, 3);
        assert!(swap.benefit > swap.cost);

        // the pair's total units is preserved
        let (a_units, _, _) = heaps.segment_state(1).unwrap();
        let (b_units, _, _) = heaps.segment_state(2).unwrap();
        assert_eq!(a_units + b_units, 6);
    }

    #[test]
    fn test_swap_sequence_terminates() {
        let heaps = twin();
        heaps
            .upsert_batch(&[item(1, 1000, 2, 6), item(2, 5, 4, 6)])
            .unwrap();

        let mut swaps = 0;
        while heaps.try_modify().is_some() {
            swaps += 1;
            assert!(swaps < 64, "swap loop must converge");
        }
        assert!(swaps >= 1);

        // once converged, the state is a fixed point
        assert!(heaps.try_modify().is_none());
    }

    #[test]
    fn test_no_swap_when_same_segment_on_both_tops() {
        let heaps = twin();
        heaps.upsert_batch(&[item(1, 1000, 3, 6)]).unwrap();
        assert!(heaps.try_modify().is_none());
    }

    #[test]
    fn test_no_swap_when_benefit_cannot_pay() {
        let heaps = twin();
        // both segments equally hot and equally provisioned
        heaps
            .upsert_batch(&[item(1, 100, 3, 6), item(2, 100, 3, 6)])
            .unwrap();
        assert!(heaps.try_modify().is_none());
    }

    #[test]
    fn test_limit_zero_segment_never_gains() {
        let heaps = twin();
        heaps
            .upsert_batch(&[item(1, 1000, 0, 0), item(2, 5, 4, 6)])
            .unwrap();
        // segment 1's benefit is pinned to zero by its limit
        assert!(heaps.try_modify().is_none());
    }

    #[test]
    fn test_delete_then_reinsert_roundtrip() {
        let heaps = twin();
        heaps
            .upsert_batch(&[item(1, 100, 2, 6), item(2, 50, 3, 6)])
            .unwrap();
        heaps.delete_batch(&[1, 2]);
        assert!(heaps.is_empty());
        assert!(!heaps.contains(1));
        assert!(heaps.try_modify().is_none());

        heaps.upsert_batch(&[item(1, 100, 2, 6)]).unwrap();
        assert_eq!(heaps.len(), 1);
    }

    #[test]
    fn test_sync_visit_cnt_respects_bound_and_is_idempotent() {
        let heaps = twin();
        heaps.upsert_batch(&[item(1, 100, 2, 6)]).unwrap();

        // drift within the bound: nothing changes
        let mut small = BTreeMap::new();
        small.insert(1, 105u32);
        heaps.sync_visit_cnt(&small);
        assert_eq!(heaps.segment_state(1).unwrap().2, 100);

        // drift past the bound: node re-keyed
        let mut large = BTreeMap::new();
        large.insert(1, 500u32);
        heaps.sync_visit_cnt(&large);
        assert_eq!(heaps.segment_state(1).unwrap().2, 500);

        // applying the same snapshot again is a no-op
        heaps.sync_visit_cnt(&large);
        assert_eq!(heaps.segment_state(1).unwrap().2, 500);
    }

    #[test]
    fn test_sync_units_limit_clamps_and_reports() {
        let heaps = twin();
        heaps
            .upsert_batch(&[item(1, 100, 5, 6), item(2, 100, 2, 6)])
            .unwrap();

        let mut limits = BTreeMap::new();
        limits.insert(1, 3u16);
        limits.insert(2, 6u16);
        let clamped = heaps.sync_units_num_limit(&limits);
        assert_eq!(clamped, vec![(1, 3)]);

        let (units, limit, _) = heaps.segment_state(1).unwrap();
        assert_eq!((units, limit), (3, 3));
        let (units, limit, _) = heaps.segment_state(2).unwrap();
        assert_eq!((units, limit), (2, 6));
    }

    #[test]
    fn test_batch_query_hides_tombstoned_segments() {
        let heaps = twin();
        heaps
            .upsert_batch(&[item(1, 100, 2, 6), item(2, 50, 3, 6)])
            .unwrap();
        heaps.delete_batch(&[2]);

        let results = heaps.batch_query(&[1, 2, 3]);
        assert_eq!(results[0].as_ref().map(|i| i.current_units), Some(2));
        assert!(results[1].is_none());
        assert!(results[2].is_none());
    }

    #[test]
    fn test_sync_ignores_unknown_segments() {
        let heaps = twin();
        heaps.upsert_batch(&[item(1, 100, 2, 6)]).unwrap();

        let mut counts = BTreeMap::new();
        counts.insert(99, 1000u32);
        heaps.sync_visit_cnt(&counts);
        assert!(!heaps.contains(99));
    }
}
