//! Offline reference allocator
//!
//! Given the last long period's visit counts and per-unit sizes, computes
//! how many units every segment would get if the whole non-level-0 budget
//! were re-dealt from scratch: repeatedly grant one unit to the segment
//! whose next unit currently saves the most wasted reads. The output labels
//! the training dataset for the classifier.
//!
//! Not thread-safe; the engine runs it from a single background task per
//! long period.

use crate::alloc::policy::enable_benefit;
use crate::core::types::{SegmentId, UnitCount};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BinaryHeap;

/// Per-segment input to the solver
#[derive(Debug, Clone, Copy)]
pub struct SegmentAllocInfo {
    /// Estimated visits over the last long period
    pub visit_cnt: u32,
    /// Bits one filter unit of this segment occupies
    pub unit_bits: u64,
}

impl SegmentAllocInfo {
    /// Create a new solver input entry
    pub fn new(visit_cnt: u32, unit_bits: u64) -> Self {
        Self {
            visit_cnt,
            unit_bits,
        }
    }
}

/// Candidate for the next unit grant. Ordered by marginal benefit, with the
/// insertion sequence breaking ties so equal-benefit segments are granted
/// in input order; no wall clock and no RNG keeps the solver deterministic.
struct Candidate {
    benefit: f64,
    seq: u64,
    segment_id: SegmentId,
    units_num: UnitCount,
    visit_cnt: u32,
    unit_bits: u64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // max-heap: larger benefit wins, earlier insertion wins ties
        self.benefit
            .total_cmp(&other.benefit)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Marginal-benefit-first reference allocator
pub struct GreedySolver {
    max_units: UnitCount,
    bits_per_key: u32,
}

impl GreedySolver {
    /// Create a solver for the given unit ceiling and per-unit bits-per-key
    pub fn new(max_units: UnitCount, bits_per_key: u32) -> Self {
        Self {
            max_units,
            bits_per_key,
        }
    }

    /// Compute the reference allocation under `capacity_bits`.
    ///
    /// Every input segment appears in the result, possibly at zero units.
    /// For any two segments with equal unit size, the one with more visits
    /// never receives fewer units.
    pub fn solve(
        &self,
        infos: &BTreeMap<SegmentId, SegmentAllocInfo>,
        capacity_bits: u64,
    ) -> BTreeMap<SegmentId, UnitCount> {
        let mut solution: BTreeMap<SegmentId, UnitCount> =
            infos.keys().map(|&sid| (sid, 0)).collect();

        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(infos.len());
        let mut seq = 0u64;
        for (&segment_id, info) in infos {
            let benefit =
                enable_benefit(info.visit_cnt, 0, self.max_units, self.bits_per_key);
            if info.visit_cnt == 0 || benefit <= 0.0 {
                continue;
            }
            heap.push(Candidate {
                benefit,
                seq,
                segment_id,
                units_num: 0,
                visit_cnt: info.visit_cnt,
                unit_bits: info.unit_bits,
            });
            seq += 1;
        }

        let mut used_bits = 0u64;
        while let Some(top) = heap.pop() {
            // not enough room for one more unit of this segment: drop it
            // permanently, it will never fit later either
            if used_bits + top.unit_bits > capacity_bits {
                continue;
            }

            let next_units = top.units_num + 1;
            solution.insert(top.segment_id, next_units);
            used_bits += top.unit_bits;

            let next_benefit = enable_benefit(
                top.visit_cnt,
                next_units,
                self.max_units,
                self.bits_per_key,
            );
            if next_benefit > 0.0 {
                heap.push(Candidate {
                    benefit: next_benefit,
                    seq: top.seq,
                    segment_id: top.segment_id,
                    units_num: next_units,
                    visit_cnt: top.visit_cnt,
                    unit_bits: top.unit_bits,
                });
            }
        }

        solution
    }
}
