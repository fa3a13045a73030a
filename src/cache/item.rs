//! Filter state of one segment: the enabled prefix of its unit sequence

use crate::cache::unit::{FilterUnit, FilterUnitSource};
use crate::core::types::{SegmentId, UnitCount};
use std::sync::Arc;

/// Enabled filter units of a single segment.
///
/// Units form a prefix of the segment's unit sequence; enabling grows the
/// prefix by loading payloads from the source, disabling truncates it and
/// releases the memory.
pub struct FilterCacheItem {
    segment_id: SegmentId,
    units: Vec<Arc<dyn FilterUnit>>,
    unit_bits: u64,
}

impl FilterCacheItem {
    /// Create an item with no units enabled
    pub fn new(segment_id: SegmentId, source: &dyn FilterUnitSource) -> Self {
        Self {
            segment_id,
            units: Vec::new(),
            unit_bits: source.unit_bits(segment_id),
        }
    }

    /// Segment this item belongs to
    pub fn segment_id(&self) -> SegmentId {
        self.segment_id
    }

    /// Number of enabled units
    pub fn enabled_units(&self) -> UnitCount {
        self.units.len() as UnitCount
    }

    /// Bits currently held by the enabled prefix
    pub fn approximate_size(&self) -> u64 {
        self.units.len() as u64 * self.unit_bits
    }

    /// Grow or shrink the enabled prefix to `units_num`.
    ///
    /// Growing stops early if the source runs out of payloads, so the
    /// enabled count never overstates what can actually be probed.
    pub fn enable_units(&mut self, units_num: UnitCount, source: &dyn FilterUnitSource) {
        let target = units_num as usize;
        if target < self.units.len() {
            self.units.truncate(target);
            return;
        }
        while self.units.len() < target {
            match source.load_unit(self.segment_id, self.units.len() as UnitCount) {
                Some(unit) => self.units.push(unit),
                None => break,
            }
        }
    }

    /// Probe the enabled prefix. Returns `false` only when some enabled
    /// unit excludes the key; with no units enabled there is no filtering
    /// and the answer is `true`.
    pub fn check_key(&self, key: &[u8]) -> bool {
        self.units.iter().all(|unit| unit.may_contain(key))
    }
}
