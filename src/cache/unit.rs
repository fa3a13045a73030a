//! Seam to the external Bloom-filter unit implementation
//!
//! Hashing, bit layout and the lookup against disk-resident payloads belong
//! to the hosting engine; the cache only needs membership tests and sizes.

use crate::core::types::{SegmentId, UnitCount};
use std::sync::Arc;

/// One Bloom filter over a segment's keys
pub trait FilterUnit: Send + Sync {
    /// Membership test. `false` means the key is definitely absent from the
    /// segment; `true` may be a false positive.
    fn may_contain(&self, key: &[u8]) -> bool;
}

/// Supplier of a segment's filter-unit payloads, backed by segment metadata
pub trait FilterUnitSource: Send + Sync {
    /// Bits one unit of this segment occupies when enabled
    fn unit_bits(&self, segment_id: SegmentId) -> u64;

    /// Load the `index`-th unit of the segment; `None` when the segment has
    /// fewer units than `index + 1`
    fn load_unit(&self, segment_id: SegmentId, index: UnitCount) -> Option<Arc<dyn FilterUnit>>;
}
