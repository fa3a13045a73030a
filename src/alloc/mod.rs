//! Allocation policy: shared benefit/cost math and the offline solver

/// Marginal benefit/cost formulas shared by solver and twin heaps
pub mod policy;
/// Offline reference allocator
pub mod greedy;

pub use greedy::{GreedySolver, SegmentAllocInfo};
