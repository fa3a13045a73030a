//! Per-range EWMA hotness estimation
//!
//! The key space is partitioned once into ranges by the sampling pool; from
//! then on each read lands in exactly one bucket. At every short-period
//! rollover a bucket folds its hit count into an exponentially weighted
//! hotness estimate. Hotness feeds the classifier features and nothing on
//! the read path ever blocks on more than one bucket lock.

use crate::core::config::{PeriodConfig, SamplingConfig};
use crate::core::types::{KeySpan, RangeId, SegmentId};
use crate::hotness::samples::SamplesPool;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Point-in-time copy of one bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSnapshot {
    /// EWMA hotness estimate
    pub hotness: f64,
    /// Hits accumulated in the current short period
    pub hit_cnt: u32,
}

struct Bucket {
    hotness: f64,
    hit_cnt: u32,
}

impl Bucket {
    fn new() -> Self {
        Self {
            hotness: 0.0,
            hit_cnt: 0,
        }
    }

    fn hit(&mut self) {
        self.hit_cnt += 1;
    }

    fn update(&mut self, alpha: f64, period_count: u64) {
        self.hotness = alpha * self.hotness + self.hit_cnt as f64 / period_count as f64;
        self.hit_cnt = 0;
    }
}

/// Immutable after freeze: interior separators plus one bucket per range.
///
/// With `m` interior separators the ranges are `(−∞, s₀)`, `[s₀, s₁)`, …,
/// `[s_{m−1}, +∞)`, i.e. `m + 1` buckets; the virtual end separators make
/// every key locatable.
struct RangeTable {
    separators: Vec<Vec<u8>>,
    buckets: Vec<Mutex<Bucket>>,
}

struct RolloverGuard {
    total_cnt: u64,
    last_update_cnt: u64,
    updated: bool,
}

/// Reservoir-backed key-range partition with per-range hotness
pub struct HeatBuckets {
    alpha: f64,
    period_count: u64,
    rearm_window: u64,
    default_buckets: usize,
    samples: Mutex<SamplesPool>,
    spans: Mutex<BTreeMap<SegmentId, KeySpan>>,
    table: OnceCell<RangeTable>,
    guard: Mutex<RolloverGuard>,
}

impl HeatBuckets {
    /// Create an unfrozen estimator that samples until ready
    pub fn new(sampling: &SamplingConfig, periods: &PeriodConfig) -> Self {
        Self {
            alpha: sampling.alpha,
            period_count: periods.period_count,
            rearm_window: (periods.period_count / periods.magic_factor).max(1),
            default_buckets: sampling.default_buckets,
            samples: Mutex::new(SamplesPool::new(
                sampling.samples_limit,
                sampling.samples_maxcnt,
            )),
            spans: Mutex::new(BTreeMap::new()),
            table: OnceCell::new(),
            guard: Mutex::new(RolloverGuard {
                total_cnt: 0,
                last_update_cnt: 0,
                updated: false,
            }),
        }
    }

    /// Whether the partition is frozen and hits are being recorded
    pub fn is_ready(&self) -> bool {
        self.table.get().is_some()
    }

    /// Number of key ranges; zero until ready
    pub fn range_count(&self) -> usize {
        self.table.get().map_or(0, |t| t.buckets.len())
    }

    /// Record the key span of a live segment; used only at freeze time to
    /// guarantee every segment covers at least one full range
    pub fn record_span(&self, segment_id: SegmentId, span: KeySpan) {
        if self.is_ready() {
            return;
        }
        self.spans.lock().insert(segment_id, span);
    }

    /// Forget spans of segments that no longer exist
    pub fn remove_spans(&self, segment_ids: &[SegmentId]) {
        let mut spans = self.spans.lock();
        for sid in segment_ids {
            spans.remove(sid);
        }
    }

    /// Offer a written key to the reservoir; freezes the partition once the
    /// sample threshold is reached. Returns readiness after the offer.
    pub fn offer(&self, key: &[u8]) -> bool {
        if self.is_ready() {
            return true;
        }

        let mut samples = self.samples.lock();
        samples.offer(key);
        if !samples.is_ready() {
            return false;
        }

        samples.prepare();
        let spans: Vec<KeySpan> = self.spans.lock().values().cloned().collect();
        let k = samples.determine_k(&spans, self.default_buckets);
        let separators = samples.divide(k);

        let buckets = (0..separators.len() + 1)
            .map(|_| Mutex::new(Bucket::new()))
            .collect();
        tracing::info!(
            ranges = separators.len() + 1,
            stride = k,
            "heat buckets frozen"
        );
        // the samples lock serializes freezing, so only one thread gets here
        let _ = self.table.set(RangeTable {
            separators,
            buckets,
        });
        true
    }

    /// Locate the range a key belongs to; `None` until ready
    pub fn locate(&self, key: &[u8]) -> Option<RangeId> {
        let table = self.table.get()?;
        let idx = table
            .separators
            .partition_point(|sep| sep.as_slice() <= key);
        Some(idx as RangeId)
    }

    /// Record one read. When `rollover` is set and the guard is armed,
    /// every bucket folds its hit count into the hotness estimate; repeated
    /// rollover signals inside the re-arm window are ignored.
    pub fn hit(&self, key: &[u8], rollover: bool) {
        let table = match self.table.get() {
            Some(t) => t,
            None => return,
        };

        let idx = table
            .separators
            .partition_point(|sep| sep.as_slice() <= key);
        table.buckets[idx].lock().hit();

        let mut guard = self.guard.lock();
        guard.total_cnt += 1;
        if guard.updated && guard.total_cnt - guard.last_update_cnt >= self.rearm_window {
            guard.updated = false;
        }

        if rollover && !guard.updated {
            for bucket in &table.buckets {
                bucket.lock().update(self.alpha, self.period_count);
            }
            guard.updated = true;
            guard.last_update_cnt = guard.total_cnt;
        }
    }

    /// The frozen interior separators; empty until ready. Range `r` covers
    /// keys in `[separators[r − 1], separators[r])` with open ends.
    pub fn separators(&self) -> Vec<Vec<u8>> {
        self.table
            .get()
            .map_or_else(Vec::new, |t| t.separators.clone())
    }

    /// Hotness of one range; zero for unknown ranges
    pub fn hotness_of(&self, range: RangeId) -> f64 {
        self.table
            .get()
            .and_then(|t| t.buckets.get(range as usize))
            .map_or(0.0, |b| b.lock().hotness)
    }

    /// Copy every bucket's state
    pub fn snapshot_buckets(&self) -> Vec<BucketSnapshot> {
        match self.table.get() {
            Some(table) => table
                .buckets
                .iter()
                .map(|b| {
                    let bucket = b.lock();
                    BucketSnapshot {
                        hotness: bucket.hotness,
                        hit_cnt: bucket.hit_cnt,
                    }
                })
                .collect(),
            None => Vec::new(),
        }
    }
}
