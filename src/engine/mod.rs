//! The adaptive allocation engine façade
//!
//! One [`AllocationEngine`] instance coordinates every component around the
//! hosting LSM engine's lifecycle: point lookups probe inline and defer
//! their bookkeeping, compaction hooks reshape counters, cache and heaps
//! from a background task, period boundaries drive hotness updates and
//! retraining, and a dedicated thread continuously swaps single units
//! between segments while the cache is full.
//!
//! Construct once in the host and share by reference; the engine holds no
//! process-level state.

use crate::cache::unit::FilterUnitSource;
use crate::cache::FilterCacheMap;
use crate::classifier::{ClassifierClient, FeatureRow};
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{KeySpan, Level, RangeRatePair, SegmentId, UnitCount};
use crate::executor::BackgroundExecutor;
use crate::heaps::{HeapItem, TwinHeaps};
use crate::hotness::HeatBuckets;
use crate::system::metrics::Metrics;
use crate::visits::VisitCounters;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[cfg(test)]
mod tests;

/// How long the adjuster parks when no swap is available
const ADJUSTER_IDLE: Duration = Duration::from_millis(2);

struct SegmentRecorders {
    levels: BTreeMap<SegmentId, Level>,
    ranges: BTreeMap<SegmentId, Vec<RangeRatePair>>,
}

/// Component state shared between callers, pool workers and the adjuster
struct EngineShared {
    cfg: Config,
    map: FilterCacheMap,
    heaps: TwinHeaps,
    counters: VisitCounters,
    heat: HeatBuckets,
    classifier: ClassifierClient,
    /// Total reads observed; never reset, period boundaries are modulo
    reads: AtomicU64,
    train_signal: AtomicBool,
    ready: AtomicBool,
    stop: AtomicBool,
    /// Serializes rollover bodies so each boundary executes once
    update_mutex: Mutex<()>,
    recorders: Mutex<SegmentRecorders>,
}

/// Thread-safe façade over the adaptive allocation machinery
pub struct AllocationEngine {
    shared: Arc<EngineShared>,
    executor: Arc<BackgroundExecutor>,
    adjuster: Mutex<Option<JoinHandle<()>>>,
}

impl AllocationEngine {
    /// Build an engine over the host's filter-unit source.
    ///
    /// Validates the configuration; no threads beyond the worker pool are
    /// started until [`start_adjuster`](Self::start_adjuster).
    pub fn new(cfg: Config, source: Arc<dyn FilterUnitSource>) -> Result<Self> {
        cfg.validate()?;
        crate::system::metrics::init_registry();

        let shared = Arc::new(EngineShared {
            map: FilterCacheMap::new(&cfg.cache, source),
            heaps: TwinHeaps::new(
                cfg.cache.bits_per_key_per_unit,
                cfg.cache.min_units,
                cfg.cache.max_units,
                cfg.cache.visit_cnt_update_bound,
            ),
            counters: VisitCounters::new(),
            heat: HeatBuckets::new(&cfg.sampling, &cfg.periods),
            classifier: ClassifierClient::new(
                cfg.classifier.clone(),
                cfg.cache.min_units,
                cfg.cache.max_units,
            ),
            reads: AtomicU64::new(0),
            train_signal: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            update_mutex: Mutex::new(()),
            recorders: Mutex::new(SegmentRecorders {
                levels: BTreeMap::new(),
                ranges: BTreeMap::new(),
            }),
            cfg: cfg.clone(),
        });

        let executor = Arc::new(BackgroundExecutor::new(cfg.executor.worker_threads));

        Ok(Self {
            shared,
            executor,
            adjuster: Mutex::new(None),
        })
    }

    /// Probe a segment's enabled filter units for a key.
    ///
    /// Returns `true` conservatively for unknown segments. The visit-count
    /// update runs on the background pool; nothing on this path blocks
    /// beyond one map shard lock.
    pub fn check_key(&self, segment_id: SegmentId, key: &[u8]) -> bool {
        let (present, passes) = self.shared.map.probe_detailed(segment_id, key);

        let metrics = Metrics::global();
        metrics.probe.probes.inc();
        if !present {
            metrics.probe.misses.inc();
        }
        if !passes {
            metrics.probe.negatives.inc();
        }

        let shared = self.shared.clone();
        self.executor.submit(move || {
            shared.counters.hit(segment_id);
        });

        passes
    }

    /// Observe a written key: feeds the sampling pool until the key-range
    /// partition freezes, afterwards counts toward range hit counts
    pub fn put_key_observed(&self, key: &[u8]) {
        let shared = self.shared.clone();
        let key = key.to_vec();
        self.executor.submit(move || {
            if !shared.heat.is_ready() {
                shared.heat.offer(&key);
            } else {
                shared.heat.hit(&key, false);
            }
        });
    }

    /// Observe a read key: drives hotness and period accounting, and at
    /// period boundaries the counter rollovers and the retrain signal
    pub fn get_key_observed(&self, key: &[u8]) {
        let shared = self.shared.clone();
        let key = key.to_vec();
        self.executor.submit(move || {
            shared.on_read(&key);
        });
    }

    /// Record the key span of a live segment, sharpening the key-range
    /// partition chosen at freeze time. Optional; ignored once frozen.
    pub fn record_segment_bounds(&self, segment_id: SegmentId, min: Vec<u8>, max: Vec<u8>) {
        self.shared.heat.record_span(segment_id, KeySpan::new(min, max));
    }

    /// Compaction hook: replace `merged` segments with `new` ones.
    ///
    /// Visit counts inherit along the weight matrix; new level-0 segments
    /// are pinned at full units, other new segments get a prediction (or
    /// the default before readiness) and enter the twin heaps. Returns
    /// immediately; the reshape runs on the background pool.
    pub fn insert_segments(
        &self,
        merged: Vec<SegmentId>,
        new: Vec<SegmentId>,
        weights: BTreeMap<SegmentId, HashMap<SegmentId, f64>>,
        levels: BTreeMap<SegmentId, Level>,
        level0_base: u32,
        ranges: BTreeMap<SegmentId, Vec<RangeRatePair>>,
    ) {
        let shared = self.shared.clone();
        self.executor.submit(move || {
            shared.do_insert_segments(&merged, &new, &weights, &levels, level0_base, &ranges);
        });
    }

    /// Compaction hook: drop segments entirely
    pub fn delete_segments(&self, segment_ids: Vec<SegmentId>) {
        let shared = self.shared.clone();
        self.executor.submit(move || {
            shared.do_delete_segments(&segment_ids);
        });
    }

    /// Trivial-move hook: segments change level without rewriting.
    ///
    /// Counts decay by the inherit factor and allocation is re-derived at
    /// the new level. Moving into level 0 is not a trivial move and is
    /// rejected synchronously.
    pub fn move_segments(
        &self,
        segment_ids: Vec<SegmentId>,
        new_levels: BTreeMap<SegmentId, Level>,
        ranges: BTreeMap<SegmentId, Vec<RangeRatePair>>,
    ) -> Result<()> {
        for sid in &segment_ids {
            match new_levels.get(sid) {
                Some(&level) if level > 0 => {}
                Some(_) => {
                    return Err(Error::invalid_input(format!(
                        "segment {} cannot move into level 0",
                        sid
                    )))
                }
                None => {
                    return Err(Error::invalid_input(format!(
                        "segment {} has no target level",
                        sid
                    )))
                }
            }
        }

        let shared = self.shared.clone();
        self.executor.submit(move || {
            shared.do_move_segments(&segment_ids, &new_levels, &ranges);
        });
        Ok(())
    }

    /// Kick the retrain pipeline if a long period ended since the last run.
    ///
    /// Runs on the background pool; rollover boundaries also submit this
    /// automatically, so hosts only call it to force an early refresh.
    pub fn try_retrain_and_refresh(&self) {
        let shared = self.shared.clone();
        self.executor.submit(move || {
            shared.do_retrain_and_refresh();
        });
    }

    /// One adjustment step: pop the twin-heap tops and, if profitable,
    /// swap one unit between the two segments. `false` while the cache is
    /// not ready/full or no swap pays.
    pub fn adjust_once(&self) -> bool {
        self.shared.adjust_once()
    }

    /// Start the continuous adjustment loop on its own thread
    pub fn start_adjuster(&self) {
        let mut slot = self.adjuster.lock();
        if slot.is_some() {
            return;
        }
        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name("fc-adjuster".to_string())
            .spawn(move || {
                while !shared.stop.load(Ordering::Acquire) {
                    if !shared.adjust_once() {
                        std::thread::park_timeout(ADJUSTER_IDLE);
                    }
                }
            })
            .expect("failed to spawn adjuster thread");
        *slot = Some(handle);
    }

    /// Stop the adjuster and drain queued background work
    pub fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = self.adjuster.lock().take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
        self.executor.wait_idle();
    }

    /// Whether the readiness latch is set
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// Total reads observed so far
    pub fn observed_reads(&self) -> u64 {
        self.shared.reads.load(Ordering::Acquire)
    }

    /// Completed short periods
    pub fn short_periods_elapsed(&self) -> u64 {
        self.observed_reads() / self.shared.cfg.periods.period_count
    }

    /// The filter cache map (probe state and accounting)
    pub fn map(&self) -> &FilterCacheMap {
        &self.shared.map
    }

    /// The twin heaps
    pub fn heaps(&self) -> &TwinHeaps {
        &self.shared.heaps
    }

    /// The visit counters
    pub fn counters(&self) -> &VisitCounters {
        &self.shared.counters
    }

    /// The hotness estimator
    pub fn heat_buckets(&self) -> &HeatBuckets {
        &self.shared.heat
    }

    /// Block until all background work queued so far has completed.
    ///
    /// Compaction hooks and observations return before their effects are
    /// applied; this barrier makes them visible, mainly for tests and
    /// orderly shutdown.
    pub fn wait_for_background(&self) {
        self.executor.wait_idle();
    }
}

impl Drop for AllocationEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl EngineShared {
    /// Fraction of the current long period already elapsed
    fn long_progress(&self) -> f64 {
        let long_total = self.cfg.periods.period_count * self.cfg.periods.train_periods;
        let n = self.reads.load(Ordering::Acquire);
        (n % long_total) as f64 / long_total as f64
    }

    fn on_read(&self, key: &[u8]) {
        let n = self.reads.fetch_add(1, Ordering::AcqRel) + 1;
        let short_boundary = n % self.cfg.periods.period_count == 0;
        self.heat.hit(key, short_boundary);
        if short_boundary {
            self.on_short_boundary(n);
        }
    }

    fn on_short_boundary(&self, n: u64) {
        let _guard = self.update_mutex.lock();
        let metrics = Metrics::global();
        metrics.allocation.short_rollovers.inc();

        // before readiness there are no heap nodes to re-key
        if self.ready.load(Ordering::Acquire) {
            let long_total = self.cfg.periods.period_count * self.cfg.periods.train_periods;
            let in_long = (n - 1) % long_total + 1;
            let progress = in_long as f64 / long_total as f64;
            let estimates = self.counters.estimate_for_all(progress);
            self.heaps.sync_visit_cnt(&estimates);
        }

        let periods = n / self.cfg.periods.period_count;
        if periods % self.cfg.periods.train_periods == 0 {
            metrics.allocation.long_rollovers.inc();
            self.counters.rollover();
            self.train_signal.store(true, Ordering::Release);
            tracing::debug!(reads = n, "long period boundary, retrain signalled");
            self.do_retrain_and_refresh();
        }
    }

    fn do_insert_segments(
        &self,
        merged: &[SegmentId],
        new: &[SegmentId],
        weights: &BTreeMap<SegmentId, HashMap<SegmentId, f64>>,
        levels: &BTreeMap<SegmentId, Level>,
        level0_base: u32,
        ranges: &BTreeMap<SegmentId, Vec<RangeRatePair>>,
    ) {
        for sid in new {
            if !levels.contains_key(sid) {
                tracing::warn!(segment = sid, "insert without level, batch dropped");
                return;
            }
        }

        let level0_base = if level0_base == 0 {
            self.cfg.counters.level0_seed_count
        } else {
            level0_base
        };
        self.counters
            .inherit(merged, new, weights, self.cfg.counters.inherit_remain_factor, level0_base);

        // drop the merged segments everywhere
        let old_level0: HashSet<SegmentId> = {
            let mut recorders = self.recorders.lock();
            let set = merged
                .iter()
                .filter(|sid| recorders.levels.get(*sid) == Some(&0))
                .copied()
                .collect();
            for sid in merged {
                recorders.levels.remove(sid);
                recorders.ranges.remove(sid);
            }
            set
        };
        self.heaps.delete_batch(merged);
        self.map.release_batch(merged, &old_level0);
        self.heat.remove_spans(merged);

        let (level0_new, rest): (Vec<SegmentId>, Vec<SegmentId>) =
            new.iter().copied().partition(|sid| levels[sid] == 0);

        // level-0 segments always hold every unit and stay out of the heaps
        if !level0_new.is_empty() {
            let level0_set: HashSet<SegmentId> = level0_new.iter().copied().collect();
            let targets: Vec<(SegmentId, UnitCount)> = level0_new
                .iter()
                .map(|&sid| (sid, self.cfg.cache.max_units))
                .collect();
            let failed = self.map.enable_batch(&targets, false, &level0_set);
            debug_assert!(failed.is_empty(), "level-0 admission must not fail");
        }

        if !rest.is_empty() {
            self.admit_predicted(&rest, levels, ranges);
        }

        {
            let mut recorders = self.recorders.lock();
            for sid in new {
                recorders.levels.insert(*sid, levels[sid]);
                if let Some(pairs) = ranges.get(sid) {
                    recorders.ranges.insert(*sid, pairs.clone());
                }
            }
        }

        self.update_readiness();
    }

    /// Enable units for new non-level-0 segments and mirror them into the
    /// twin heaps. Budget-refused segments are created at zero units so the
    /// adjuster can grow them later.
    fn admit_predicted(
        &self,
        segment_ids: &[SegmentId],
        levels: &BTreeMap<SegmentId, Level>,
        ranges: &BTreeMap<SegmentId, Vec<RangeRatePair>>,
    ) {
        let engine_ready = self.ready.load(Ordering::Acquire);
        let (labels, limits) = if engine_ready && self.classifier.is_ready() {
            let rows = self.build_feature_rows(segment_ids, levels, ranges);
            match self.classifier.predict_batch(&rows) {
                Ok(labels) => {
                    let limits = labels.clone();
                    (labels, limits)
                }
                Err(e) => {
                    tracing::warn!("prediction failed ({}), using defaults", e);
                    Metrics::global().allocation.predict_fallbacks.inc();
                    (
                        vec![self.cfg.cache.default_units; segment_ids.len()],
                        vec![self.cfg.cache.max_units; segment_ids.len()],
                    )
                }
            }
        } else {
            // cold engine: defaults, unlimited until a prediction exists
            (
                vec![self.cfg.cache.default_units; segment_ids.len()],
                vec![self.cfg.cache.max_units; segment_ids.len()],
            )
        };

        let targets: Vec<(SegmentId, UnitCount)> = segment_ids
            .iter()
            .zip(labels.iter())
            .map(|(&sid, &label)| (sid, label))
            .collect();
        let failed = self.map.enable_batch(&targets, false, &HashSet::new());
        let failed_set: HashSet<SegmentId> = failed.iter().copied().collect();
        if !failed.is_empty() {
            // keep refused segments present at zero units; they degrade to
            // no filtering but stay adjustable
            let zero_targets: Vec<(SegmentId, UnitCount)> =
                failed.iter().map(|&sid| (sid, 0)).collect();
            self.map.enable_batch(&zero_targets, true, &HashSet::new());
        }

        let estimates = self.counters.estimate_for_all(self.long_progress());
        let items: Vec<HeapItem> = segment_ids
            .iter()
            .enumerate()
            .map(|(idx, &sid)| HeapItem {
                segment_id: sid,
                approx_visit_cnt: estimates.get(&sid).copied().unwrap_or(0),
                current_units: if failed_set.contains(&sid) {
                    0
                } else {
                    labels[idx]
                },
                units_limit: limits[idx],
            })
            .collect();
        if let Err(e) = self.heaps.upsert_batch(&items) {
            tracing::error!("heap upsert rejected engine-built items: {}", e);
        }
    }

    fn do_delete_segments(&self, segment_ids: &[SegmentId]) {
        let old_level0: HashSet<SegmentId> = {
            let mut recorders = self.recorders.lock();
            let set = segment_ids
                .iter()
                .filter(|sid| recorders.levels.get(*sid) == Some(&0))
                .copied()
                .collect();
            for sid in segment_ids {
                recorders.levels.remove(sid);
                recorders.ranges.remove(sid);
            }
            set
        };

        self.heaps.delete_batch(segment_ids);
        self.map.release_batch(segment_ids, &old_level0);
        self.counters.remove(segment_ids);
        self.heat.remove_spans(segment_ids);
        // readiness is monotonic: shrinking usage does not clear the latch
    }

    fn do_move_segments(
        &self,
        segment_ids: &[SegmentId],
        new_levels: &BTreeMap<SegmentId, Level>,
        ranges: &BTreeMap<SegmentId, Vec<RangeRatePair>>,
    ) {
        let old_level0: HashSet<SegmentId> = {
            let recorders = self.recorders.lock();
            segment_ids
                .iter()
                .filter(|sid| recorders.levels.get(*sid) == Some(&0))
                .copied()
                .collect()
        };

        self.heaps.delete_batch(segment_ids);
        self.map.release_batch(segment_ids, &old_level0);
        self.counters
            .decay(segment_ids, self.cfg.counters.inherit_remain_factor);

        self.admit_predicted(segment_ids, new_levels, ranges);

        let mut recorders = self.recorders.lock();
        for sid in segment_ids {
            recorders.levels.insert(*sid, new_levels[sid]);
            if let Some(pairs) = ranges.get(sid) {
                recorders.ranges.insert(*sid, pairs.clone());
            }
        }
    }

    /// Long-period pipeline: solver labels → train request → fresh
    /// predictions → heap/map re-limit. All failures degrade, none escape.
    fn do_retrain_and_refresh(&self) {
        if !self.train_signal.swap(false, Ordering::AcqRel) {
            return;
        }

        let (levels, ranges) = {
            let recorders = self.recorders.lock();
            (recorders.levels.clone(), recorders.ranges.clone())
        };
        let segment_ids: Vec<SegmentId> = levels
            .iter()
            .filter(|(sid, level)| **level > 0 && ranges.contains_key(*sid))
            .map(|(&sid, _)| sid)
            .collect();

        if !self.classifier.is_ready() {
            let widths: Vec<u16> = segment_ids
                .iter()
                .map(|sid| 1 + 2 * ranges[sid].len() as u16)
                .collect();
            self.classifier.make_ready(&widths);
        }

        if segment_ids.is_empty() {
            // nothing to label yet; let the service bootstrap on synthetic
            // data so early predictions have a model behind them
            match self.classifier.train(&[], &[], &[]) {
                Ok(()) => self.replay_bootstrap_dataset(),
                Err(e) => tracing::warn!("bootstrap train dropped: {}", e),
            }
            return;
        }

        let last_counts = self.counters.last_counts();
        let infos: BTreeMap<SegmentId, crate::alloc::SegmentAllocInfo> = segment_ids
            .iter()
            .map(|&sid| {
                (
                    sid,
                    crate::alloc::SegmentAllocInfo::new(
                        last_counts.get(&sid).copied().unwrap_or(0),
                        self.cfg.cache.default_unit_size_bits,
                    ),
                )
            })
            .collect();

        let solver = crate::alloc::GreedySolver::new(
            self.cfg.cache.max_units,
            self.cfg.cache.bits_per_key_per_unit,
        );
        let solution = solver.solve(&infos, self.map.non_level0_capacity());

        let rows = self.build_feature_rows(&segment_ids, &levels, &ranges);
        let labels: Vec<UnitCount> = segment_ids.iter().map(|sid| solution[sid]).collect();
        let weights: Vec<u32> = segment_ids
            .iter()
            .map(|sid| last_counts.get(sid).copied().unwrap_or(0))
            .collect();

        match self.classifier.train(&rows, &labels, &weights) {
            Ok(()) => Metrics::global().allocation.train_rounds.inc(),
            // dropped silently; the next long period retries
            Err(e) => tracing::warn!("train request dropped: {}", e),
        }

        let predictions = match self.classifier.predict_batch(&rows) {
            Ok(predictions) => predictions,
            Err(e) => {
                tracing::warn!("refresh prediction failed ({}), using defaults", e);
                Metrics::global().allocation.predict_fallbacks.inc();
                vec![self.cfg.cache.default_units; segment_ids.len()]
            }
        };

        let limits: BTreeMap<SegmentId, UnitCount> = segment_ids
            .iter()
            .zip(predictions.iter())
            .map(|(&sid, &label)| (sid, label))
            .collect();
        let clamped = self.heaps.sync_units_num_limit(&limits);
        if !clamped.is_empty() {
            self.map.update_batch(&clamped, true, &HashSet::new());
        }
        tracing::info!(
            segments = segment_ids.len(),
            clamped = clamped.len(),
            "allocation reference refreshed"
        );
    }

    /// Read the just-written synthetic dataset back and replay it through
    /// prediction, exercising the service end to end before real segments
    /// exist. Malformed rows surface as an empty batch and nothing is
    /// predicted; labels are discarded since no segment is behind them.
    fn replay_bootstrap_dataset(&self) {
        let width = self
            .classifier
            .feature_num()
            .unwrap_or(crate::core::constants::FALLBACK_FEATURES_NUM);
        let rows =
            crate::classifier::dataset::read_feature_rows(&self.classifier.dataset_path(), width);
        if rows.is_empty() {
            return;
        }
        match self.classifier.predict_batch(&rows) {
            Ok(labels) => tracing::debug!(rows = labels.len(), "bootstrap dataset replayed"),
            Err(e) => {
                tracing::warn!("bootstrap replay prediction failed: {}", e);
                Metrics::global().allocation.predict_fallbacks.inc();
            }
        }
    }

    /// Assemble one classifier feature row per segment: the level, then
    /// `(rate, hotness)` pairs sorted by rate descending, scaled to
    /// integers.
    fn build_feature_rows(
        &self,
        segment_ids: &[SegmentId],
        levels: &BTreeMap<SegmentId, Level>,
        ranges: &BTreeMap<SegmentId, Vec<RangeRatePair>>,
    ) -> Vec<FeatureRow> {
        use crate::core::constants::{
            HOTNESS_SIGNIFICANT_DIGITS_FACTOR, RATE_SIGNIFICANT_DIGITS_FACTOR,
        };

        segment_ids
            .iter()
            .map(|sid| {
                let mut pairs: Vec<&RangeRatePair> =
                    ranges.get(sid).map(|v| v.iter().collect()).unwrap_or_default();
                pairs.sort_by(|a, b| b.rate.total_cmp(&a.rate));

                let mut row: FeatureRow = Vec::with_capacity(1 + 2 * pairs.len());
                row.push(levels.get(sid).copied().unwrap_or(0));
                for pair in pairs {
                    row.push((pair.rate * RATE_SIGNIFICANT_DIGITS_FACTOR) as u32);
                    row.push(
                        (self.heat.hotness_of(pair.range) * HOTNESS_SIGNIFICANT_DIGITS_FACTOR)
                            as u32,
                    );
                }
                row
            })
            .collect()
    }

    fn adjust_once(&self) -> bool {
        if !self.ready.load(Ordering::Acquire) || !self.map.is_full() {
            return false;
        }

        let swap = match self.heaps.try_modify() {
            Some(swap) => swap,
            None => return false,
        };

        // shrink before grow so the budget never overshoots in between
        self.map.update_batch(
            &[
                (swap.loss_segment_id, swap.loss_new_units),
                (swap.gain_segment_id, swap.gain_new_units),
            ],
            true,
            &HashSet::new(),
        );
        Metrics::global().allocation.unit_swaps.inc();
        tracing::debug!(
            gain = swap.gain_segment_id,
            loss = swap.loss_segment_id,
            benefit = swap.benefit,
            cost = swap.cost,
            "unit swap applied"
        );
        true
    }

    fn update_readiness(&self) {
        if !self.ready.load(Ordering::Acquire) && self.map.is_ready() {
            self.ready.store(true, Ordering::Release);
            tracing::info!(
                used_bits = self.map.used_bits(),
                "filter cache reached ready rate, adaptive allocation active"
            );
        }
    }
}
