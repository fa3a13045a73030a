//! Global constants used throughout the filter cache engine
//!
//! This module contains compile-time defaults that are shared across
//! multiple modules to ensure consistency and avoid magic numbers. The
//! tunable subset is mirrored in [`crate::core::config`]; constants here
//! are the canonical default values.

/// EWMA decay factor applied to a bucket's hotness at every short-period
/// rollover: `h ← BUCKETS_ALPHA × h + hit_cnt / PERIOD_COUNT`.
pub const BUCKETS_ALPHA: f64 = 0.2;

/// Maximum number of distinct keys held in the reservoir-sampling pool.
pub const SAMPLES_LIMIT: usize = 10_000;

/// Number of offered samples after which the pool freezes and the key-range
/// separators become immutable.
pub const SAMPLES_MAXCNT: u64 = 5_000_000;

/// Observed reads per short period.
pub const PERIOD_COUNT: u64 = 50_000;

/// Short periods per long period; a long-period boundary triggers counter
/// rollover and classifier retraining.
pub const TRAIN_PERIODS: u64 = 10;

/// Key-range count used when no segment key spans are known at freeze time.
pub const DEFAULT_BUCKETS_NUM: usize = 500;

/// Divisor of `PERIOD_COUNT` defining the re-arm window of the rollover
/// guard: once the read counter advances `PERIOD_COUNT / MAGIC_FACTOR` past
/// a rollover, the guard resets and the next rollover may fire.
pub const MAGIC_FACTOR: u64 = 500;

/// Bits per key for every filter unit of every segment.
///
/// The default total of `DEFAULT_UNITS_NUM × BITS_PER_KEY_PER_UNIT = 8`
/// bits per key matches common Bloom-filter benchmark configurations.
pub const BITS_PER_KEY_PER_UNIT: u32 = 4;

/// Coldest segments may have every unit disabled.
pub const MIN_UNITS_NUM: u16 = 0;

/// Number of filter units generated for every segment; the enabled prefix
/// never exceeds this.
pub const MAX_UNITS_NUM: u16 = 6;

/// Units enabled for a segment before the classifier has produced a
/// prediction for it.
pub const DEFAULT_UNITS_NUM: u16 = 2;

/// Total filter cache capacity in bits (128 MiB).
pub const CACHE_SPACE_SIZE: u64 = 1_073_741_824;

/// Utilization ratio above which the cache is considered full and
/// non-forced, non-level-0 admissions are refused.
pub const FULL_RATE: f64 = 0.98;

/// Utilization ratio above which the engine latches ready and twin-heap
/// adjustment takes over from defaults.
pub const READY_RATE: f64 = 0.70;

/// Minimum absolute visit-count drift before a heap node is re-keyed.
pub const VISIT_CNT_UPDATE_BOUND: u32 = 10;

/// Hotness values are doubles; the wire format carries integers, so the
/// engine sends `u32(hotness × HOTNESS_SIGNIFICANT_DIGITS_FACTOR)`.
pub const HOTNESS_SIGNIFICANT_DIGITS_FACTOR: f64 = 1e6;

/// Same treatment for a key range's share of a segment's keys.
pub const RATE_SIGNIFICANT_DIGITS_FACTOR: f64 = 1e3;

/// Upper bound on classifier feature width, chosen so that one predict
/// request always fits the receive buffer: 3 × 30 + 1.
pub const MAX_FEATURES_NUM: u16 = 91;

/// Fallback feature width when the engine reaches readiness with no
/// segments to measure (matches the bootstrap dataset shape).
pub const FALLBACK_FEATURES_NUM: u16 = 41;

/// Background worker threads serving deferred engine work.
pub const FILTER_CACHE_THREADS_NUM: usize = 10;

/// Fraction of a merged-away segment's visit count inherited by its
/// successors.
pub const INHERIT_REMAIN_FACTOR: f64 = 0.8;

/// Visit count seeded for a freshly flushed level-0 segment absent from the
/// inheritance weight matrix, when the caller does not supply one.
pub const INIT_LEVEL_0_COUNT: u32 = 10_000;

/// Bits occupied by one filter unit when the hosting engine supplies no
/// per-segment unit size (2 KiB).
pub const DEFAULT_UNIT_SIZE_BITS: u64 = 16_384;

/// Classifier service host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Classifier service port.
pub const DEFAULT_PORT: u16 = 9090;

/// Maximum size of one wire message in either direction.
pub const BUFFER_SIZE: usize = 1024;

/// Training dataset file name under the dataset directory.
pub const DATASET_NAME: &str = "dataset.csv";

/// Directory the training dataset is written to; the classifier service
/// reads it from the same path.
pub const DEFAULT_DATASET_DIR: &str = "/tmp/filter-cache";
