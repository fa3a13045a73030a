//! Configuration management for the filter cache engine
//!
//! The hosting process constructs a [`Config`] at startup (file, environment
//! or defaults) and hands it to the engine; nothing here is re-read after
//! construction. Defaults mirror [`crate::core::constants`].

use crate::core::constants::*;
use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache capacity and unit sizing
    pub cache: CacheConfig,

    /// Short/long period accounting
    pub periods: PeriodConfig,

    /// Workload sampling and hotness estimation
    pub sampling: SamplingConfig,

    /// Visit counter inheritance
    pub counters: CounterConfig,

    /// Classifier service connection
    pub classifier: ClassifierConfig,

    /// Background worker pool
    pub executor: ExecutorConfig,
}

/// Cache capacity and unit sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total cache capacity in bits
    pub space_bits: u64,

    /// Utilization ratio treated as full; non-forced admission stops here
    pub full_rate: f64,

    /// Utilization ratio that latches the engine ready
    pub ready_rate: f64,

    /// Bits per key for one filter unit
    pub bits_per_key_per_unit: u32,

    /// Lower bound on enabled units per segment
    pub min_units: u16,

    /// Number of units generated per segment (upper bound on enabled)
    pub max_units: u16,

    /// Units enabled before a prediction exists for a segment
    pub default_units: u16,

    /// Per-unit size in bits assumed by the offline solver
    pub default_unit_size_bits: u64,

    /// Minimum visit-count drift before heap nodes are re-keyed
    pub visit_cnt_update_bound: u32,
}

/// Short/long period accounting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodConfig {
    /// Observed reads per short period
    pub period_count: u64,

    /// Short periods per long period
    pub train_periods: u64,

    /// Divisor of `period_count` giving the rollover guard re-arm window
    pub magic_factor: u64,
}

/// Workload sampling and hotness estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Reservoir capacity (distinct keys)
    pub samples_limit: usize,

    /// Offered samples before the pool freezes
    pub samples_maxcnt: u64,

    /// Range count when no segment spans are known at freeze time
    pub default_buckets: usize,

    /// EWMA decay factor for bucket hotness
    pub alpha: f64,
}

/// Visit counter inheritance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Fraction of a merged segment's count inherited by successors
    pub inherit_remain_factor: f64,

    /// Seed count for level-0 segments when the caller passes zero
    pub level0_seed_count: u32,
}

/// Classifier service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Service host
    pub host: String,

    /// Service port
    pub port: u16,

    /// Maximum wire message size in bytes
    pub buffer_size: usize,

    /// Directory the training dataset is written to
    pub dataset_dir: PathBuf,

    /// Training dataset file name
    pub dataset_name: String,

    /// Upper bound on feature width
    pub max_features: u16,
}

/// Background worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Number of worker threads (0 = auto-detect)
    pub worker_threads: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            space_bits: CACHE_SPACE_SIZE,
            full_rate: FULL_RATE,
            ready_rate: READY_RATE,
            bits_per_key_per_unit: BITS_PER_KEY_PER_UNIT,
            min_units: MIN_UNITS_NUM,
            max_units: MAX_UNITS_NUM,
            default_units: DEFAULT_UNITS_NUM,
            default_unit_size_bits: DEFAULT_UNIT_SIZE_BITS,
            visit_cnt_update_bound: VISIT_CNT_UPDATE_BOUND,
        }
    }
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            period_count: PERIOD_COUNT,
            train_periods: TRAIN_PERIODS,
            magic_factor: MAGIC_FACTOR,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            samples_limit: SAMPLES_LIMIT,
            samples_maxcnt: SAMPLES_MAXCNT,
            default_buckets: DEFAULT_BUCKETS_NUM,
            alpha: BUCKETS_ALPHA,
        }
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            inherit_remain_factor: INHERIT_REMAIN_FACTOR,
            level0_seed_count: INIT_LEVEL_0_COUNT,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            buffer_size: BUFFER_SIZE,
            dataset_dir: PathBuf::from(DEFAULT_DATASET_DIR),
            dataset_name: DATASET_NAME.to_string(),
            max_features: MAX_FEATURES_NUM,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: FILTER_CACHE_THREADS_NUM,
        }
    }
}

impl Config {
    /// Load configuration from a file and environment, falling back to
    /// defaults when neither is present
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Config::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        use std::env;

        if let Ok(bits) = env::var("FC_CACHE_SPACE_BITS") {
            self.cache.space_bits = bits
                .parse()
                .map_err(|e| Error::config(format!("Invalid cache space: {}", e)))?;
        }

        if let Ok(host) = env::var("FC_CLASSIFIER_HOST") {
            self.classifier.host = host;
        }

        if let Ok(port) = env::var("FC_CLASSIFIER_PORT") {
            self.classifier.port = port
                .parse()
                .map_err(|e| Error::config(format!("Invalid classifier port: {}", e)))?;
        }

        if let Ok(dir) = env::var("FC_DATASET_DIR") {
            self.classifier.dataset_dir = PathBuf::from(dir);
        }

        if let Ok(workers) = env::var("FC_WORKER_THREADS") {
            self.executor.worker_threads = workers
                .parse()
                .map_err(|e| Error::config(format!("Invalid worker threads: {}", e)))?;
        }

        Ok(())
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<()> {
        if self.cache.space_bits == 0 {
            return Err(Error::config("cache space must be non-zero"));
        }
        if !(0.0 < self.cache.full_rate && self.cache.full_rate <= 1.0) {
            return Err(Error::config("full_rate must be in (0, 1]"));
        }
        if !(0.0 < self.cache.ready_rate && self.cache.ready_rate <= self.cache.full_rate) {
            return Err(Error::config("ready_rate must be in (0, full_rate]"));
        }
        if self.cache.min_units > self.cache.max_units {
            return Err(Error::config("min_units must not exceed max_units"));
        }
        if self.cache.default_units > self.cache.max_units {
            return Err(Error::config("default_units must not exceed max_units"));
        }
        if self.periods.period_count == 0 || self.periods.train_periods == 0 {
            return Err(Error::config("period counts must be non-zero"));
        }
        if self.periods.magic_factor == 0 {
            return Err(Error::config("magic_factor must be non-zero"));
        }
        if !(0.0 < self.counters.inherit_remain_factor
            && self.counters.inherit_remain_factor <= 1.0)
        {
            return Err(Error::config("inherit_remain_factor must be in (0, 1]"));
        }
        if self.sampling.samples_limit == 0 || self.sampling.default_buckets == 0 {
            return Err(Error::config("sampling sizes must be non-zero"));
        }
        if self.classifier.max_features < 3 {
            return Err(Error::config(
                "max_features must cover a level and one range pair",
            ));
        }
        Ok(())
    }
}

/// Load configuration from an optional path, using defaults on failure
pub fn load_config_or_default(path: Option<&str>) -> Config {
    match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load config ({}), using defaults", e);
            Config::default()
        }
    }
}
