//! Scenario tests exercising the engine end to end
//!
//! The filter-unit source and the classifier service are replaced by test
//! doubles; everything else is the real machinery. Background effects are
//! made visible with `wait_for_background`.

use super::*;
use crate::cache::unit::testing::SetUnitSource;
use crate::core::config::Config;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::mpsc;

const UNIT_BITS: u64 = 1000;

/// Minimal classifier service double: records every request line, answers
/// predicts with a fixed class.
fn spawn_mock_service(reply: &'static str) -> (u16, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = match stream {
                Ok(s) => s,
                Err(_) => break,
            };
            let tx = tx.clone();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            std::thread::spawn(move || {
                let mut line = String::new();
                while let Ok(n) = reader.read_line(&mut line) {
                    if n == 0 {
                        break;
                    }
                    let _ = tx.send(line.trim().to_string());
                    if line.starts_with('p') && stream.write_all(reply.as_bytes()).is_err() {
                        break;
                    }
                    line.clear();
                }
            });
        }
    });

    (port, rx)
}

fn test_config(cache_bits: u64, period_count: u64) -> Config {
    let mut cfg = Config::default();
    cfg.cache.space_bits = cache_bits;
    cfg.periods.period_count = period_count;
    cfg.periods.train_periods = 10;
    cfg.periods.magic_factor = period_count.min(10);
    cfg.executor.worker_threads = 2;
    // nothing listens here; classifier calls fail fast and fall back
    cfg.classifier.port = 1;
    cfg.classifier.dataset_dir = std::env::temp_dir().join("filter-cache-engine-tests");
    cfg.counters.level0_seed_count = 1;
    cfg
}

fn test_engine(cache_bits: u64, period_count: u64) -> AllocationEngine {
    let source = Arc::new(
        SetUnitSource::new(UNIT_BITS, 6).with_keys(vec![b"present".to_vec()]),
    );
    AllocationEngine::new(test_config(cache_bits, period_count), source).unwrap()
}

fn insert_cold(
    engine: &AllocationEngine,
    segment_ids: &[SegmentId],
    level: Level,
) {
    let levels: BTreeMap<SegmentId, Level> =
        segment_ids.iter().map(|&sid| (sid, level)).collect();
    let ranges: BTreeMap<SegmentId, Vec<RangeRatePair>> = segment_ids
        .iter()
        .map(|&sid| (sid, vec![RangeRatePair::new(0, 1.0)]))
        .collect();
    engine.insert_segments(
        Vec::new(),
        segment_ids.to_vec(),
        BTreeMap::new(),
        levels,
        0,
        ranges,
    );
}

#[test]
fn test_cold_segments_get_default_units() {
    // two cold segments before readiness both land at the default
    let engine = test_engine(1_000_000, 100);
    insert_cold(&engine, &[1, 2], 1);
    engine.wait_for_background();

    assert_eq!(engine.map().enabled_units(1), Some(2));
    assert_eq!(engine.map().enabled_units(2), Some(2));
    assert_eq!(engine.map().used_bits(), 4_000);
    assert!(!engine.is_ready());

    // both segments entered the twin heaps alongside the map
    assert!(engine.heaps().contains(1));
    assert!(engine.heaps().contains(2));

    // counters gained entries for the new segments
    let current = engine.counters().current_counts();
    assert!(current.contains_key(&1));
    assert!(current.contains_key(&2));
}

#[test]
fn test_unknown_segment_probes_true() {
    let engine = test_engine(1_000_000, 100);
    assert!(engine.check_key(404, b"anything"));

    insert_cold(&engine, &[1], 1);
    engine.wait_for_background();
    // enabled units filter out absent keys, pass present ones
    assert!(engine.check_key(1, b"present"));
    assert!(!engine.check_key(1, b"absent"));
}

#[test]
fn test_check_key_defers_visit_counting() {
    let engine = test_engine(1_000_000, 100);
    insert_cold(&engine, &[7], 1);
    engine.wait_for_background();

    let seed = engine.counters().current_counts()[&7];
    for _ in 0..5 {
        engine.check_key(7, b"present");
    }
    engine.wait_for_background();
    assert_eq!(engine.counters().current_counts()[&7], seed + 5);
}

#[test]
fn test_level0_admitted_when_nearly_full() {
    // cache at 97% usage: a level-0 segment still lands at full units
    let engine = test_engine(1_000_000, 100);
    let bulk: Vec<SegmentId> = (1..=485).collect();
    insert_cold(&engine, &bulk, 1);
    engine.wait_for_background();
    assert_eq!(engine.map().used_bits(), 970_000);
    assert!(engine.is_ready());

    insert_cold(&engine, &[9000], 0);
    engine.wait_for_background();

    assert_eq!(engine.map().enabled_units(9000), Some(6));
    assert_eq!(engine.map().used_bits(), 976_000);
    assert_eq!(engine.map().level0_used_bits(), 6_000);
    // level-0 segments stay out of the twin heaps
    assert!(!engine.heaps().contains(9000));
}

#[test]
fn test_insert_then_delete_roundtrip() {
    let engine = test_engine(1_000_000, 100);
    insert_cold(&engine, &[1, 2, 3], 1);
    engine.wait_for_background();
    assert_eq!(engine.map().len(), 3);
    assert_eq!(engine.heaps().len(), 3);

    engine.delete_segments(vec![1, 2, 3]);
    engine.wait_for_background();

    assert!(engine.map().is_empty());
    assert!(engine.heaps().is_empty());
    assert_eq!(engine.map().used_bits(), 0);
    assert!(engine.counters().current_counts().is_empty());
}

#[test]
fn test_compaction_inherits_counts() {
    // 80 and 60 visits merge with equal weights through the façade
    let engine = test_engine(1_000_000, 100);
    insert_cold(&engine, &[1, 2], 1);
    engine.wait_for_background();

    // counters were seeded at 1 each; add the visits
    for _ in 0..79 {
        engine.check_key(1, b"present");
    }
    for _ in 0..59 {
        engine.check_key(2, b"present");
    }
    engine.wait_for_background();

    let weights = BTreeMap::from([(10, HashMap::from([(1, 0.5), (2, 0.5)]))]);
    let levels = BTreeMap::from([(10, 1)]);
    let ranges = BTreeMap::from([(10, vec![RangeRatePair::new(0, 1.0)])]);
    engine.insert_segments(vec![1, 2], vec![10], weights, levels, 0, ranges);
    engine.wait_for_background();

    // 0.8 × (0.5×80 + 0.5×60) = 56
    assert_eq!(engine.counters().current_counts()[&10], 56);
    assert!(!engine.counters().current_counts().contains_key(&1));
    assert!(!engine.map().contains(1));
    assert!(!engine.heaps().contains(1));
    assert!(engine.map().contains(10));
}

#[test]
fn test_move_segments_decays_and_reinserts() {
    let engine = test_engine(1_000_000, 100);
    insert_cold(&engine, &[5], 1);
    engine.wait_for_background();
    for _ in 0..99 {
        engine.check_key(5, b"present");
    }
    engine.wait_for_background();
    assert_eq!(engine.counters().current_counts()[&5], 100);

    let levels = BTreeMap::from([(5, 2)]);
    let ranges = BTreeMap::from([(5, vec![RangeRatePair::new(0, 1.0)])]);
    engine
        .move_segments(vec![5], levels, ranges)
        .unwrap();
    engine.wait_for_background();

    assert_eq!(engine.counters().current_counts()[&5], 80);
    assert_eq!(engine.map().enabled_units(5), Some(2));
    assert!(engine.heaps().contains(5));
}

#[test]
fn test_move_into_level0_rejected() {
    let engine = test_engine(1_000_000, 100);
    let err = engine.move_segments(vec![5], BTreeMap::from([(5, 0)]), BTreeMap::new());
    assert!(err.is_err());
    let err = engine.move_segments(vec![5], BTreeMap::new(), BTreeMap::new());
    assert!(err.is_err());
}

#[test]
fn test_short_periods_elapse_without_long_rollover() {
    // two full short periods plus one read, long period still far away
    let engine = test_engine(1_000_000, 100);
    insert_cold(&engine, &[1], 1);
    engine.wait_for_background();
    let heap_visit_at_insert = engine.heaps().segment_state(1).unwrap().2;
    engine.check_key(1, b"present");
    engine.wait_for_background();
    let current_before = engine.counters().current_counts()[&1];

    for _ in 0..201 {
        engine.get_key_observed(b"some-key");
    }
    engine.wait_for_background();

    assert_eq!(engine.short_periods_elapsed(), 2);
    // no long period yet: the counters never rolled over
    assert!(engine.counters().last_counts().is_empty());
    assert_eq!(engine.counters().current_counts()[&1], current_before);
    // engine never became ready, so no visit sync re-keyed the heaps
    assert_eq!(
        engine.heaps().segment_state(1).unwrap().2,
        heap_visit_at_insert
    );
}

#[test]
fn test_long_period_rolls_counters_over() {
    let engine = test_engine(1_000_000, 10);
    insert_cold(&engine, &[1], 1);
    engine.wait_for_background();
    for _ in 0..4 {
        engine.check_key(1, b"present");
    }
    engine.wait_for_background();
    let visits = engine.counters().current_counts()[&1];

    // 10 short periods of 10 reads trigger the long boundary
    for _ in 0..100 {
        engine.get_key_observed(b"k");
    }
    engine.wait_for_background();

    assert_eq!(engine.counters().last_counts()[&1], visits);
    assert_eq!(engine.counters().current_counts()[&1], 0);
}

#[test]
fn test_adjuster_moves_units_toward_hot_segments() {
    // 46 cold segments keep unforced usage under the 98000-bit threshold;
    // a level-0 flush then pushes the cache to exactly full
    let engine = test_engine(100_000, 50);
    let bulk: Vec<SegmentId> = (1..=46).collect();
    insert_cold(&engine, &bulk, 1);
    engine.wait_for_background();
    assert_eq!(engine.map().used_bits(), 92_000);
    assert!(engine.is_ready());
    assert!(!engine.map().is_full());

    insert_cold(&engine, &[100], 0);
    engine.wait_for_background();
    assert_eq!(engine.map().used_bits(), 98_000);
    assert!(engine.map().is_full());

    // heat up segment 1 far past the sync bound
    for _ in 0..200 {
        engine.check_key(1, b"present");
    }
    engine.wait_for_background();

    // one short period of reads re-keys the heaps from the counters
    for _ in 0..50 {
        engine.get_key_observed(b"k");
    }
    engine.wait_for_background();
    assert!(engine.heaps().segment_state(1).unwrap().2 > 100);

    let total_before: u16 = (1..=46)
        .map(|sid| engine.map().enabled_units(sid).unwrap())
        .sum();

    assert!(engine.adjust_once(), "a profitable swap must exist");
    assert_eq!(engine.map().enabled_units(1), Some(3));

    // the swap preserved the total enabled units; the pinned level-0
    // segment was never touched
    let total_after: u16 = (1..=46)
        .map(|sid| engine.map().enabled_units(sid).unwrap())
        .sum();
    assert_eq!(total_before, total_after);
    assert_eq!(engine.map().enabled_units(100), Some(6));
    assert_eq!(engine.map().used_bits(), 98_000);
}

#[test]
fn test_adjust_gated_until_ready_and_full() {
    let engine = test_engine(1_000_000, 100);
    assert!(!engine.adjust_once());

    insert_cold(&engine, &[1, 2], 1);
    engine.wait_for_background();
    // plenty of free space: still gated
    assert!(!engine.adjust_once());
}

#[test]
fn test_sampling_freezes_then_counts_hits() {
    let mut cfg = test_config(1_000_000, 100);
    cfg.sampling.samples_limit = 64;
    cfg.sampling.samples_maxcnt = 32;
    cfg.sampling.default_buckets = 4;
    let source = Arc::new(SetUnitSource::new(UNIT_BITS, 6));
    let engine = AllocationEngine::new(cfg, source).unwrap();

    engine.record_segment_bounds(1, b"key00".to_vec(), b"key31".to_vec());
    for i in 0..32 {
        engine.put_key_observed(format!("key{:02}", i).as_bytes());
    }
    engine.wait_for_background();
    assert!(engine.heat_buckets().is_ready());
    assert!(engine.heat_buckets().range_count() >= 2);

    // post-freeze reads accumulate range hits
    for _ in 0..10 {
        engine.get_key_observed(b"key05");
    }
    engine.wait_for_background();
    let range = engine.heat_buckets().locate(b"key05").unwrap() as usize;
    assert_eq!(
        engine.heat_buckets().snapshot_buckets()[range].hit_cnt,
        10
    );
}

#[test]
fn test_bootstrap_round_trips_debug_dataset() {
    // a long period ends with no segments recorded: the engine writes the
    // synthetic dataset, asks for training, reads the file back and
    // replays every row through prediction
    let (port, rx) = spawn_mock_service("3\n");
    let mut cfg = test_config(1_000_000, 10);
    cfg.classifier.port = port;
    cfg.classifier.dataset_dir = std::env::temp_dir().join("filter-cache-bootstrap-test");
    let source = Arc::new(SetUnitSource::new(UNIT_BITS, 6));
    let engine = AllocationEngine::new(cfg, source).unwrap();

    for _ in 0..100 {
        engine.get_key_observed(b"k");
    }
    engine.wait_for_background();

    let mut train_requests = 0;
    let mut predict_requests = 0;
    while train_requests + predict_requests < 1001 {
        match rx.recv_timeout(std::time::Duration::from_secs(5)) {
            Ok(line) if line.starts_with('t') => train_requests += 1,
            Ok(line) if line.starts_with('p') => predict_requests += 1,
            _ => break,
        }
    }
    assert_eq!(train_requests, 1);
    // every synthetic row came back through the predict path
    assert_eq!(predict_requests, 1000);
}

#[test]
fn test_retrain_survives_unreachable_classifier() {
    // a full long period with segments and ranges recorded: the train and
    // predict calls fail fast (nothing listens) and must not disturb the
    // allocation state
    let engine = test_engine(10_000, 10);
    insert_cold(&engine, &[1, 2, 3, 4], 1);
    engine.wait_for_background();
    assert_eq!(engine.map().used_bits(), 8_000);
    assert!(engine.is_ready());

    for _ in 0..100 {
        engine.get_key_observed(b"k");
    }
    engine.wait_for_background();

    // predictions fell back to the default ceiling; units unchanged
    for sid in 1..=4 {
        assert_eq!(engine.map().enabled_units(sid), Some(2));
        let (units, limit, _) = engine.heaps().segment_state(sid).unwrap();
        assert_eq!(units, 2);
        assert_eq!(limit, 2);
    }
    assert_eq!(engine.map().used_bits(), 8_000);
}
