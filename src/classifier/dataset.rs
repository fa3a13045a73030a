//! Training dataset serialization
//!
//! One CSV per training round: a header naming the level, the range/hotness
//! pairs and the target class, then one row per segment. The external
//! trainer loads the file by name from a directory shared with this
//! process. Feature values are pre-scaled integers; see the engine's
//! feature assembly.

use crate::core::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Integer feature row: level followed by `(rate, hotness)` pairs
pub type FeatureRow = Vec<u32>;

fn header(feature_num: u16, with_weight: bool) -> Vec<String> {
    let ranges_num = (feature_num - 1) / 2;
    let mut columns = Vec::with_capacity(feature_num as usize + 2);
    columns.push("Level".to_string());
    for i in 0..ranges_num {
        columns.push(format!("Range_{}", i));
        columns.push(format!("Hotness_{}", i));
    }
    columns.push("Target".to_string());
    if with_weight {
        columns.push("Weight".to_string());
    }
    columns
}

/// Write the training dataset.
///
/// Rows shorter than `feature_num` are right-padded with zeros, longer ones
/// truncated. `weights` may be empty; otherwise it must parallel `rows` and
/// adds a trailing weight column.
pub fn write_dataset(
    path: &Path,
    feature_num: u16,
    rows: &[FeatureRow],
    labels: &[u16],
    weights: &[u32],
) -> Result<()> {
    if rows.len() != labels.len() {
        return Err(Error::invalid_input(format!(
            "{} feature rows but {} labels",
            rows.len(),
            labels.len()
        )));
    }
    if !weights.is_empty() && weights.len() != rows.len() {
        return Err(Error::invalid_input(format!(
            "{} feature rows but {} weights",
            rows.len(),
            weights.len()
        )));
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| Error::dataset(format!("failed to open {}: {}", path.display(), e)))?;

    let with_weight = !weights.is_empty();
    writer
        .write_record(header(feature_num, with_weight))
        .map_err(|e| Error::dataset(e.to_string()))?;

    for (i, row) in rows.iter().enumerate() {
        let mut record: Vec<String> = row
            .iter()
            .take(feature_num as usize)
            .map(|v| v.to_string())
            .collect();
        record.resize(feature_num as usize, "0".to_string());
        record.push(labels[i].to_string());
        if with_weight {
            record.push(weights[i].to_string());
        }
        writer
            .write_record(&record)
            .map_err(|e| Error::dataset(e.to_string()))?;
    }

    writer
        .flush()
        .map_err(|e| Error::dataset(e.to_string()))?;
    Ok(())
}

/// Write a synthetic bootstrap dataset so the trainer has something to fit
/// before real feature rows exist. Deterministically seeded.
pub fn write_debug_dataset(path: &Path, feature_num: u16, max_units: u16) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let ranges_num = ((feature_num - 1) / 2) as usize;

    let mut rows: Vec<FeatureRow> = Vec::with_capacity(1000);
    let mut labels: Vec<u16> = Vec::with_capacity(1000);
    for i in 0..1000u32 {
        let level = i / 200 + 1;
        let mut target = max_units.saturating_sub(level as u16);
        if rng.random::<f64>() > 0.10 * level as f64 {
            target = target.saturating_sub(1);
        }

        let mut row: FeatureRow = Vec::with_capacity(feature_num as usize);
        row.push(level);
        let mut rate = 1000u32;
        for _ in 0..ranges_num {
            row.push(rate);
            row.push(rng.random_range(0..1_000_000));
            rate = rate.saturating_sub(rng.random_range(0..=rate / 2));
        }
        rows.push(row);
        labels.push(target);
    }

    write_dataset(path, feature_num, &rows, &labels, &[])
}

/// Read feature rows back from a dataset, dropping the trailing target (and
/// weight) columns. Malformed files yield an empty batch rather than an
/// error; this path only serves debugging.
pub fn read_feature_rows(path: &Path, feature_num: u16) -> Vec<FeatureRow> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!("failed to open dataset {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("malformed dataset row: {}", e);
                return Vec::new();
            }
        };
        let mut row: FeatureRow = Vec::with_capacity(feature_num as usize);
        for field in record.iter().take(feature_num as usize) {
            match field.parse::<u32>() {
                Ok(value) => row.push(value),
                Err(_) => {
                    tracing::warn!("non-numeric dataset field: {:?}", field);
                    return Vec::new();
                }
            }
        }
        rows.push(row);
    }
    rows
}
