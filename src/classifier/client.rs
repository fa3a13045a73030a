//! Stateless client for the external training/prediction service
//!
//! The service speaks newline-framed ASCII over TCP: a train request names
//! a dataset file the service loads from shared storage and gets no reply;
//! predict requests stream one feature row per line over a persistent
//! connection and read back one class each. Until its first training
//! completes the service answers with the default class, and the engine
//! stays correct under that contract.

use crate::classifier::dataset::{self, FeatureRow};
use crate::core::config::ClassifierConfig;
use crate::core::error::{Error, Result};
use crate::core::types::UnitCount;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

struct Conn {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

/// Client to the classifier service
pub struct ClassifierClient {
    cfg: ClassifierConfig,
    min_units: UnitCount,
    max_units: UnitCount,
    /// Model input width; set once when the engine first becomes ready
    feature_num: OnceCell<u16>,
    /// Persistent predict connection; dropped on the first error and
    /// re-established lazily
    conn: Mutex<Option<Conn>>,
    fallback_feature_num: u16,
}

impl ClassifierClient {
    /// Create a client; no connection is attempted until first use
    pub fn new(cfg: ClassifierConfig, min_units: UnitCount, max_units: UnitCount) -> Self {
        Self {
            cfg,
            min_units,
            max_units,
            feature_num: OnceCell::new(),
            conn: Mutex::new(None),
            fallback_feature_num: crate::core::constants::FALLBACK_FEATURES_NUM,
        }
    }

    /// Whether the feature width has been fixed
    pub fn is_ready(&self) -> bool {
        self.feature_num.get().is_some()
    }

    /// The fixed feature width, if set
    pub fn feature_num(&self) -> Option<u16> {
        self.feature_num.get().copied()
    }

    /// Fix the feature width from the widths observed across segments at
    /// readiness time, capped by the wire message bound. Later calls are
    /// no-ops; the width never changes for the process lifetime.
    pub fn make_ready(&self, feature_widths: &[u16]) {
        let width = feature_widths
            .iter()
            .copied()
            .max()
            .unwrap_or(self.fallback_feature_num)
            .min(self.cfg.max_features);
        let _ = self.feature_num.set(width);
    }

    /// Pad or truncate a feature row to the fixed width
    fn prepare_row(&self, row: &mut FeatureRow) -> Result<()> {
        let width = self
            .feature_num
            .get()
            .copied()
            .ok_or_else(|| Error::classifier("feature width not set"))? as usize;
        row.truncate(width);
        row.resize(width, 0);
        Ok(())
    }

    /// Where the training dataset is written; the service loads the same
    /// file by name
    pub fn dataset_path(&self) -> std::path::PathBuf {
        self.cfg.dataset_dir.join(&self.cfg.dataset_name)
    }

    /// Write the dataset and ask the service to train on it.
    ///
    /// Fire-and-forget over a fresh connection; no reply is awaited. With
    /// no feature rows a synthetic bootstrap dataset is written instead.
    pub fn train(&self, rows: &[FeatureRow], labels: &[u16], weights: &[u32]) -> Result<()> {
        let path = self.dataset_path();
        if rows.is_empty() {
            let width = self
                .feature_num
                .get()
                .copied()
                .unwrap_or(self.fallback_feature_num);
            dataset::write_debug_dataset(&path, width, self.max_units)?;
        } else {
            let width = self
                .feature_num
                .get()
                .copied()
                .ok_or_else(|| Error::classifier("feature width not set"))?;
            dataset::write_dataset(&path, width, rows, labels, weights)?;
        }

        let message = format!("t {}\n", self.cfg.dataset_name);
        if message.len() > self.cfg.buffer_size {
            return Err(Error::classifier("train request exceeds buffer size"));
        }

        let mut stream = TcpStream::connect((self.cfg.host.as_str(), self.cfg.port))
            .map_err(|e| Error::classifier(format!("connect failed: {}", e)))?;
        stream
            .write_all(message.as_bytes())
            .map_err(|e| Error::classifier(format!("train send failed: {}", e)))?;
        let _ = stream.shutdown(std::net::Shutdown::Write);
        tracing::debug!(dataset = %path.display(), "train request sent");
        Ok(())
    }

    /// Predict the units ceiling for a batch of feature rows.
    ///
    /// One request/reply per row over the persistent connection; replies
    /// are clamped to the configured unit bounds. Any wire failure drops
    /// the connection and fails the whole batch, which the engine turns
    /// into the default units for the affected segments.
    pub fn predict_batch(&self, rows: &[FeatureRow]) -> Result<Vec<UnitCount>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.conn.lock();
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }

        let mut labels = Vec::with_capacity(rows.len());
        for row in rows {
            let mut row = row.clone();
            self.prepare_row(&mut row)?;

            let mut message = String::with_capacity(2 + row.len() * 4);
            message.push('p');
            for feature in &row {
                message.push(' ');
                message.push_str(&feature.to_string());
            }
            message.push('\n');
            if message.len() > self.cfg.buffer_size {
                *guard = None;
                return Err(Error::classifier("predict request exceeds buffer size"));
            }

            match self.roundtrip(guard.as_mut().expect("connection present"), &message) {
                Ok(label) => labels.push(label),
                Err(e) => {
                    // a broken stream cannot be trusted for later rows
                    *guard = None;
                    return Err(e);
                }
            }
        }
        Ok(labels)
    }

    fn connect(&self) -> Result<Conn> {
        let stream = TcpStream::connect((self.cfg.host.as_str(), self.cfg.port))
            .map_err(|e| Error::classifier(format!("connect failed: {}", e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::classifier(format!("socket setup failed: {}", e)))?;
        let reader = BufReader::new(
            stream
                .try_clone()
                .map_err(|e| Error::classifier(format!("socket clone failed: {}", e)))?,
        );
        Ok(Conn { stream, reader })
    }

    fn roundtrip(&self, conn: &mut Conn, message: &str) -> Result<UnitCount> {
        conn.stream
            .write_all(message.as_bytes())
            .map_err(|e| Error::classifier(format!("predict send failed: {}", e)))?;

        let mut reply = String::new();
        let read = conn
            .reader
            .read_line(&mut reply)
            .map_err(|e| Error::classifier(format!("predict recv failed: {}", e)))?;
        if read == 0 {
            return Err(Error::classifier("service closed the connection"));
        }
        if reply.len() > self.cfg.buffer_size {
            return Err(Error::classifier("predict reply exceeds buffer size"));
        }

        let label: i64 = reply
            .trim()
            .parse()
            .map_err(|_| Error::classifier(format!("non-numeric reply: {:?}", reply.trim())))?;
        Ok(label.clamp(self.min_units as i64, self.max_units as i64) as UnitCount)
    }
}
