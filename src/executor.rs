//! Fixed-size worker pool with submit-detach semantics
//!
//! Every public engine operation defers its slow half here so the caller's
//! critical path returns immediately. Tasks from one caller thread always
//! land on the same shard queue and run in submission order; tasks from
//! different threads may interleave freely. Shutdown drains every queue and
//! joins the workers.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::mpsc;
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shard {
    tx: flume::Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

/// Sharded worker pool preserving per-caller-thread FIFO order
pub struct BackgroundExecutor {
    shards: Vec<Shard>,
}

impl BackgroundExecutor {
    /// Spawn `threads` workers; zero selects the CPU count
    pub fn new(threads: usize) -> Self {
        let threads = if threads == 0 {
            num_cpus::get()
        } else {
            threads
        };

        let shards = (0..threads)
            .map(|i| {
                let (tx, rx) = flume::unbounded::<Job>();
                let handle = std::thread::Builder::new()
                    .name(format!("fc-worker-{}", i))
                    .spawn(move || {
                        for job in rx.iter() {
                            if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                                tracing::error!("background task panicked");
                            }
                        }
                    })
                    .expect("failed to spawn worker thread");
                Shard {
                    tx,
                    handle: Some(handle),
                }
            })
            .collect();

        Self { shards }
    }

    /// Number of worker threads
    pub fn threads(&self) -> usize {
        self.shards.len()
    }

    /// Queue a task on the submitting thread's shard and return immediately
    pub fn submit<F: FnOnce() + Send + 'static>(&self, job: F) {
        let shard = &self.shards[self.shard_index()];
        // send fails only after shutdown dropped the receiver
        let _ = shard.tx.send(Box::new(job));
    }

    fn shard_index(&self) -> usize {
        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Block until every task queued so far has finished.
    ///
    /// Later submissions from other threads may still be running; this is a
    /// barrier for the work visible at call time, used by shutdown and by
    /// tests that need deterministic state.
    pub fn wait_idle(&self) {
        let (tx, rx) = mpsc::channel();
        for shard in &self.shards {
            let tx = tx.clone();
            let _ = shard.tx.send(Box::new(move || {
                let _ = tx.send(());
            }));
        }
        drop(tx);
        for _ in 0..self.shards.len() {
            let _ = rx.recv();
        }
    }
}

impl Drop for BackgroundExecutor {
    fn drop(&mut self) {
        for shard in &mut self.shards {
            // closing the channel lets the worker drain and exit
            let (closed_tx, _) = flume::bounded(0);
            shard.tx = closed_tx;
            if let Some(handle) = shard.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
