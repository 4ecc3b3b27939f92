//! Time-bounded batching queue that coalesces file-change events into one sync invocation.
//! Implements §4.6.
//!
//! A dedicated OS thread plus an `mpsc` channel, not an async runtime or a timer wheel --
//! matching the `progress` module's thread-based design and
//! `other_examples/1bc9c2d6_..._watcher-sync.rs.rs`'s `mpsc::channel` + `Instant`-debounce loop,
//! the closest pack precedent for a blocking file-event coalescer.
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const DEFAULT_QUIET_INTERVAL: Duration = Duration::from_millis(250);

pub struct SyncBatch {
    tx: Option<mpsc::Sender<PathBuf>>,
    sync_pending: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SyncBatch {
    /// `done` runs on the batch's own background thread, once per flush, never concurrently
    /// with another flush of the same `SyncBatch`.
    pub fn new<F>(quiet_interval: Duration, done: F) -> SyncBatch
    where
        F: Fn(HashSet<PathBuf>) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<PathBuf>();
        let sync_pending = Arc::new(AtomicBool::new(false));
        let sync_pending_thread = Arc::clone(&sync_pending);

        let handle = thread::spawn(move || {
            loop {
                let first = match rx.recv() {
                    Ok(path) => path,
                    Err(_) => return,
                };
                sync_pending_thread.store(true, Ordering::SeqCst);
                let mut accumulating = HashSet::new();
                accumulating.insert(first);

                let disconnected = loop {
                    match rx.recv_timeout(quiet_interval) {
                        Ok(path) => {
                            accumulating.insert(path);
                        }
                        Err(RecvTimeoutError::Timeout) => break false,
                        Err(RecvTimeoutError::Disconnected) => break true,
                    }
                };

                done(accumulating);
                sync_pending_thread.store(false, Ordering::SeqCst);
                if disconnected {
                    return;
                }
            }
        });

        SyncBatch { tx: Some(tx), sync_pending, handle: Some(handle) }
    }

    /// Enqueues `path`; joins the accumulating batch, or opens a new one if the prior batch is
    /// already flushing.
    pub fn add_file(&self, path: PathBuf) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(path);
        }
    }

    pub fn sync_pending(&self) -> bool {
        self.sync_pending.load(Ordering::SeqCst)
    }
}

impl Drop for SyncBatch {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn s6_batches_rapid_changes_and_splits_on_quiet_gap() {
        let flushes: Arc<Mutex<Vec<HashSet<PathBuf>>>> = Arc::new(Mutex::new(Vec::new()));
        let flushes_clone = Arc::clone(&flushes);
        let batch = SyncBatch::new(Duration::from_millis(60), move |set| {
            flushes_clone.lock().unwrap().push(set);
        });

        batch.add_file(PathBuf::from("a"));
        batch.add_file(PathBuf::from("b"));
        batch.add_file(PathBuf::from("c"));
        thread::sleep(Duration::from_millis(200));
        batch.add_file(PathBuf::from("d"));
        thread::sleep(Duration::from_millis(200));
        drop(batch);

        let flushes = flushes.lock().unwrap();
        assert_eq!(2, flushes.len());
        assert_eq!(3, flushes[0].len());
        assert_eq!(1, flushes[1].len());
    }

    #[test]
    fn sync_pending_true_only_while_batch_open() {
        let batch = SyncBatch::new(Duration::from_millis(40), |_| {
            thread::sleep(Duration::from_millis(50));
        });
        assert!(!batch.sync_pending());
        batch.add_file(PathBuf::from("a"));
        thread::sleep(Duration::from_millis(10));
        assert!(batch.sync_pending());
        thread::sleep(Duration::from_millis(150));
        assert!(!batch.sync_pending());
    }
}
