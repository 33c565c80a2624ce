//! Progress/metrics (spec §4.9 share table, §5 concurrency notes).
//!
//! Aggregate counters are atomics; per-worker thread-state labels are each
//! guarded by their own mutex so the progress thread can `try_lock` and
//! simply skip a worker's label this tick rather than block a row thread
//! that's mid-update (spec §5: "Progress output is guarded by a recursive
//! mutex using try-lock"). Rendering uses `indicatif::ProgressBar`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::session::Console;

/// Aggregate, additive counters shared across all workers (spec §5).
#[derive(Default)]
pub struct Counters {
    pub rows_written: AtomicU64,
    pub bytes_written: AtomicU64,
    pub data_bytes: AtomicU64,
}

impl Counters {
    pub fn add_rows(&self, n: u64) {
        self.rows_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, data_bytes: u64, bytes_written: u64) {
        self.data_bytes.fetch_add(data_bytes, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes_written, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            rows: self.rows_written.load(Ordering::Relaxed),
            data_bytes: self.data_bytes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot {
    pub rows: u64,
    pub data_bytes: u64,
    pub bytes_written: u64,
}

/// Keeps the previous snapshot + timestamp to compute a throughput window
/// average on each tick, rather than an instantaneous (noisy) delta.
pub struct ThroughputWindow {
    last: Snapshot,
    last_at: Instant,
}

impl Default for ThroughputWindow {
    fn default() -> Self {
        Self {
            last: Snapshot::default(),
            last_at: Instant::now(),
        }
    }
}

impl ThroughputWindow {
    /// Returns (rows/sec, bytes/sec) since the previous call.
    pub fn tick(&mut self, current: Snapshot) -> (f64, f64) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_at).as_secs_f64().max(0.001);
        let rows_per_sec = (current.rows.saturating_sub(self.last.rows)) as f64 / dt;
        let bytes_per_sec = (current.bytes_written.saturating_sub(self.last.bytes_written)) as f64 / dt;
        self.last = current;
        self.last_at = now;
        (rows_per_sec, bytes_per_sec)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadState {
    Idle,
    CapturingDdl { schema: String, table: String },
    Chunking { schema: String, table: String },
    Streaming { schema: String, table: String, chunk_id: u64 },
    Done,
}

impl std::fmt::Display for ThreadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadState::Idle => write!(f, "idle"),
            ThreadState::CapturingDdl { schema, table } => write!(f, "ddl `{schema}`.`{table}`"),
            ThreadState::Chunking { schema, table } => write!(f, "chunking `{schema}`.`{table}`"),
            ThreadState::Streaming { schema, table, chunk_id } => {
                write!(f, "streaming `{schema}`.`{table}` chunk {chunk_id}")
            }
            ThreadState::Done => write!(f, "done"),
        }
    }
}

/// Per-worker labels. Each slot has its own mutex: a worker updating its own
/// label never contends with another worker, only (rarely) with the
/// progress thread reading it.
pub struct ThreadStates {
    slots: Vec<Mutex<ThreadState>>,
}

impl ThreadStates {
    pub fn new(n_workers: usize) -> Self {
        Self {
            slots: (0..n_workers).map(|_| Mutex::new(ThreadState::Idle)).collect(),
        }
    }

    pub fn set(&self, worker_id: usize, state: ThreadState) {
        if let Some(slot) = self.slots.get(worker_id) {
            *slot.lock().unwrap() = state;
        }
    }

    /// Snapshot all labels, skipping (reusing "busy") any slot that's
    /// currently locked rather than blocking.
    pub fn snapshot(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|s| match s.try_lock() {
                Ok(guard) => guard.to_string(),
                Err(_) => "busy".to_string(),
            })
            .collect()
    }
}

/// Drives a 10Hz progress line via `indicatif`, reading `Counters` and
/// `ThreadStates` until stopped. Owns the only writer to the progress bar,
/// so the TTY is never written from more than one thread.
pub struct ProgressReporter {
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ProgressReporter {
    pub fn start(counters: Arc<Counters>, states: Arc<ThreadStates>, console: Arc<dyn Console>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = std::thread::Builder::new()
            .name("progress".into())
            .spawn(move || {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                let mut window = ThroughputWindow::default();
                while !stop_flag.load(Ordering::Relaxed) {
                    let snapshot = counters.snapshot();
                    let (rows_per_sec, bytes_per_sec) = window.tick(snapshot);
                    let labels = states.snapshot();
                    bar.set_message(format!(
                        "{} rows, {} bytes ({:.0} rows/s, {:.0} B/s) [{}]",
                        snapshot.rows,
                        snapshot.bytes_written,
                        rows_per_sec,
                        bytes_per_sec,
                        labels.join(", ")
                    ));
                    bar.tick();
                    std::thread::sleep(Duration::from_millis(100));
                }
                bar.finish_and_clear();
                let final_snapshot = counters.snapshot();
                console.print_status(&format!(
                    "done: {} rows, {} bytes written",
                    final_snapshot.rows, final_snapshot.bytes_written
                ));
            })
            .expect("failed to spawn progress thread");

        Self { stop, handle: Some(handle) }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_additively() {
        let counters = Counters::default();
        counters.add_rows(3);
        counters.add_bytes(100, 40);
        counters.add_rows(2);
        counters.add_bytes(50, 20);
        let s = counters.snapshot();
        assert_eq!(s.rows, 5);
        assert_eq!(s.data_bytes, 150);
        assert_eq!(s.bytes_written, 60);
    }

    #[test]
    fn thread_states_skip_contended_slot() {
        let states = ThreadStates::new(2);
        states.set(0, ThreadState::Idle);
        states.set(
            1,
            ThreadState::Streaming { schema: "s".into(), table: "t".into(), chunk_id: 0 },
        );
        let snap = states.snapshot();
        assert_eq!(snap[0], "idle");
        assert_eq!(snap[1], "streaming `s`.`t` chunk 0");
    }
}
