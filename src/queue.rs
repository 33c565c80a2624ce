//! Priority task queue (spec §4.6).
//!
//! Three priority levels, FIFO within a level, blocking `pop`, and an
//! ordered `shutdown(n)` that hands exactly `n` sentinel tasks to whichever
//! `n` workers call `pop` next. Built on `std::sync::{Mutex, Condvar}` —
//! no async runtime, no crossbeam.
//!
//! Generic over the task type `T` rather than hard-coding a closure
//! signature: the concrete alias (`Box<dyn FnOnce(&mut Worker) + Send>`)
//! belongs next to [`crate::worker::Worker`], not here — this module only
//! needs `T: Send`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
}

enum Entry<T> {
    Task(T),
    Shutdown,
}

struct State<T> {
    high: VecDeque<Entry<T>>,
    medium: VecDeque<Entry<T>>,
    low: VecDeque<Entry<T>>,
    accepting: bool,
}

impl<T> State<T> {
    fn queue_for(&mut self, priority: Priority) -> &mut VecDeque<Entry<T>> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Medium => &mut self.medium,
            Priority::Low => &mut self.low,
        }
    }

    fn pop_any(&mut self) -> Option<Entry<T>> {
        self.high
            .pop_front()
            .or_else(|| self.medium.pop_front())
            .or_else(|| self.low.pop_front())
    }

    fn is_empty(&self) -> bool {
        self.high.is_empty() && self.medium.is_empty() && self.low.is_empty()
    }
}

pub struct TaskQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
}

/// What [`TaskQueue::pop`] handed back.
pub enum PopResult<T> {
    Task(T),
    Shutdown,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                high: VecDeque::new(),
                medium: VecDeque::new(),
                low: VecDeque::new(),
                accepting: true,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueue one task at the given priority. No-op once shut down.
    pub fn push(&self, priority: Priority, task: T) {
        let mut state = self.state.lock().unwrap();
        if !state.accepting {
            return;
        }
        state.queue_for(priority).push_back(Entry::Task(task));
        self.not_empty.notify_one();
    }

    /// Stop accepting new tasks and enqueue `n` shutdown sentinels, one per
    /// worker that should exit. Sentinels are served highest-priority-first
    /// like any other task, so workers parked on `pop` wake promptly.
    pub fn shutdown(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        state.accepting = false;
        for _ in 0..n {
            state.high.push_front(Entry::Shutdown);
        }
        self.not_empty.notify_all();
    }

    /// Block until a task or shutdown sentinel is available.
    pub fn pop(&self) -> PopResult<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(entry) = state.pop_any() {
                return match entry {
                    Entry::Task(t) => PopResult::Task(t),
                    Entry::Shutdown => PopResult::Shutdown,
                };
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type TestTask = Box<dyn FnOnce() + Send>;

    #[test]
    fn high_priority_served_before_low() {
        let q: TaskQueue<TestTask> = TaskQueue::new();
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        q.push(Priority::Low, Box::new(move || o1.lock().unwrap().push("low")));
        let o2 = order.clone();
        q.push(Priority::High, Box::new(move || o2.lock().unwrap().push("high")));
        let o3 = order.clone();
        q.push(Priority::Medium, Box::new(move || o3.lock().unwrap().push("medium")));

        for _ in 0..3 {
            if let PopResult::Task(t) = q.pop() {
                t();
            }
        }
        assert_eq!(*order.lock().unwrap(), vec!["high", "medium", "low"]);
    }

    #[test]
    fn shutdown_terminates_exactly_n_workers() {
        let q: Arc<TaskQueue<TestTask>> = Arc::new(TaskQueue::new());
        q.shutdown(2);

        let completed = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let q = q.clone();
            let completed = completed.clone();
            handles.push(std::thread::spawn(move || {
                if let PopResult::Shutdown = q.pop() {
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn push_after_shutdown_is_dropped() {
        let q: TaskQueue<TestTask> = TaskQueue::new();
        q.shutdown(0);
        q.push(Priority::High, Box::new(|| {}));
        assert!(q.is_empty());
    }
}
