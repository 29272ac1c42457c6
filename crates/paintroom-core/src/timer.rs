//! Deferred, cancellable work.
//!
//! Nothing in the engine blocks. Delays are expressed as tasks handed to a [`Timer`];
//! the host advances time and runs whatever comes due. Time is a `Duration` since the
//! start of the session, so tests can drive it by hand.

use std::time::Duration;

/// Handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Schedule/cancel primitives for deferred tasks.
pub trait Timer<T> {
    /// Schedule `task` to run `delay` after the timer's current time.
    fn schedule(&mut self, delay: Duration, task: T) -> TimerHandle;

    /// Cancel a scheduled task. Returns false if it already ran or was cancelled.
    fn cancel(&mut self, handle: TimerHandle) -> bool;

    /// Advance to `now` and return every task due by then, earliest first.
    /// Time never moves backwards; an earlier `now` is ignored.
    fn poll_due(&mut self, now: Duration) -> Vec<T>;

    /// Current time as last seen by [`Timer::poll_due`].
    fn now(&self) -> Duration;

    /// Number of tasks still waiting.
    fn pending(&self) -> usize;
}

#[derive(Debug)]
struct Entry<T> {
    due: Duration,
    handle: TimerHandle,
    task: T,
}

/// A timer backed by an ordered queue, advanced explicitly by the host.
#[derive(Debug)]
pub struct DeferredQueue<T> {
    now: Duration,
    next_handle: u64,
    entries: Vec<Entry<T>>,
}

impl<T> DeferredQueue<T> {
    /// Create an empty queue at time zero.
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_handle: 0,
            entries: Vec::new(),
        }
    }

    /// When the next task comes due, if any.
    pub fn next_due(&self) -> Option<Duration> {
        self.entries.iter().map(|e| e.due).min()
    }
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Timer<T> for DeferredQueue<T> {
    fn schedule(&mut self, delay: Duration, task: T) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(Entry {
            due: self.now + delay,
            handle,
            task,
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        self.entries.len() != before
    }

    fn poll_due(&mut self, now: Duration) -> Vec<T> {
        self.now = self.now.max(now);

        let mut due = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].due <= self.now {
                due.push(self.entries.swap_remove(i));
            } else {
                i += 1;
            }
        }
        // Handles increase monotonically, so they break ties in scheduling order.
        due.sort_by_key(|e| (e.due, e.handle));
        due.into_iter().map(|e| e.task).collect()
    }

    fn now(&self) -> Duration {
        self.now
    }

    fn pending(&self) -> usize {
        self.entries.len()
    }
}
