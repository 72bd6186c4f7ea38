//! Virtual time and deterministic timers
//!
//! The whole stack runs against a virtual clock: nothing blocks, every
//! delay is a scheduled callback. `TimerQueue` is a cancellable min-heap
//! keyed by `(deadline, schedule order)` so that entries scheduled for the
//! same instant fire in the order they were scheduled, making runs
//! reproducible.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// A point in virtual time, microseconds since clock start.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_micros(us: u64) -> Self {
        Timestamp(us)
    }

    pub const fn from_millis(ms: u64) -> Self {
        Timestamp(ms * 1_000)
    }

    pub const fn from_secs(s: u64) -> Self {
        Timestamp(s * 1_000_000)
    }

    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// Elapsed time since `earlier`, zero if `earlier` is in the future.
    pub fn since(&self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.as_micros() as u64)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_sub(rhs.as_micros() as u64))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}s", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Handle to a scheduled timer, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

struct Entry<T> {
    deadline: Timestamp,
    seq: u64,
    payload: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest entry
        // on top; equal deadlines fall back to schedule order.
        match other.deadline.cmp(&self.deadline) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// Cancellable timer queue over virtual time.
pub struct TimerQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    cancelled: HashSet<u64>,
    next_seq: u64,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_seq: 0,
        }
    }

    /// Schedule `payload` to fire at `deadline`.
    pub fn schedule(&mut self, deadline: Timestamp, payload: T) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            deadline,
            seq,
            payload,
        });
        TimerHandle(seq)
    }

    /// Cancel a previously scheduled timer. Cancelling a timer that has
    /// already fired is a no-op.
    pub fn cancel(&mut self, handle: TimerHandle) {
        self.cancelled.insert(handle.0);
    }

    /// Earliest pending deadline, skipping cancelled entries.
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        self.skip_cancelled();
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pop the next timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<T> {
        self.skip_cancelled();
        if self.heap.peek().map(|e| e.deadline <= now)? {
            let entry = self.heap.pop().expect("peeked entry present");
            Some(entry.payload)
        } else {
            None
        }
    }

    pub fn is_empty(&mut self) -> bool {
        self.next_deadline().is_none()
    }

    fn skip_cancelled(&mut self) {
        while let Some(entry) = self.heap.peek() {
            if self.cancelled.remove(&entry.seq) {
                self.heap.pop();
            } else {
                break;
            }
        }
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_deadline_order() {
        let mut q = TimerQueue::new();
        q.schedule(Timestamp::from_millis(20), "b");
        q.schedule(Timestamp::from_millis(10), "a");
        q.schedule(Timestamp::from_millis(30), "c");

        let now = Timestamp::from_millis(100);
        assert_eq!(q.pop_due(now), Some("a"));
        assert_eq!(q.pop_due(now), Some("b"));
        assert_eq!(q.pop_due(now), Some("c"));
        assert_eq!(q.pop_due(now), None);
    }

    #[test]
    fn test_same_deadline_fires_in_schedule_order() {
        let mut q = TimerQueue::new();
        let t = Timestamp::from_millis(5);
        q.schedule(t, 1);
        q.schedule(t, 2);
        q.schedule(t, 3);

        assert_eq!(q.pop_due(t), Some(1));
        assert_eq!(q.pop_due(t), Some(2));
        assert_eq!(q.pop_due(t), Some(3));
    }

    #[test]
    fn test_not_due_yet() {
        let mut q = TimerQueue::new();
        q.schedule(Timestamp::from_millis(10), ());
        assert_eq!(q.pop_due(Timestamp::from_millis(9)), None);
        assert_eq!(q.pop_due(Timestamp::from_millis(10)), Some(()));
    }

    #[test]
    fn test_cancel() {
        let mut q = TimerQueue::new();
        let h = q.schedule(Timestamp::from_millis(1), "x");
        q.schedule(Timestamp::from_millis(2), "y");
        q.cancel(h);

        assert_eq!(q.next_deadline(), Some(Timestamp::from_millis(2)));
        assert_eq!(q.pop_due(Timestamp::from_millis(5)), Some("y"));
        assert!(q.is_empty());
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::from_millis(10) + Duration::from_millis(5);
        assert_eq!(t, Timestamp::from_millis(15));
        assert_eq!(
            t.since(Timestamp::from_millis(10)),
            Duration::from_millis(5)
        );
        // since() saturates rather than underflowing
        assert_eq!(Timestamp::ZERO.since(t), Duration::ZERO);
    }
}
