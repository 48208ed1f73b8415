//! Dual-queue scheduler — the simulation kernel.
//!
//! Two queues with a strict draining contract:
//! - the **timeline** is the simulated calendar: ordered by the millisecond
//!   sort key, stable on ties (equal-instant events keep insertion order);
//! - the **immediate queue** is FIFO and must be fully drained before the
//!   next timeline event is dispatched.
//!
//! Dispatch is owned by the runner; the kernel only maintains ordering.

use crate::events::Event;
use std::collections::VecDeque;

/// The event kernel: immediate FIFO queue + time-ordered timeline.
#[derive(Debug, Default)]
pub struct EventQueue {
    timeline: VecDeque<Event>,
    immediate: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert preserving the sort invariant.
    ///
    /// The insertion point is the first element with a strictly greater sort
    /// key, so a new event lands after every existing event at the same
    /// instant — stable FIFO ordering among ties.
    pub fn insert_timeline(&mut self, event: Event) {
        let key = event.sort_key();
        let idx = self.timeline.partition_point(|e| e.sort_key() <= key);
        self.timeline.insert(idx, event);
    }

    /// Append to the immediate queue (FIFO).
    pub fn push_immediate(&mut self, event: Event) {
        self.immediate.push_back(event);
    }

    /// Immediate front first; otherwise the earliest timeline event.
    pub fn pop_next(&mut self) -> Option<Event> {
        self.immediate.pop_front().or_else(|| self.timeline.pop_front())
    }

    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.timeline.is_empty()
    }

    pub fn immediate_len(&self) -> usize {
        self.immediate.len()
    }

    pub fn timeline_len(&self) -> usize {
        self.timeline.len()
    }

    /// Earliest timeline event without removing it.
    pub fn peek_timeline(&self) -> Option<&Event> {
        self.timeline.front()
    }

    /// Discard everything in both queues (Stop semantics).
    pub fn clear(&mut self) {
        self.timeline.clear();
        self.immediate.clear();
    }

    /// Sort-invariant check, used by tests and debug assertions.
    pub fn timeline_is_sorted(&self) -> bool {
        let mut prev = i64::MIN;
        self.timeline.iter().all(|e| {
            let k = e.sort_key();
            let ok = k >= prev;
            prev = k;
            ok
        })
    }
}
