use crate::runtime::reactor::{Inner, Thunk};

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Weak;
use std::time::Instant;

/// One-shot timers: a deadline heap plus a callback table.
///
/// Cancellation removes the callback and leaves the heap entry behind; dead
/// entries are skipped when deadlines are popped or inspected.
pub(crate) struct Timers {
    heap: BinaryHeap<Reverse<Deadline>>,
    callbacks: HashMap<u64, Thunk>,
    next_id: u64,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Deadline {
    at: Instant,
    id: u64,
}

impl Timers {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            callbacks: HashMap::new(),
            next_id: 0,
        }
    }

    pub(crate) fn insert(&mut self, at: Instant, f: Thunk) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse(Deadline { at, id }));
        self.callbacks.insert(id, f);
        id
    }

    pub(crate) fn cancel(&mut self, id: u64) {
        self.callbacks.remove(&id);
    }

    /// Pop every timer whose deadline has passed, in deadline order.
    pub(crate) fn take_due(&mut self, now: Instant) -> Vec<Thunk> {
        let mut due = Vec::new();
        while let Some(Reverse(head)) = self.heap.peek() {
            if head.at > now {
                break;
            }
            let Reverse(entry) = self.heap.pop().expect("peeked entry is poppable");
            if let Some(f) = self.callbacks.remove(&entry.id) {
                due.push(f);
            }
        }
        due
    }

    /// The earliest live deadline, discarding cancelled entries on the way.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse(head)) = self.heap.peek() {
            if self.callbacks.contains_key(&head.id) {
                return Some(head.at);
            }
            self.heap.pop();
        }
        None
    }
}

/// Cancels the timer it was created for.
///
/// Cloneable so several teardown paths can share it; cancelling twice, or
/// after the timer fired, is a no-op.
#[derive(Clone)]
pub struct TimerHandle {
    id: u64,
    reactor: Weak<RefCell<Inner>>,
}

impl TimerHandle {
    pub(crate) fn new(id: u64, reactor: Weak<RefCell<Inner>>) -> Self {
        Self { id, reactor }
    }

    /// Disarm the timer.
    pub fn cancel(&self) {
        if let Some(inner) = self.reactor.upgrade() {
            inner.borrow_mut().timers.cancel(self.id);
        }
    }
}
