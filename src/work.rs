use std::sync::atomic::{AtomicUsize, Ordering};

/// A fixed budget of requests shared by every worker.
///
/// Units carry no data, so the queue is just a counter. Taking a unit never blocks: a failed take
/// means the budget is spent, not that more work might arrive later.
#[derive(Debug)]
pub struct WorkQueue {
    remaining: AtomicUsize,
}

impl WorkQueue {
    pub fn new(amount: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(amount),
        }
    }

    /// Claim one unit of work. Returns false once the queue is exhausted.
    pub fn try_take(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Throw away everything left in the queue, returning how many units were dropped.
    pub fn drain(&self) -> usize {
        self.remaining.swap(0, Ordering::AcqRel)
    }
}
