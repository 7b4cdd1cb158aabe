//! Work-stealing stack shared by parallel search workers
//!
//! Slot 0 is a shared deque that seeds the search; every registered worker
//! owns one more slot. A worker pops its own slot first, then scans every
//! other slot, and only then blocks. The stack closes itself once every
//! registered worker is blocked at the same time, since at that point no
//! worker holds an item that could produce more work.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Coordination {
    workers: usize,
    waiting: usize,
}

pub struct WorkStack<T> {
    slots: Vec<Mutex<Vec<T>>>,
    pending: AtomicUsize,
    closed: AtomicBool,
    coordination: Mutex<Coordination>,
    wake: Condvar,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // a worker that panicked mid-push leaves a usable Vec behind
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl<T> WorkStack<T> {
    /// A stack with room for `workers` workers plus the shared slot
    pub fn new(workers: usize) -> Self {
        Self {
            slots: (0..=workers.max(1)).map(|_| Mutex::new(Vec::new())).collect(),
            pending: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            coordination: Mutex::new(Coordination::default()),
            wake: Condvar::new(),
        }
    }

    /// Register a worker and hand it a share of the shared slot.
    /// Returns the worker's slot id.
    pub fn add_worker(&self) -> usize {
        let tid = {
            let mut c = lock(&self.coordination);
            c.workers += 1;
            c.workers
        };
        assert!(
            tid < self.slots.len(),
            "more workers registered than the stack was sized for"
        );
        let mut shared = lock(&self.slots[0]);
        let mut mine = lock(&self.slots[tid]);
        let share = shared.len() / (tid + 1);
        let at = shared.len() - share;
        mine.extend(shared.drain(at..));
        tid
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop every worker; pending items are dropped
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _c = lock(&self.coordination);
        self.wake.notify_all();
    }

    /// Push onto a worker's slot (slot 0 for out-of-range ids)
    pub fn push(&self, tid: usize, item: T) {
        if self.is_closed() {
            return;
        }
        let slot = if tid < self.slots.len() { tid } else { 0 };
        {
            let mut s = lock(&self.slots[slot]);
            s.push(item);
            self.pending.fetch_add(1, Ordering::SeqCst);
        }
        let _c = lock(&self.coordination);
        self.wake.notify_one();
    }

    /// Pop the next item for a worker, blocking until one is available.
    /// `None` means the stack closed.
    pub fn pop(&self, tid: usize) -> Option<T> {
        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(item) = self.take(tid) {
                return Some(item);
            }
            if let Some(item) = self.steal(tid) {
                return Some(item);
            }

            let mut c = lock(&self.coordination);
            if self.pending.load(Ordering::SeqCst) > 0 {
                continue;
            }
            c.waiting += 1;
            if c.waiting >= c.workers || self.is_closed() {
                drop(c);
                self.close();
                return None;
            }
            c = self.wake.wait(c).unwrap_or_else(|e| e.into_inner());
            c.waiting -= 1;
        }
    }

    fn take(&self, slot: usize) -> Option<T> {
        let mut s = lock(&self.slots[slot.min(self.slots.len() - 1)]);
        let item = s.pop();
        if item.is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        item
    }

    fn steal(&self, tid: usize) -> Option<T> {
        let n = self.slots.len();
        (1..n).map(|off| (tid + off) % n).find_map(|slot| self.take(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_worker_drains_then_closes() {
        let stack = WorkStack::new(1);
        stack.push(0, 1);
        stack.push(0, 2);
        let tid = stack.add_worker();
        let mut got = Vec::new();
        while let Some(x) = stack.pop(tid) {
            got.push(x);
        }
        got.sort();
        assert_eq!(got, vec![1, 2]);
        assert!(stack.is_closed());
    }

    #[test]
    fn test_workers_share_generated_work() {
        // item n spawns 1..n, so item n accounts for 2^(n-1) pops in total
        let workers = 4;
        let stack = WorkStack::new(workers);
        stack.push(0, 12usize);
        let processed = AtomicUsize::new(0);
        let tids: Vec<usize> = (0..workers).map(|_| stack.add_worker()).collect();
        std::thread::scope(|s| {
            for tid in tids {
                let stack = &stack;
                let processed = &processed;
                s.spawn(move || {
                    while let Some(n) = stack.pop(tid) {
                        processed.fetch_add(1, Ordering::SeqCst);
                        for k in 1..n {
                            stack.push(tid, k);
                        }
                    }
                });
            }
        });
        assert_eq!(processed.load(Ordering::SeqCst), 1 << 11);
    }

    #[test]
    fn test_close_stops_blocked_workers() {
        let stack = WorkStack::<u8>::new(2);
        let a = stack.add_worker();
        let _b = stack.add_worker();
        std::thread::scope(|s| {
            let handle = s.spawn(|| stack.pop(a));
            std::thread::sleep(std::time::Duration::from_millis(20));
            stack.close();
            assert_eq!(handle.join().unwrap(), None);
        });
    }
}
