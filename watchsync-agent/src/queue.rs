//! Priority work queue shared between producers and one worker.
//!
//! Lower priority values are served first; equal priorities are served in
//! arrival order. A shutdown envelope jumps ahead of all regular traffic.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

/// Queue priorities. Smaller is more urgent.
pub struct Priority;

impl Priority {
    pub const SHUTDOWN: u8 = 5;
    pub const WAKEUP: u8 = 50;
    /// Failed deliveries go back ahead of normal traffic.
    pub const RETRY: u8 = 50;
    pub const NORMAL: u8 = 100;
}

/// What a worker pulls off its queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
    Shutdown,
    Payload(T),
}

struct Entry<T> {
    priority: u8,
    seq: u64,
    item: Envelope<T>,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // BinaryHeap is a max-heap; invert so the smallest (priority, seq) pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Shared<T> {
    heap: Mutex<Heap<T>>,
    notify: Notify,
}

struct Heap<T> {
    entries: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

/// Cloneable handle to a priority queue.
pub struct PriorityQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for PriorityQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                heap: Mutex::new(Heap {
                    entries: BinaryHeap::new(),
                    next_seq: 0,
                }),
                notify: Notify::new(),
            }),
        }
    }

    pub fn push(&self, priority: u8, item: T) {
        self.push_envelope(priority, Envelope::Payload(item));
    }

    /// Enqueues the poison pill that ends the consuming worker.
    pub fn push_shutdown(&self) {
        self.push_envelope(Priority::SHUTDOWN, Envelope::Shutdown);
    }

    fn push_envelope(&self, priority: u8, item: Envelope<T>) {
        {
            let mut heap = self.lock();
            let seq = heap.next_seq;
            heap.next_seq += 1;
            heap.entries.push(Entry {
                priority,
                seq,
                item,
            });
        }
        self.shared.notify.notify_one();
    }

    pub fn try_recv(&self) -> Option<Envelope<T>> {
        self.lock().entries.pop().map(|e| e.item)
    }

    /// Waits for the next item.
    pub async fn recv(&self) -> Envelope<T> {
        loop {
            if let Some(item) = self.try_recv() {
                return item;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Waits up to `timeout` for the next item; `None` on timeout.
    pub async fn recv_timeout(&self, timeout: Duration) -> Option<Envelope<T>> {
        tokio::time::timeout(timeout, self.recv()).await.ok()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Heap<T>> {
        self.shared.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
