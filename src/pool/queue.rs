//! Priority task queue shared by all workers in a pool

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

use crate::types::{JobId, RecordId, TaskCallback};

/// Fallback poll interval for blocked poppers; bounds the wake-up latency
/// for close() even if a notification is missed
const POP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One record fetch owned by the queue until a worker claims it
pub(crate) struct Task {
    /// The record to resolve
    pub(crate) record_id: RecordId,
    /// Owning job
    pub(crate) job_id: JobId,
    /// Queue priority (lower = served first)
    pub(crate) priority: i32,
    /// Retry counter, 0 on first attempt
    pub(crate) attempt: u32,
    /// Invoked exactly once with the final resolution
    pub(crate) callback: Option<TaskCallback>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("record_id", &self.record_id)
            .field("job_id", &self.job_id)
            .field("priority", &self.priority)
            .field("attempt", &self.attempt)
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

/// Heap entry wrapping a task with its service order key
struct QueuedTask {
    priority: i32,
    seq: u64,
    task: Task,
}

impl Eq for QueuedTask {}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

// BinaryHeap is a max-heap, so the comparison is reversed: the "greatest"
// entry is the lowest (priority, seq) pair.
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match other.priority.cmp(&self.priority) {
            // Equal priority: lower sequence number first (FIFO within tier)
            std::cmp::Ordering::Equal => other.seq.cmp(&self.seq),
            ordering => ordering,
        }
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Thread-safe priority queue of fetch tasks
///
/// Service order is a comparator over `(priority, sequence)` pairs: lowest
/// priority value first, FIFO among equal priorities. Safe for concurrent
/// pushers and poppers.
pub(crate) struct TaskQueue {
    heap: Mutex<BinaryHeap<QueuedTask>>,
    notify: Notify,
    closed: AtomicBool,
    next_seq: AtomicU64,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Insert a task at its priority, behind earlier tasks of the same tier
    ///
    /// Once the queue is closed the task is handed back to the caller
    /// instead of being enqueued, so it is never silently lost.
    pub(crate) async fn push(&self, task: Task) -> Result<(), Task> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(task);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        {
            let mut heap = self.heap.lock().await;
            heap.push(QueuedTask {
                priority: task.priority,
                seq,
                task,
            });
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Remove and return the highest-priority task, waiting if none is
    /// queued
    ///
    /// After [`close`](Self::close), pending tasks still drain; `None` is
    /// returned only once the queue is closed and empty.
    pub(crate) async fn pop(&self) -> Option<Task> {
        loop {
            {
                let mut heap = self.heap.lock().await;
                if let Some(entry) = heap.pop() {
                    return Some(entry.task);
                }
            }

            if self.closed.load(Ordering::SeqCst) {
                return None;
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(POP_POLL_INTERVAL) => {}
            }
        }
    }

    /// Close the queue and wake all blocked poppers
    ///
    /// Subsequent pushes are rejected; pending tasks remain poppable.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Discard all pending tasks
    pub(crate) async fn clear(&self) -> usize {
        let mut heap = self.heap.lock().await;
        let discarded = heap.len();
        heap.clear();
        discarded
    }

    /// Number of queued tasks
    pub(crate) async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }
}
