//! Event queue — dedup, priority ordering, and the durable checkpoint.
//!
//! A short critical section around a plain heap, with async callers parked
//! on a `Notify` rather than busy-polling.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::error;

use matchcast_core::{AdmitOutcome, Event, Priority, RuntimeState};

use crate::error::QueueError;

#[derive(Debug, Eq, PartialEq)]
struct QueuedEvent {
    priority: Priority,
    sequence: u64,
    event: Event,
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; invert priority (smaller = more urgent)
        // and sequence (earlier = more urgent) so `pop()` returns the
        // highest-priority, earliest-arrived event.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    heap: BinaryHeap<QueuedEvent>,
    dedup_set: HashSet<String>,
    dedup_order: VecDeque<String>,
    dedup_capacity: usize,
    state: RuntimeState,
    closed: bool,
}

/// Thread-safe priority queue with dedup and a durable checkpoint.
pub struct EventQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    sequence: AtomicU64,
    state_path: PathBuf,
}

impl EventQueue {
    /// Load the checkpoint from `state_path` (a missing file is not an
    /// error — a fresh engine has no prior checkpoint).
    pub fn load(state_path: PathBuf, dedup_capacity: usize) -> Self {
        let state = RuntimeState::load(&state_path).unwrap_or_else(|e| {
            error!("queue: failed to load checkpoint, starting fresh: {e}");
            RuntimeState::default()
        });
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                dedup_set: HashSet::new(),
                dedup_order: VecDeque::new(),
                dedup_capacity,
                state,
                closed: false,
            }),
            notify: Notify::new(),
            sequence: AtomicU64::new(0),
            state_path,
        }
    }

    pub fn checkpoint(&self) -> Option<String> {
        // Safe best-effort snapshot; callers needing the async-safe version
        // should await `checkpoint_async`. Kept sync for orchestrator setup.
        self.inner
            .try_lock()
            .ok()
            .and_then(|g| g.state.last_spoken_event_id.clone())
    }

    pub async fn checkpoint_async(&self) -> Option<String> {
        self.inner.lock().await.state.last_spoken_event_id.clone()
    }

    /// Admit an event: rejects exact-repeat ids (bounded FIFO dedup set) and
    /// anything matching the already-committed checkpoint.
    pub async fn admit(&self, event: Event) -> AdmitOutcome {
        let mut guard = self.inner.lock().await;

        if guard.state.last_spoken_event_id.as_deref() == Some(event.event_id.as_str()) {
            return AdmitOutcome::Duplicate;
        }
        if guard.dedup_set.contains(&event.event_id) {
            return AdmitOutcome::Duplicate;
        }

        if guard.dedup_order.len() >= guard.dedup_capacity {
            if let Some(oldest) = guard.dedup_order.pop_front() {
                guard.dedup_set.remove(&oldest);
            }
        }
        guard.dedup_set.insert(event.event_id.clone());
        guard.dedup_order.push_back(event.event_id.clone());

        let priority = event.priority();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        guard.heap.push(QueuedEvent {
            priority,
            sequence,
            event,
        });
        drop(guard);
        self.notify.notify_one();
        AdmitOutcome::Admitted
    }

    /// Returns the highest-priority pending event, waiting until one exists
    /// or the queue is closed (in which case returns `None`).
    pub async fn next(&self) -> Option<Event> {
        loop {
            {
                let mut guard = self.inner.lock().await;
                if let Some(queued) = guard.heap.pop() {
                    return Some(queued.event);
                }
                if guard.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Advance the checkpoint and persist it atomically.
    pub async fn commit(&self, event_id: &str, match_id: &str) -> Result<(), QueueError> {
        let mut guard = self.inner.lock().await;
        guard.state.match_id = Some(match_id.to_string());
        guard.state.last_spoken_event_id = Some(event_id.to_string());
        guard.state.last_update = chrono::Utc::now().timestamp();
        guard.state.persist(&self.state_path)?;
        Ok(())
    }

    pub async fn close(&self) {
        self.inner.lock().await.closed = true;
        self.notify.notify_waiters();
    }
}

pub type SharedEventQueue = Arc<EventQueue>;
