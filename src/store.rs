//! The shared telemetry store.
//!
//! Single source of truth read by the render loop and written by the sampler
//! and the consumer tasks.
//!
//! ## Locking discipline
//!
//! - The snapshot is an `Arc<SnapshotState>` behind an `RwLock`, next to the
//!   sampler health it goes with. Publishing swaps the whole `Arc` and clears
//!   the fetch error under the same lock, so a reader holds either the old list
//!   or the new one, never a mix, and never a fresh list with a stale error.
//! - Monitored queues live in a map that is only rebuilt when a session
//!   begins. Each entry owns its own `Mutex`, so appends for different queues
//!   only share the map's read lock and never contend with each other.
//! - [`SharedTelemetryStore::read_view`] holds the map's read lock for the
//!   whole copy, which pins the set of keys. It locks each entry once, so each
//!   buffer is copied whole. Buffered messages are reference counted, so the
//!   copy never duplicates payloads.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};

use crate::data::{ConsumptionBuffer, QueueSnapshot, ReceivedMessage, DEFAULT_BUFFER_CAPACITY};

/// Lifecycle of one per-queue consumer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum ConsumerStatus {
    Starting,
    Running,
    Retrying,
    Stopped,
}

impl ConsumerStatus {
    /// Returns the display label for this status.
    pub fn label(&self) -> &'static str {
        match self {
            ConsumerStatus::Starting => "starting",
            ConsumerStatus::Running => "running",
            ConsumerStatus::Retrying => "retrying",
            ConsumerStatus::Stopped => "stopped",
        }
    }
}

/// Last reported state of a consumer task.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConsumerTaskState {
    pub queue: String,
    pub status: ConsumerStatus,
    pub last_error: Option<String>,
    /// Number of Starting phases entered so far.
    pub attempts: u32,
    pub updated_at: DateTime<Local>,
}

impl ConsumerTaskState {
    fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            status: ConsumerStatus::Starting,
            last_error: None,
            attempts: 0,
            updated_at: Local::now(),
        }
    }
}

/// Something a consumer task reports back to the store.
#[derive(Debug, Clone)]
pub enum ConsumerEvent {
    Status {
        session: u64,
        queue: String,
        status: ConsumerStatus,
        error: Option<String>,
        attempt: u32,
    },
    Delivery {
        session: u64,
        message: ReceivedMessage,
    },
}

/// One published sampling result.
#[derive(Debug, Clone, Default)]
pub struct SnapshotState {
    pub queues: Vec<QueueSnapshot>,
    /// Incremented on every publish; 0 means nothing was published yet.
    pub generation: u64,
    pub fetched_at: Option<DateTime<Local>>,
}

/// Sampler health as shown next to the (possibly stale) snapshot.
#[derive(Debug, Clone, Default)]
pub struct SamplerHealth {
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_alert_at: Option<DateTime<Local>>,
}

/// Everything the renderer needs, copied out of the store in one call.
#[derive(Debug, Clone)]
pub struct TelemetryView {
    pub snapshot: Arc<SnapshotState>,
    pub session: u64,
    pub buffers: BTreeMap<String, ConsumptionBuffer>,
    pub consumers: BTreeMap<String, ConsumerTaskState>,
    pub sampler: SamplerHealth,
}

impl TelemetryView {
    pub fn queues(&self) -> &[QueueSnapshot] {
        &self.snapshot.queues
    }
}

#[derive(Debug)]
struct MonitoredQueue {
    buffer: ConsumptionBuffer,
    task: ConsumerTaskState,
}

#[derive(Debug, Default)]
struct Session {
    id: u64,
    queues: BTreeMap<String, Arc<Mutex<MonitoredQueue>>>,
}

#[derive(Debug, Default)]
struct Published {
    snapshot: Arc<SnapshotState>,
    sampler: SamplerHealth,
}

#[derive(Debug)]
struct StoreInner {
    published: RwLock<Published>,
    session: RwLock<Session>,
    buffer_capacity: usize,
}

/// Cloneable handle to the shared telemetry state.
#[derive(Debug, Clone)]
pub struct SharedTelemetryStore {
    inner: Arc<StoreInner>,
}

impl Default for SharedTelemetryStore {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl SharedTelemetryStore {
    /// Create an empty store whose buffers hold `buffer_capacity` messages each.
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                published: RwLock::new(Published::default()),
                session: RwLock::new(Session::default()),
                buffer_capacity,
            }),
        }
    }

    /// Replace the current snapshot list wholesale.
    pub fn publish_snapshot(&self, queues: Vec<QueueSnapshot>) -> u64 {
        let mut published = self.inner.published.write();
        let generation = published.snapshot.generation + 1;
        published.snapshot = Arc::new(SnapshotState {
            queues,
            generation,
            fetched_at: Some(Local::now()),
        });
        published.sampler.last_error = None;
        published.sampler.consecutive_failures = 0;
        generation
    }

    /// Note a failed sampling cycle. The previous snapshot stays in place.
    pub fn record_fetch_failure(&self, error: String) {
        let mut published = self.inner.published.write();
        published.sampler.last_error = Some(error);
        published.sampler.consecutive_failures =
            published.sampler.consecutive_failures.saturating_add(1);
    }

    /// Note that an alert was raised.
    pub fn record_alert(&self, at: DateTime<Local>) {
        self.inner.published.write().sampler.last_alert_at = Some(at);
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<SnapshotState> {
        self.inner.published.read().snapshot.clone()
    }

    /// Start a new monitoring session over `queues`, discarding the previous
    /// session's buffers. Returns the session id to tag events with.
    pub fn begin_session(&self, queues: &[String]) -> u64 {
        let mut session = self.inner.session.write();
        session.id += 1;
        session.queues = queues
            .iter()
            .map(|name| {
                let monitored = MonitoredQueue {
                    buffer: ConsumptionBuffer::with_capacity(self.inner.buffer_capacity),
                    task: ConsumerTaskState::new(name),
                };
                (name.clone(), Arc::new(Mutex::new(monitored)))
            })
            .collect();
        session.id
    }

    /// Id of the current session (0 before the first one).
    pub fn session_id(&self) -> u64 {
        self.inner.session.read().id
    }

    /// Append a message to the current session's buffer for `queue`.
    ///
    /// Returns false if the queue is not monitored in the current session.
    pub fn append_message(&self, queue: &str, message: ReceivedMessage) -> bool {
        let session = self.inner.session.read();
        match session.queues.get(queue) {
            Some(entry) => {
                entry.lock().buffer.push(message);
                true
            }
            None => false,
        }
    }

    /// Apply a consumer event. Events from a superseded session are dropped.
    pub fn apply(&self, event: ConsumerEvent) -> bool {
        let session = self.inner.session.read();
        match event {
            ConsumerEvent::Delivery {
                session: id,
                message,
            } => {
                if id != session.id {
                    return false;
                }
                match session.queues.get(&message.queue) {
                    Some(entry) => {
                        entry.lock().buffer.push(message);
                        true
                    }
                    None => false,
                }
            }
            ConsumerEvent::Status {
                session: id,
                queue,
                status,
                error,
                attempt,
            } => {
                if id != session.id {
                    return false;
                }
                let Some(entry) = session.queues.get(&queue) else {
                    return false;
                };
                let mut monitored = entry.lock();
                monitored.task.status = status;
                monitored.task.attempts = attempt;
                monitored.task.updated_at = Local::now();
                // A clean stop keeps the error that led up to it visible.
                if error.is_some() || status == ConsumerStatus::Running {
                    monitored.task.last_error = error;
                }
                true
            }
        }
    }

    /// Consistent copy of everything the renderer shows.
    pub fn read_view(&self) -> TelemetryView {
        let (snapshot, sampler) = {
            let published = self.inner.published.read();
            (published.snapshot.clone(), published.sampler.clone())
        };

        let session = self.inner.session.read();
        let mut buffers = BTreeMap::new();
        let mut consumers = BTreeMap::new();
        for (name, entry) in &session.queues {
            let monitored = entry.lock();
            buffers.insert(name.clone(), monitored.buffer.clone());
            consumers.insert(name.clone(), monitored.task.clone());
        }

        TelemetryView {
            snapshot,
            session: session.id,
            buffers,
            consumers,
            sampler,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::data::QueueCounts;

    fn queue(name: &str, ready: u64) -> QueueSnapshot {
        QueueSnapshot {
            name: name.to_string(),
            vhost: "/".to_string(),
            counts: QueueCounts {
                total: ready,
                ready,
                unacked: 0,
            },
            ..Default::default()
        }
    }

    fn message(queue: &str, body: &str) -> ReceivedMessage {
        ReceivedMessage {
            queue: queue.to_string(),
            exchange: String::new(),
            routing_key: queue.to_string(),
            redelivered: false,
            payload: body.as_bytes().to_vec(),
            received_at: Local::now(),
        }
    }

    #[test]
    fn test_publish_then_read_returns_same_list() {
        let store = SharedTelemetryStore::default();
        let queues = vec![queue("orders", 3), queue("payments", 0)];

        let generation = store.publish_snapshot(queues.clone());
        let view = store.read_view();

        assert_eq!(generation, 1);
        assert_eq!(view.snapshot.generation, 1);
        assert_eq!(view.queues(), queues.as_slice());
        assert!(view.snapshot.fetched_at.is_some());
    }

    #[test]
    fn test_publish_visible_while_appends_run() {
        let store = SharedTelemetryStore::default();
        let names: Vec<String> = (0..4).map(|i| format!("q{}", i)).collect();
        store.begin_session(&names);

        let writers: Vec<_> = names
            .iter()
            .map(|name| {
                let store = store.clone();
                let name = name.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        store.append_message(&name, message(&name, &i.to_string()));
                    }
                })
            })
            .collect();

        for round in 0..200u64 {
            let published: Vec<QueueSnapshot> =
                (0..10).map(|i| queue(&format!("r{}-{}", round, i), round)).collect();
            store.publish_snapshot(published.clone());
            let view = store.read_view();
            assert_eq!(view.queues(), published.as_slice());
        }

        for writer in writers {
            writer.join().unwrap();
        }
    }

    #[test]
    fn test_reader_never_sees_mixed_snapshot() {
        let store = SharedTelemetryStore::default();
        let publisher = {
            let store = store.clone();
            thread::spawn(move || {
                for round in 1..=300u64 {
                    let list = (0..20).map(|i| queue(&format!("q{}", i), round)).collect();
                    store.publish_snapshot(list);
                }
            })
        };

        for _ in 0..300 {
            let view = store.read_view();
            let rounds: Vec<u64> = view.queues().iter().map(|q| q.counts.ready).collect();
            if let Some(first) = rounds.first() {
                assert!(rounds.iter().all(|r| r == first), "mixed cycles: {:?}", rounds);
                assert_eq!(*first, view.snapshot.generation);
            }
        }
        publisher.join().unwrap();
    }

    #[test]
    fn test_fetch_error_always_matches_its_snapshot() {
        let store = SharedTelemetryStore::default();
        let sampler = {
            let store = store.clone();
            thread::spawn(move || {
                for round in 1..=300u64 {
                    store.record_fetch_failure(format!("cycle {}", round));
                    store.publish_snapshot(vec![queue("orders", round)]);
                }
            })
        };

        for _ in 0..300 {
            let view = store.read_view();
            if let Some(error) = view.sampler.last_error {
                // A failure is recorded right after the previous publish
                let failed: u64 = error.trim_start_matches("cycle ").parse().unwrap();
                assert_eq!(view.snapshot.generation, failed - 1);
            }
        }
        sampler.join().unwrap();
    }

    #[test]
    fn test_read_view_shares_buffered_payloads() {
        let store = SharedTelemetryStore::default();
        store.begin_session(&["q1".to_string()]);
        store.append_message("q1", message("q1", "large body"));

        let first = store.read_view();
        let second = store.read_view();
        let a = first.buffers["q1"].latest().unwrap();
        let b = second.buffers["q1"].latest().unwrap();
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_buffers_do_not_cross_contaminate() {
        let store = SharedTelemetryStore::default();
        store.begin_session(&["q1".to_string(), "q2".to_string()]);

        for body in ["a", "b", "c"] {
            assert!(store.append_message("q1", message("q1", body)));
        }

        let view = store.read_view();
        let q1: Vec<String> = view.buffers["q1"].iter().map(|m| m.payload_text()).collect();
        assert_eq!(q1, vec!["a", "b", "c"]);
        assert!(view.buffers["q2"].is_empty());
    }

    #[test]
    fn test_unmonitored_queue_is_ignored() {
        let store = SharedTelemetryStore::default();
        store.begin_session(&["q1".to_string()]);
        assert!(!store.append_message("other", message("other", "x")));
        assert!(!store.read_view().buffers.contains_key("other"));
    }

    #[test]
    fn test_events_from_old_session_are_dropped() {
        let store = SharedTelemetryStore::default();
        let old = store.begin_session(&["q1".to_string()]);
        let new = store.begin_session(&["q1".to_string()]);
        assert_ne!(old, new);

        let stale = ConsumerEvent::Delivery {
            session: old,
            message: message("q1", "late"),
        };
        assert!(!store.apply(stale));

        let fresh = ConsumerEvent::Delivery {
            session: new,
            message: message("q1", "on time"),
        };
        assert!(store.apply(fresh));

        let view = store.read_view();
        assert_eq!(view.buffers["q1"].len(), 1);
        assert_eq!(view.session, new);
    }

    #[test]
    fn test_status_events_update_task_state() {
        let store = SharedTelemetryStore::default();
        let session = store.begin_session(&["q1".to_string()]);

        store.apply(ConsumerEvent::Status {
            session,
            queue: "q1".to_string(),
            status: ConsumerStatus::Retrying,
            error: Some("NOT_FOUND".to_string()),
            attempt: 2,
        });
        let task = &store.read_view().consumers["q1"];
        assert_eq!(task.status, ConsumerStatus::Retrying);
        assert_eq!(task.attempts, 2);
        assert_eq!(task.last_error.as_deref(), Some("NOT_FOUND"));

        // A clean stop keeps the last error around
        store.apply(ConsumerEvent::Status {
            session,
            queue: "q1".to_string(),
            status: ConsumerStatus::Stopped,
            error: None,
            attempt: 2,
        });
        let task = &store.read_view().consumers["q1"];
        assert_eq!(task.status, ConsumerStatus::Stopped);
        assert_eq!(task.last_error.as_deref(), Some("NOT_FOUND"));
    }

    #[test]
    fn test_fetch_failure_keeps_previous_snapshot() {
        let store = SharedTelemetryStore::default();
        store.publish_snapshot(vec![queue("orders", 3)]);
        store.record_fetch_failure("Request timed out".to_string());
        store.record_fetch_failure("Request timed out".to_string());

        let view = store.read_view();
        assert_eq!(view.queues().len(), 1);
        assert_eq!(view.sampler.consecutive_failures, 2);
        assert_eq!(view.sampler.last_error.as_deref(), Some("Request timed out"));

        store.publish_snapshot(vec![]);
        let view = store.read_view();
        assert!(view.sampler.last_error.is_none());
        assert_eq!(view.sampler.consecutive_failures, 0);
    }

    #[test]
    fn test_buffer_capacity_applies_to_sessions() {
        let store = SharedTelemetryStore::new(2);
        store.begin_session(&["q1".to_string()]);
        for body in ["a", "b", "c"] {
            store.append_message("q1", message("q1", body));
        }
        let view = store.read_view();
        assert_eq!(view.buffers["q1"].len(), 2);
        assert_eq!(view.buffers["q1"].evicted(), 1);
    }
}
