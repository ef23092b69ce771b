//! Live consumption of user-selected queues.
//!
//! A monitoring session declares its full set of target queues up front.
//! Each queue gets its own task (see [`task`]) running the
//! Starting/Running/Retrying/Stopped state machine. Tasks never write to the
//! store directly: they send [`ConsumerEvent`]s to a per-session pump, which
//! is the only writer of that session's buffers.
//!
//! ```text
//! ┌──────────────┐  ConsumerEvent  ┌──────┐  apply()  ┌──────────────────────┐
//! │ task: q1     │────────────────▶│      │──────────▶│                      │
//! ├──────────────┤      mpsc       │ pump │           │ SharedTelemetryStore │
//! │ task: q2     │────────────────▶│      │           │                      │
//! └──────────────┘                 └──────┘           └──────────────────────┘
//! ```
//!
//! Queues cannot be added to a running session; starting a new session
//! replaces the old one.

mod broker;
mod task;

pub use broker::{Broker, BrokerChannel, Delivery, DeliveryStream, LapinBroker};

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::store::{ConsumerEvent, SharedTelemetryStore};
use task::QueueConsumer;

/// Timing for the consumer tasks.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerSettings {
    /// Wait between a recoverable failure and the next attempt.
    pub retry_delay: Duration,
    /// Upper bound for each broker call.
    pub op_timeout: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            op_timeout: Duration::from_secs(10),
        }
    }
}

struct MonitorSession {
    id: u64,
    queues: Vec<String>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    pump: JoinHandle<()>,
}

/// Owns the broker connection and the tasks of the current session.
pub struct ConsumerManager {
    broker: Arc<dyn Broker>,
    store: SharedTelemetryStore,
    settings: ConsumerSettings,
    shutdown: CancellationToken,
    runtime: Handle,
    session: Option<MonitorSession>,
}

impl std::fmt::Debug for ConsumerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerManager")
            .field("broker", &self.broker)
            .field("settings", &self.settings)
            .field("queues", &self.active_queues())
            .finish()
    }
}

impl ConsumerManager {
    /// Create a manager. Sessions run on `runtime` and are cancelled
    /// together with `shutdown`.
    pub fn new(
        broker: Arc<dyn Broker>,
        store: SharedTelemetryStore,
        settings: ConsumerSettings,
        shutdown: CancellationToken,
        runtime: Handle,
    ) -> Self {
        Self {
            broker,
            store,
            settings,
            shutdown,
            runtime,
            session: None,
        }
    }

    /// Start monitoring `queues`, replacing any running session.
    ///
    /// Duplicate and empty names are ignored. Returns the new session id.
    pub fn start_session(&mut self, queues: Vec<String>) -> u64 {
        self.stop_session();

        let mut targets: Vec<String> = Vec::with_capacity(queues.len());
        for name in queues {
            if !name.is_empty() && !targets.contains(&name) {
                targets.push(name);
            }
        }

        let id = self.store.begin_session(&targets);
        let cancel = self.shutdown.child_token();
        let (tx, rx) = mpsc::unbounded_channel();

        let pump = self.runtime.spawn(pump(self.store.clone(), rx));
        let tasks = targets
            .iter()
            .map(|queue| {
                let consumer = QueueConsumer {
                    queue: queue.clone(),
                    session: id,
                    broker: self.broker.clone(),
                    events: tx.clone(),
                    cancel: cancel.clone(),
                    retry_delay: self.settings.retry_delay,
                    op_timeout: self.settings.op_timeout,
                };
                self.runtime.spawn(consumer.run())
            })
            .collect();

        info!(session = id, queues = ?targets, broker = self.broker.description(), "Monitoring session started");
        self.session = Some(MonitorSession {
            id,
            queues: targets,
            cancel,
            tasks,
            pump,
        });
        id
    }

    /// Cancel the current session's tasks. Their final state stays in the store.
    pub fn stop_session(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                session.cancel.cancel();
                info!(session = session.id, "Monitoring session stopped");
                true
            }
            None => false,
        }
    }

    /// Whether a session is currently running.
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Queues of the current session, in the order they were declared.
    pub fn active_queues(&self) -> &[String] {
        self.session.as_ref().map(|s| s.queues.as_slice()).unwrap_or(&[])
    }

    /// Whether the broker transport is still usable.
    pub fn broker_connected(&self) -> bool {
        self.broker.is_connected()
    }

    /// Cancel everything and wait up to `grace` for tasks to finish.
    ///
    /// Returns false if some task was still running when the grace period ended.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        let Some(session) = self.session.take() else {
            return true;
        };
        session.cancel.cancel();

        let mut handles = session.tasks;
        handles.push(session.pump);
        match tokio::time::timeout(grace, join_all(handles)).await {
            Ok(_) => true,
            Err(_) => {
                warn!(session = session.id, "Consumer tasks did not stop within {:?}", grace);
                false
            }
        }
    }
}

/// Apply consumer events to the store until every task has hung up.
async fn pump(store: SharedTelemetryStore, mut events: mpsc::UnboundedReceiver<ConsumerEvent>) {
    while let Some(event) = events.recv().await {
        store.apply(event);
    }
}
