//! Periodic queue statistics sampling.
//!
//! [`StatsSampler`] runs as one background task. Every tick it asks a
//! [`QueueStatsSource`] for the full queue list, publishes it to the
//! [`SharedTelemetryStore`] and runs the alert policy over it. A failed cycle
//! is logged and recorded, the previous snapshot stays on screen, and the next
//! tick tries again.
//!
//! ```text
//! interval tick ─┐
//!                ├──▶ fetch() ──▶ publish_snapshot() ──▶ AlertEvaluator ──▶ AlertSink
//! refresh notify ┘        │
//!                         └─(error)──▶ record_fetch_failure()
//! ```

mod client;

pub use client::{decode_queues, ManagementClient, ManagementClientBuilder, DEFAULT_TIMEOUT};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alert::{AlertDecision, AlertEvaluator, AlertSink};
use crate::data::QueueSnapshot;
use crate::error::FetchError;
use crate::store::SharedTelemetryStore;

/// Default interval between sampling cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Anything that can produce a full queue listing.
#[async_trait]
pub trait QueueStatsSource: Send + Sync {
    /// Fetch the current queue list. Must not block longer than its own timeout.
    async fn fetch(&self) -> Result<Vec<QueueSnapshot>, FetchError>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;
}

/// The periodic sampling task.
pub struct StatsSampler {
    source: Arc<dyn QueueStatsSource>,
    store: SharedTelemetryStore,
    alerts: AlertEvaluator,
    sink: Arc<dyn AlertSink>,
    interval: Duration,
    refresh: Arc<Notify>,
}

impl StatsSampler {
    pub fn new(
        source: Arc<dyn QueueStatsSource>,
        store: SharedTelemetryStore,
        alerts: AlertEvaluator,
        sink: Arc<dyn AlertSink>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            alerts,
            sink,
            interval,
            refresh: Arc::new(Notify::new()),
        }
    }

    /// Handle for requesting an immediate cycle (e.g. on terminal resize).
    pub fn refresh_handle(&self) -> Arc<Notify> {
        self.refresh.clone()
    }

    /// Run one sampling cycle.
    pub async fn sample_once(&mut self) -> Result<AlertDecision, FetchError> {
        match self.source.fetch().await {
            Ok(queues) => {
                let decision = self.alerts.evaluate(&queues, Instant::now());
                let count = queues.len();
                let generation = self.store.publish_snapshot(queues);
                debug!(generation, queues = count, "Published queue snapshot");

                if let AlertDecision::Raise(ref names) = decision {
                    warn!(queues = ?names, "Error queue(s) detected");
                    self.store.record_alert(Local::now());
                    self.sink.fire(names);
                }
                Ok(decision)
            }
            Err(e) => {
                warn!(source = self.source.description(), error = %e, "Failed to sample queues");
                self.store.record_fetch_failure(e.to_string());
                Err(e)
            }
        }
    }

    /// Sample immediately, then every interval (or on refresh) until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let refresh = self.refresh.clone();

        info!(
            source = self.source.description(),
            interval = ?self.interval,
            "Sampler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = refresh.notified() => ticker.reset(),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.sample_once() => {}
            }
        }

        info!("Sampler stopped");
    }

    /// Spawn [`run`](Self::run) onto the current runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
