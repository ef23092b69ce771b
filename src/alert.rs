//! Error-queue alerting with a cooldown.
//!
//! A queue is alerting when its name starts or ends with `error`, ignoring
//! case. [`AlertEvaluator`] decides whether to raise; an [`AlertSink`] carries
//! out the side effect without blocking the caller.

use std::io::Write;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::data::QueueSnapshot;

/// Token matched at either end of a queue name.
const ERROR_TOKEN: &str = "error";

/// Default minimum time between two alerts.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Whether a queue name matches the error pattern.
pub fn is_error_queue(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.starts_with(ERROR_TOKEN) || lower.ends_with(ERROR_TOKEN)
}

/// Identities of all alerting queues in a snapshot.
pub fn alerting_queues(queues: &[QueueSnapshot]) -> Vec<String> {
    queues
        .iter()
        .filter(|q| is_error_queue(&q.name))
        .map(QueueSnapshot::identity)
        .collect()
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    /// Fire the alert for these queues.
    Raise(Vec<String>),
    /// Nothing alerting, or still cooling down.
    Suppress,
}

impl AlertDecision {
    pub fn is_raise(&self) -> bool {
        matches!(self, AlertDecision::Raise(_))
    }
}

/// Cooldown-gated alert policy. Each instance owns its own clock.
#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    cooldown: Duration,
    last_alert: Option<Instant>,
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl AlertEvaluator {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_alert(&self) -> Option<Instant> {
        self.last_alert
    }

    /// Decide whether `queues` warrants an alert at `now`.
    ///
    /// Raising records `now` as the last alert time.
    pub fn evaluate(&mut self, queues: &[QueueSnapshot], now: Instant) -> AlertDecision {
        let alerting = alerting_queues(queues);
        if alerting.is_empty() {
            return AlertDecision::Suppress;
        }

        if let Some(last) = self.last_alert {
            if now.saturating_duration_since(last) < self.cooldown {
                debug!(queues = alerting.len(), "Alert suppressed by cooldown");
                return AlertDecision::Suppress;
            }
        }

        self.last_alert = Some(now);
        AlertDecision::Raise(alerting)
    }
}

/// Side effect performed when an alert is raised.
///
/// Implementations must return promptly; slow work belongs on a detached task.
pub trait AlertSink: Send + Sync {
    fn fire(&self, queues: &[String]);
}

/// Rings the terminal bell from a detached blocking task.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl AlertSink for TerminalBell {
    fn fire(&self, queues: &[String]) {
        let count = queues.len();
        let ring = move || {
            let mut stdout = std::io::stdout();
            if let Err(e) = stdout.write_all(b"\x07").and_then(|_| stdout.flush()) {
                warn!(error = %e, queues = count, "Failed to ring terminal bell");
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(ring);
            }
            Err(_) => {
                std::thread::spawn(ring);
            }
        }
    }
}

/// Sink used when the audible cue is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl AlertSink for SilentSink {
    fn fire(&self, _queues: &[String]) {}
}
