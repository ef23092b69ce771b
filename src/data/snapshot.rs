//! Point-in-time queue records produced by the sampler.

use serde::Serialize;

/// Depth counters for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub total: u64,
    pub ready: u64,
    pub unacked: u64,
}

/// Cumulative message counters and their current rates (msg/s).
///
/// Rates are `None` when the broker has not reported them yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QueueRates {
    pub publish: u64,
    pub publish_rate: Option<f64>,
    pub deliver_get: u64,
    pub deliver_get_rate: Option<f64>,
    pub ack: u64,
    pub ack_rate: Option<f64>,
}

/// One queue at one sampling instant. Never mutated once built; a new
/// sampling cycle replaces the whole list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub name: String,
    pub vhost: String,
    pub queue_type: String,
    pub state: String,
    pub features: Vec<String>,
    pub consumers: u32,
    pub counts: QueueCounts,
    pub rates: QueueRates,
}

/// Virtual-host qualified identity of `name`, e.g. `/orders` or `shop/orders`.
pub fn queue_identity(vhost: &str, name: &str) -> String {
    if vhost.ends_with('/') {
        format!("{}{}", vhost, name)
    } else {
        format!("{}/{}", vhost, name)
    }
}

impl QueueSnapshot {
    /// See [`queue_identity`].
    pub fn identity(&self) -> String {
        queue_identity(&self.vhost, &self.name)
    }

    /// Whether the broker reports the queue as running.
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}
