//! Historical depth tracking for sparklines and growth rates.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use super::snapshot::QueueSnapshot;

/// Maximum number of samples kept per queue.
const MAX_HISTORY_SIZE: usize = 60;

/// Ready-depth history per queue, one entry per sampling cycle.
#[derive(Debug, Clone, Default)]
pub struct History {
    /// Ready counts per queue identity.
    pub queue_ready: HashMap<String, VecDeque<u64>>,
    /// Timestamps of recorded samples.
    pub timestamps: VecDeque<Instant>,
    last_generation: Option<u64>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot list. Repeated calls for the same generation are ignored,
    /// so the render loop can call this on every tick.
    ///
    /// Queues missing from the list lose their history, so every retained
    /// series lines up with the most recent timestamps.
    pub fn record(&mut self, generation: u64, queues: &[QueueSnapshot], at: Instant) -> bool {
        if self.last_generation == Some(generation) {
            return false;
        }
        self.last_generation = Some(generation);

        let present: HashSet<String> = queues.iter().map(QueueSnapshot::identity).collect();
        self.queue_ready.retain(|identity, _| present.contains(identity));

        for queue in queues {
            let ready = self.queue_ready.entry(queue.identity()).or_default();
            ready.push_back(queue.counts.ready);
            if ready.len() > MAX_HISTORY_SIZE {
                ready.pop_front();
            }
        }

        self.timestamps.push_back(at);
        if self.timestamps.len() > MAX_HISTORY_SIZE {
            self.timestamps.pop_front();
        }
        true
    }

    /// Sparkline levels (0-7) for a queue's ready depth.
    ///
    /// Returns an empty Vec if there's not enough history.
    pub fn ready_sparkline(&self, identity: &str) -> Vec<u8> {
        let Some(values) = self.queue_ready.get(identity) else {
            return Vec::new();
        };
        if values.len() < 2 {
            return Vec::new();
        }

        let max = values.iter().copied().max().unwrap_or(0);
        let min = values.iter().copied().min().unwrap_or(0);
        let range = (max - min).max(1) as f64;

        values
            .iter()
            .map(|&v| {
                let normalized = ((v - min) as f64 / range * 7.0) as u8;
                normalized.min(7)
            })
            .collect()
    }

    /// Net change of ready depth per second between the last two samples.
    ///
    /// Returns None if there's not enough history to calculate a rate.
    pub fn ready_growth(&self, identity: &str) -> Option<f64> {
        let ready = self.queue_ready.get(identity)?;
        if ready.len() < 2 || self.timestamps.len() < 2 {
            return None;
        }

        let current = *ready.back()? as i64;
        let previous = *ready.get(ready.len() - 2)? as i64;

        let current_time = self.timestamps.back()?;
        let previous_time = self.timestamps.get(self.timestamps.len() - 2)?;
        let elapsed = current_time.duration_since(*previous_time).as_secs_f64();

        if elapsed > 0.0 {
            Some((current - previous) as f64 / elapsed)
        } else {
            None
        }
    }
}
