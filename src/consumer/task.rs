//! The per-queue consumer task.
//!
//! ```text
//!            ┌────────────── retry delay ───────────────┐
//!            ▼                                          │
//!       ┌──────────┐  declare + consume ok  ┌─────────┐ │
//!  ───▶ │ Starting │ ─────────────────────▶ │ Running │ │
//!       └──────────┘                        └─────────┘ │
//!         │      │ failure, transport ok         │      │
//!         │      └──────────────▶ ┌──────────┐ ◀─┘      │
//!         │                       │ Retrying │ ─────────┘
//!         │ transport closed      └──────────┘
//!         ▼         (or cancelled from any state)
//!       ┌─────────┐
//!       │ Stopped │
//!       └─────────┘
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::broker::{Broker, BrokerChannel, Delivery};
use crate::data::ReceivedMessage;
use crate::error::ConsumeError;
use crate::store::{ConsumerEvent, ConsumerStatus};

/// How one Starting/Running cycle ended.
enum Outcome {
    Cancelled,
    Failed(ConsumeError),
}

/// Owns the consumption of exactly one queue for one session.
pub(crate) struct QueueConsumer {
    pub(crate) queue: String,
    pub(crate) session: u64,
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) events: mpsc::UnboundedSender<ConsumerEvent>,
    pub(crate) cancel: CancellationToken,
    pub(crate) retry_delay: Duration,
    pub(crate) op_timeout: Duration,
}

impl QueueConsumer {
    pub(crate) async fn run(self) {
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);
            self.report(ConsumerStatus::Starting, None, attempt);

            let error = match self.attempt(attempt).await {
                Outcome::Cancelled => break,
                Outcome::Failed(error) => error,
            };

            if error.is_unrecoverable() {
                warn!(queue = %self.queue, error = %error, "Consumer stopped");
                self.report(ConsumerStatus::Stopped, Some(error.to_string()), attempt);
                return;
            }

            info!(
                queue = %self.queue,
                error = %error,
                delay = ?self.retry_delay,
                "Consumer retrying"
            );
            self.report(ConsumerStatus::Retrying, Some(error.to_string()), attempt);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        debug!(queue = %self.queue, "Consumer cancelled");
        self.report(ConsumerStatus::Stopped, None, attempt);
    }

    async fn attempt(&self, attempt: u32) -> Outcome {
        let channel = match self.guarded("open channel", self.broker.open_channel()).await {
            Ok(channel) => channel,
            Err(outcome) => return outcome,
        };

        let outcome = self.consume_on(channel.as_ref(), attempt).await;

        // Bounded, so a wedged channel cannot hold up shutdown.
        if tokio::time::timeout(self.op_timeout, channel.close()).await.is_err() {
            debug!(queue = %self.queue, "Timed out closing channel");
        }
        outcome
    }

    async fn consume_on(&self, channel: &dyn BrokerChannel, attempt: u32) -> Outcome {
        if let Err(outcome) = self.guarded("declare", channel.declare_passive(&self.queue)).await {
            return outcome;
        }

        let tag = format!("queuewatch-{}-{}-{}", self.session, self.queue, attempt);
        let mut deliveries = match self.guarded("consume", channel.consume(&self.queue, &tag)).await
        {
            Ok(deliveries) => deliveries,
            Err(outcome) => return outcome,
        };

        info!(queue = %self.queue, attempt, "Consumer running");
        self.report(ConsumerStatus::Running, None, attempt);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Outcome::Cancelled,
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => self.deliver(delivery),
                    Some(Err(error)) => return Outcome::Failed(self.classify(error)),
                    None => {
                        let ended = ConsumeError::Subscription("delivery stream ended".to_string());
                        return Outcome::Failed(self.classify(ended));
                    }
                },
            }
        }
    }

    /// Run one broker operation under the timeout, giving way to cancellation.
    async fn guarded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, ConsumeError>>,
    ) -> Result<T, Outcome> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Outcome::Cancelled),
            result = tokio::time::timeout(self.op_timeout, fut) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(Outcome::Failed(self.classify(error))),
                Err(_) => Err(Outcome::Failed(self.classify(ConsumeError::Timeout {
                    operation,
                    timeout: self.op_timeout,
                }))),
            },
        }
    }

    /// Any failure on a dead transport is a transport failure.
    fn classify(&self, error: ConsumeError) -> ConsumeError {
        if error.is_unrecoverable() || self.broker.is_connected() {
            error
        } else {
            ConsumeError::TransportClosed(error.to_string())
        }
    }

    fn deliver(&self, delivery: Delivery) {
        let message = ReceivedMessage {
            queue: self.queue.clone(),
            exchange: delivery.exchange,
            routing_key: delivery.routing_key,
            redelivered: delivery.redelivered,
            payload: delivery.payload,
            received_at: Local::now(),
        };
        let _ = self.events.send(ConsumerEvent::Delivery {
            session: self.session,
            message,
        });
    }

    fn report(&self, status: ConsumerStatus, error: Option<String>, attempt: u32) {
        // A closed pump means the session is already being torn down.
        let _ = self.events.send(ConsumerEvent::Status {
            session: self.session,
            queue: self.queue.clone(),
            status,
            error,
            attempt,
        });
    }
}
