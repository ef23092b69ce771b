//! Broker abstraction used by the consumer tasks.
//!
//! The tasks only need three operations (open a channel, passively declare a
//! queue, consume from it) plus a way to tell whether the transport is still
//! alive. [`LapinBroker`] implements them over an AMQP 0-9-1 connection.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use lapin::options::{BasicConsumeOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::{Channel, Connection, ConnectionProperties};
use tracing::{debug, info};

use crate::config::BrokerSettings;
use crate::error::{ConnectError, ConsumeError};

/// A message as handed over by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub payload: Vec<u8>,
}

/// Stream of deliveries for one subscription.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, ConsumeError>>;

/// A connection that can hand out channels.
#[async_trait]
pub trait Broker: Send + Sync + Debug {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>, ConsumeError>;

    /// Whether the underlying transport is still usable.
    fn is_connected(&self) -> bool;

    /// Returns a human-readable description of the broker.
    fn description(&self) -> &str;
}

/// One channel, used by exactly one consumer task.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Existence check that never creates the queue.
    async fn declare_passive(&self, queue: &str) -> Result<(), ConsumeError>;

    /// Subscribe with automatic acknowledgement.
    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> Result<DeliveryStream, ConsumeError>;

    /// Release the subscription and the channel. Never fails.
    async fn close(&self);
}

/// [`Broker`] backed by a lapin connection.
pub struct LapinBroker {
    connection: Connection,
    description: String,
}

impl Debug for LapinBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LapinBroker")
            .field("endpoint", &self.description)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl LapinBroker {
    /// Connect to the broker, giving up after `timeout`.
    pub async fn connect(settings: &BrokerSettings, timeout: Duration) -> Result<Self, ConnectError> {
        let endpoint = settings.amqp_endpoint();
        let uri = AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: settings.username.clone(),
                    password: settings.password.clone(),
                },
                host: settings.host.clone(),
                port: settings.port,
            },
            vhost: settings.vhost.clone(),
            ..Default::default()
        };

        let connect = Connection::connect_uri(uri, ConnectionProperties::default());
        let connection = match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                return Err(ConnectError::Refused {
                    endpoint,
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(ConnectError::Timeout { endpoint, timeout }),
        };

        info!(endpoint = %endpoint, "Connected to broker");
        Ok(Self {
            connection,
            description: endpoint,
        })
    }

    /// Close the connection. Errors are ignored: we are leaving anyway.
    pub async fn close(&self) {
        if self.is_connected() {
            if let Err(e) = self.connection.close(200, "queuewatch shutting down").await {
                debug!(error = %e, "Error closing broker connection");
            }
        }
    }

    fn classify(&self, error: lapin::Error) -> ConsumeError {
        if self.is_connected() {
            ConsumeError::Subscription(error.to_string())
        } else {
            ConsumeError::TransportClosed(error.to_string())
        }
    }
}

#[async_trait]
impl Broker for LapinBroker {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>, ConsumeError> {
        let channel = self.connection.create_channel().await.map_err(|e| self.classify(e))?;
        Ok(Box::new(LapinChannel { channel }))
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    fn description(&self) -> &str {
        &self.description
    }
}

struct LapinChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    async fn declare_passive(&self, queue: &str) -> Result<(), ConsumeError> {
        let options = QueueDeclareOptions {
            passive: true,
            ..Default::default()
        };
        self.channel
            .queue_declare(queue, options, FieldTable::default())
            .await
            .map(|_| ())
            .map_err(|e| ConsumeError::QueueUnavailable {
                queue: queue.to_string(),
                reason: e.to_string(),
            })
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, ConsumeError> {
        let options = BasicConsumeOptions {
            no_ack: true,
            ..Default::default()
        };
        let consumer = self
            .channel
            .basic_consume(queue, consumer_tag, options, FieldTable::default())
            .await
            .map_err(|e| ConsumeError::Subscription(e.to_string()))?;

        let deliveries = consumer.map(|item| {
            item.map(|delivery| Delivery {
                exchange: delivery.exchange.as_str().to_string(),
                routing_key: delivery.routing_key.as_str().to_string(),
                redelivered: delivery.redelivered,
                payload: delivery.data,
            })
            .map_err(|e| ConsumeError::Subscription(e.to_string()))
        });
        Ok(deliveries.boxed())
    }

    async fn close(&self) {
        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(200, "consumer stopped").await {
                debug!(error = %e, "Error closing channel");
            }
        }
    }
}
