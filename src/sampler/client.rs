//! RabbitMQ Management HTTP API client.
//!
//! Issues `GET /api/queues` with basic auth and decodes the response into
//! [`QueueSnapshot`] rows.
//!
//! ## Example
//!
//! ```rust,no_run
//! use queuewatch::sampler::ManagementClient;
//!
//! # tokio_test::block_on(async {
//! let client = ManagementClient::builder()
//!     .endpoint("http://localhost:15672")
//!     .credentials("guest", "guest")
//!     .build()
//!     .unwrap();
//!
//! for queue in client.fetch_queues().await.unwrap() {
//!     println!("{}: {} ready", queue.identity(), queue.counts.ready);
//! }
//! # });
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};

use super::QueueStatsSource;
use crate::data::{QueueCounts, QueueRates, QueueSnapshot};
use crate::error::FetchError;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the management API. Uses its own HTTP connection pool,
/// independent of the AMQP connection.
#[derive(Debug, Clone)]
pub struct ManagementClient {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
    description: String,
}

impl ManagementClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> ManagementClientBuilder {
        ManagementClientBuilder::default()
    }

    /// URL of the queue listing.
    pub fn queues_url(&self) -> String {
        format!("{}/api/queues", self.endpoint)
    }

    /// Fetch and decode every queue visible to the configured user.
    pub async fn fetch_queues(&self) -> Result<Vec<QueueSnapshot>, FetchError> {
        let response = self
            .client
            .get(self.queues_url())
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(FetchError::Auth("Invalid credentials".to_string()));
        }

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        decode_queues(&body)
    }
}

#[async_trait]
impl QueueStatsSource for ManagementClient {
    async fn fetch(&self) -> Result<Vec<QueueSnapshot>, FetchError> {
        self.fetch_queues().await
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Builder for ManagementClient.
#[derive(Debug, Default)]
pub struct ManagementClientBuilder {
    endpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<Duration>,
}

impl ManagementClientBuilder {
    /// Set the Management API endpoint (e.g., "http://localhost:15672").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the username and password for basic authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ManagementClient, FetchError> {
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to build HTTP client: {}", e)))?;

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| "http://localhost:15672".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(ManagementClient {
            client,
            description: format!("mgmt: {}", endpoint),
            endpoint,
            username: self.username.unwrap_or_else(|| "guest".to_string()),
            password: self.password.unwrap_or_else(|| "guest".to_string()),
        })
    }
}

/// Decode a `GET /api/queues` body.
pub fn decode_queues(body: &[u8]) -> Result<Vec<QueueSnapshot>, FetchError> {
    let queues: Vec<QueueInfo> =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(queues.into_iter().map(QueueSnapshot::from).collect())
}

/// Queue information from the RabbitMQ Management API.
#[derive(Debug, Deserialize)]
struct QueueInfo {
    name: String,
    #[serde(default)]
    vhost: String,
    #[serde(default, rename = "type")]
    queue_type: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    durable: bool,
    #[serde(default)]
    auto_delete: bool,
    #[serde(default)]
    exclusive: bool,
    #[serde(default)]
    arguments: BTreeMap<String, serde_json::Value>,
    #[serde(default, deserialize_with = "nullable")]
    consumers: u32,
    #[serde(default, deserialize_with = "nullable")]
    messages: u64,
    #[serde(default, deserialize_with = "nullable")]
    messages_ready: u64,
    #[serde(default, deserialize_with = "nullable")]
    messages_unacknowledged: u64,
    #[serde(default)]
    message_stats: Option<MessageStats>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageStats {
    #[serde(default)]
    publish: u64,
    #[serde(default)]
    publish_details: Option<RateDetails>,
    #[serde(default)]
    deliver_get: u64,
    #[serde(default)]
    deliver_get_details: Option<RateDetails>,
    #[serde(default)]
    ack: u64,
    #[serde(default)]
    ack_details: Option<RateDetails>,
}

#[derive(Debug, Deserialize)]
struct RateDetails {
    rate: f64,
}

// Counters are reported as `null` for queues that are not ready yet.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<QueueInfo> for QueueSnapshot {
    fn from(queue: QueueInfo) -> Self {
        let mut features = Vec::new();
        if queue.durable {
            features.push("D".to_string());
        }
        if queue.auto_delete {
            features.push("AD".to_string());
        }
        if queue.exclusive {
            features.push("Excl".to_string());
        }
        features.extend(queue.arguments.into_keys());

        let stats = queue.message_stats.unwrap_or_default();
        let rate = |d: &Option<RateDetails>| d.as_ref().map(|d| d.rate);

        QueueSnapshot {
            name: queue.name,
            vhost: queue.vhost,
            queue_type: queue.queue_type,
            state: queue.state,
            features,
            consumers: queue.consumers,
            counts: QueueCounts {
                total: queue.messages,
                ready: queue.messages_ready,
                unacked: queue.messages_unacknowledged,
            },
            rates: QueueRates {
                publish: stats.publish,
                publish_rate: rate(&stats.publish_details),
                deliver_get: stats.deliver_get,
                deliver_get_rate: rate(&stats.deliver_get_details),
                ack: stats.ack,
                ack_rate: rate(&stats.ack_details),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let client = ManagementClient::builder().build().unwrap();
        assert_eq!(client.endpoint, "http://localhost:15672");
        assert_eq!(client.username, "guest");
        assert_eq!(client.password, "guest");
        assert_eq!(client.queues_url(), "http://localhost:15672/api/queues");
    }

    #[test]
    fn test_builder_custom() {
        let client = ManagementClient::builder()
            .endpoint("http://rabbit.local:15672/")
            .credentials("admin", "secret")
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        assert_eq!(client.endpoint, "http://rabbit.local:15672");
        assert_eq!(client.username, "admin");
        assert_eq!(client.password, "secret");
        assert_eq!(client.description(), "mgmt: http://rabbit.local:15672");
    }

    #[test]
    fn test_decode_minimal_row() {
        let body = br#"[{"name":"orders","vhost":"/","messages":5,"messages_ready":3,
            "messages_unacknowledged":2,"message_stats":{"publish":10,"deliver_get":8,"ack":8}}]"#;

        let queues = decode_queues(body).unwrap();
        assert_eq!(queues.len(), 1);
        let orders = &queues[0];
        assert_eq!(orders.identity(), "/orders");
        assert_eq!(
            orders.counts,
            QueueCounts {
                total: 5,
                ready: 3,
                unacked: 2
            }
        );
        assert_eq!(orders.rates.publish, 10);
        assert_eq!(orders.rates.deliver_get, 8);
        assert_eq!(orders.rates.ack, 8);
        assert_eq!(orders.rates.publish_rate, None);
    }

    #[test]
    fn test_decode_full_row() {
        let body = br#"[{"name":"payments","vhost":"shop","type":"quorum","state":"running",
            "durable":true,"auto_delete":false,"exclusive":false,
            "arguments":{"x-queue-type":"quorum","x-message-ttl":60000},
            "consumers":2,"messages":100,"messages_ready":90,"messages_unacknowledged":10,
            "message_stats":{"publish":600,"publish_details":{"rate":10.5},
            "deliver_get":500,"deliver_get_details":{"rate":9.2},
            "ack":480,"ack_details":{"rate":9.0}}}]"#;

        let queues = decode_queues(body).unwrap();
        let payments = &queues[0];
        assert_eq!(payments.queue_type, "quorum");
        assert!(payments.is_running());
        assert_eq!(payments.consumers, 2);
        assert_eq!(payments.features, vec!["D", "x-message-ttl", "x-queue-type"]);
        assert_eq!(payments.rates.publish_rate, Some(10.5));
        assert_eq!(payments.rates.deliver_get_rate, Some(9.2));
        assert_eq!(payments.rates.ack_rate, Some(9.0));
    }

    #[test]
    fn test_decode_fresh_queue_without_stats() {
        let body = br#"[{"name":"new","vhost":"/","messages":null,"state":"running"}]"#;
        let queues = decode_queues(body).unwrap();
        assert_eq!(queues[0].counts, QueueCounts::default());
        assert_eq!(queues[0].rates, QueueRates::default());
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        assert!(matches!(
            decode_queues(br#"{"error":"not_authorised"}"#),
            Err(FetchError::Decode(_))
        ));
        assert!(matches!(
            decode_queues(br#"[{"name":"q","messages":"many"}]"#),
            Err(FetchError::Decode(_))
        ));
        assert!(matches!(decode_queues(b"<html>"), Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_decode_empty_list() {
        assert!(decode_queues(b"[]").unwrap().is_empty());
    }
}
