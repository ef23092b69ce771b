//! Error types.
//!
//! Startup errors ([`ConfigError`], [`ConnectError`]) are fatal and surface
//! through `main`. Steady-state errors ([`FetchError`], [`ConsumeError`]) are
//! recovered where they happen and only ever reach the screen as text.

use std::time::Duration;

use thiserror::Error;

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file was missing, unreadable or not valid for its format.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value was present but unusable.
    #[error("Invalid configuration value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// The initial broker connection could not be established.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The broker refused or dropped the connection.
    #[error("Failed to connect to {endpoint}: {reason}")]
    Refused { endpoint: String, reason: String },

    /// The connection attempt did not finish in time.
    #[error("Timed out connecting to {endpoint} after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },
}

/// A sampling cycle against the management API failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The API answered with a non-success status.
    #[error("API returned status {0}")]
    Status(u16),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Could not reach the endpoint.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The body did not have the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Http(err.to_string())
        }
    }
}

/// A per-queue consumption attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsumeError {
    /// Passive declare failed: the queue does not exist (yet) or is locked.
    #[error("Queue '{queue}' unavailable: {reason}")]
    QueueUnavailable { queue: String, reason: String },

    /// Opening a channel or subscribing failed, or the delivery stream ended.
    #[error("Subscription failed: {0}")]
    Subscription(String),

    /// A broker operation did not complete in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The connection to the broker is gone.
    #[error("Broker transport closed: {0}")]
    TransportClosed(String),
}

impl ConsumeError {
    /// Whether retrying on the same transport is pointless.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, ConsumeError::TransportClosed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_closed_is_unrecoverable() {
        assert!(ConsumeError::TransportClosed("gone".into()).is_unrecoverable());
        assert!(!ConsumeError::Subscription("ended".into()).is_unrecoverable());
        assert!(!ConsumeError::QueueUnavailable {
            queue: "orders".into(),
            reason: "NOT_FOUND".into()
        }
        .is_unrecoverable());
        assert!(!ConsumeError::Timeout {
            operation: "declare",
            timeout: Duration::from_secs(1)
        }
        .is_unrecoverable());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(FetchError::Status(503).to_string(), "API returned status 503");
        assert_eq!(
            ConsumeError::QueueUnavailable {
                queue: "q1".into(),
                reason: "NOT_FOUND".into()
            }
            .to_string(),
            "Queue 'q1' unavailable: NOT_FOUND"
        );
    }
}
