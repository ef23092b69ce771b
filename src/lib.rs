//! # queuewatch
//!
//! A live telemetry and consumption dashboard for RabbitMQ.
//!
//! queuewatch samples queue statistics from the management API on a fixed
//! interval, attaches live consumers to a user-selected set of queues, and
//! renders both in a terminal. Queues whose name starts or ends with
//! "error" raise a rate-limited alert.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── tokio runtime ─────────────────────────────┐
//! │                                                                        │
//! │  ┌──────────────┐   publish_snapshot   ┌──────────────────────────┐    │
//! │  │ StatsSampler │─────────────────────▶│                          │    │
//! │  │  + Alerts    │                      │   SharedTelemetryStore   │    │
//! │  └──────────────┘                      │                          │    │
//! │  ┌──────────────┐  ConsumerEvent ┌────┐│                          │    │
//! │  │ consumer q1  │───────────────▶│pump│▶                          │    │
//! │  │ consumer q2  │───────────────▶│    ││                          │    │
//! │  └──────────────┘                └────┘└────────────┬─────────────┘    │
//! └─────────────────────────────────────────────────────┼──────────────────┘
//!                                                       │ read_view
//!                                            ┌──────────▼──────────┐
//!                                            │ app + ui (main loop)│
//!                                            └─────────────────────┘
//! ```
//!
//! - **[`sampler`]**: [`StatsSampler`] and the [`ManagementClient`] it polls
//! - **[`alert`]**: the error-queue pattern, [`AlertEvaluator`] cooldown and
//!   [`AlertSink`]s
//! - **[`consumer`]**: [`ConsumerManager`] and the per-queue state machine over
//!   a [`Broker`]
//! - **[`store`]**: [`SharedTelemetryStore`], the only shared mutable state
//! - **[`app`]**, **[`events`]**, **[`ui`]**: the terminal dashboard
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Reads ./config.json and starts the dashboard
//! queuewatch
//!
//! # Watch two queues from the start, sample every 2 seconds
//! queuewatch --watch orders,payments --refresh 2s
//!
//! # Sample once and write JSON
//! queuewatch --export queues.json
//! ```
//!
//! ### Sampling into a store
//!
//! ```no_run
//! use std::sync::Arc;
//! use queuewatch::{AlertEvaluator, ManagementClient, SharedTelemetryStore, SilentSink, StatsSampler};
//!
//! # tokio_test::block_on(async {
//! let client = ManagementClient::builder()
//!     .endpoint("http://localhost:15672")
//!     .credentials("guest", "guest")
//!     .build()
//!     .unwrap();
//!
//! let store = SharedTelemetryStore::default();
//! let mut sampler = StatsSampler::new(
//!     Arc::new(client),
//!     store.clone(),
//!     AlertEvaluator::default(),
//!     Arc::new(SilentSink),
//!     queuewatch::sampler::DEFAULT_INTERVAL,
//! );
//! sampler.sample_once().await.unwrap();
//! println!("{} queues", store.read_view().queues().len());
//! # });
//! ```

pub mod alert;
pub mod app;
pub mod config;
pub mod consumer;
pub mod data;
pub mod error;
pub mod events;
pub mod sampler;
pub mod store;
pub mod ui;

// Re-export main types for convenience
pub use alert::{AlertDecision, AlertEvaluator, AlertSink, SilentSink, TerminalBell};
pub use app::App;
pub use config::{BrokerSettings, MonitorSettings, Settings};
pub use consumer::{Broker, ConsumerManager, ConsumerSettings, LapinBroker};
pub use data::{ConsumptionBuffer, QueueSnapshot, ReceivedMessage};
pub use error::{ConfigError, ConnectError, ConsumeError, FetchError};
pub use sampler::{ManagementClient, QueueStatsSource, StatsSampler};
pub use store::{ConsumerStatus, SharedTelemetryStore, TelemetryView};
