//! Data models for queue telemetry and consumed messages.
//!
//! ## Submodules
//!
//! - [`snapshot`]: [`QueueSnapshot`] rows produced by each sampling cycle
//! - [`buffer`]: bounded, receipt-ordered [`ConsumptionBuffer`] per monitored queue
//! - [`history`]: ready-depth history for sparklines and growth rates
//! - [`duration`]: parsing and formatting of duration strings (e.g., "5s", "500ms")
//!
//! ## Data Flow
//!
//! ```text
//! GET /api/queues ──▶ Vec<QueueSnapshot> ──▶ SharedTelemetryStore ──▶ History::record()
//!                                                    ▲
//! basic.consume ──▶ ReceivedMessage ──▶ ConsumptionBuffer
//! ```

pub mod buffer;
pub mod duration;
pub mod history;
pub mod snapshot;

pub use buffer::{ConsumptionBuffer, ReceivedMessage, DEFAULT_BUFFER_CAPACITY};
pub use history::History;
pub use snapshot::{queue_identity, QueueCounts, QueueRates, QueueSnapshot};
