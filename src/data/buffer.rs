//! Per-queue record of consumed messages.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;

/// Default number of messages retained per queue.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// A message received by a live consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceivedMessage {
    /// Queue the message was consumed from.
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    /// Raw body as delivered by the broker.
    pub payload: Vec<u8>,
    pub received_at: DateTime<Local>,
}

impl ReceivedMessage {
    /// Payload decoded as UTF-8, with invalid sequences replaced.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Receipt-ordered ring of messages for one queue.
///
/// Holds at most `capacity` entries; pushing onto a full buffer drops the
/// oldest entry and bumps `evicted`. Messages are shared, so cloning a buffer
/// for display copies pointers rather than payloads.
#[derive(Debug, Clone)]
pub struct ConsumptionBuffer {
    messages: VecDeque<Arc<ReceivedMessage>>,
    capacity: usize,
    received: u64,
    evicted: u64,
}

impl Default for ConsumptionBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }
}

impl ConsumptionBuffer {
    /// Create an empty buffer. A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            received: 0,
            evicted: 0,
        }
    }

    /// Append a message, evicting the oldest one when full.
    pub fn push(&mut self, message: ReceivedMessage) {
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
            self.evicted += 1;
        }
        self.messages.push_back(Arc::new(message));
        self.received += 1;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages received over the session, including evicted ones.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Messages dropped to respect the capacity.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Retained messages, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ReceivedMessage> + ExactSizeIterator {
        self.messages.iter().map(Arc::as_ref)
    }

    pub fn latest(&self) -> Option<&ReceivedMessage> {
        self.messages.back().map(Arc::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(queue: &str, body: &str) -> ReceivedMessage {
        ReceivedMessage {
            queue: queue.to_string(),
            exchange: String::new(),
            routing_key: queue.to_string(),
            redelivered: false,
            payload: body.as_bytes().to_vec(),
            received_at: Local::now(),
        }
    }

    #[test]
    fn test_push_keeps_receipt_order() {
        let mut buffer = ConsumptionBuffer::with_capacity(10);
        buffer.push(message("q1", "a"));
        buffer.push(message("q1", "b"));
        buffer.push(message("q1", "c"));

        let bodies: Vec<String> = buffer.iter().map(|m| m.payload_text()).collect();
        assert_eq!(bodies, vec!["a", "b", "c"]);
        assert_eq!(buffer.received(), 3);
        assert_eq!(buffer.evicted(), 0);
    }

    #[test]
    fn test_full_buffer_drops_oldest() {
        let mut buffer = ConsumptionBuffer::with_capacity(2);
        buffer.push(message("q1", "a"));
        buffer.push(message("q1", "b"));
        buffer.push(message("q1", "c"));

        let bodies: Vec<String> = buffer.iter().map(|m| m.payload_text()).collect();
        assert_eq!(bodies, vec!["b", "c"]);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.received(), 3);
        assert_eq!(buffer.evicted(), 1);
        assert_eq!(buffer.latest().map(|m| m.payload_text()), Some("c".to_string()));
    }

    #[test]
    fn test_clone_shares_messages() {
        let mut buffer = ConsumptionBuffer::with_capacity(4);
        buffer.push(message("q1", "a"));
        buffer.push(message("q1", "b"));

        let copy = buffer.clone();
        assert!(buffer.iter().zip(copy.iter()).all(|(a, b)| std::ptr::eq(a, b)));

        // Later pushes do not show up in the copy
        buffer.push(message("q1", "c"));
        assert_eq!(copy.len(), 2);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = ConsumptionBuffer::with_capacity(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push(message("q1", "a"));
        buffer.push(message("q1", "b"));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_payload_text_is_lossy() {
        let mut msg = message("q1", "");
        msg.payload = vec![0x68, 0x69, 0xff];
        assert_eq!(msg.payload_text(), "hi\u{fffd}");
    }
}
