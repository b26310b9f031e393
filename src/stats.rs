//! Broker counters
//!
//! Pure observation; nothing in the broker branches on these values.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-lifetime counters, updated by the router and the session loops
#[derive(Debug, Default)]
pub struct BrokerStats {
    publishes: AtomicU64,
    events_delivered: AtomicU64,
    routing_misses: AtomicU64,
    protocol_errors: AtomicU64,
    publisher_sessions: AtomicU64,
    subscriber_sessions: AtomicU64,
}

impl BrokerStats {
    /// Create a zeroed counter set
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_publish(&self) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_routing_miss(&self) {
        self.routing_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_publisher_session(&self) {
        self.publisher_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_subscriber_session(&self) {
        self.subscriber_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Well-formed publish commands accepted
    pub fn publishes(&self) -> u64 {
        self.publishes.load(Ordering::Relaxed)
    }

    /// Events queued to a resolved subscriber connection
    pub fn events_delivered(&self) -> u64 {
        self.events_delivered.load(Ordering::Relaxed)
    }

    /// Publishes to topics with no subscribers, plus subscriber ids that did
    /// not resolve to a live connection
    pub fn routing_misses(&self) -> u64 {
        self.routing_misses.load(Ordering::Relaxed)
    }

    /// Lines that matched no command shape
    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors.load(Ordering::Relaxed)
    }

    /// Publisher sessions accepted
    pub fn publisher_sessions(&self) -> u64 {
        self.publisher_sessions.load(Ordering::Relaxed)
    }

    /// Subscriber sessions accepted
    pub fn subscriber_sessions(&self) -> u64 {
        self.subscriber_sessions.load(Ordering::Relaxed)
    }
}
