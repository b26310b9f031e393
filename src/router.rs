//! Message router
//!
//! Fans one published message out to every connection currently resolvable
//! for the topic's subscriber set. Failures are isolated per connection: a
//! subscriber that cannot be reached never costs the others their delivery.

use std::sync::Arc;

use crate::protocol::format_event;
use crate::registry::{ConnectionRegistry, SubscriptionTable};
use crate::stats::BrokerStats;

/// Resolves subscribers for a topic and queues the event to each connection
///
/// Cheap to clone; all state lives behind `Arc`s shared with the sessions.
#[derive(Debug, Clone)]
pub struct Router {
    subscriptions: Arc<SubscriptionTable>,
    connections: Arc<ConnectionRegistry>,
    stats: Arc<BrokerStats>,
}

impl Router {
    /// Create a router over the shared stores
    pub fn new(
        subscriptions: Arc<SubscriptionTable>,
        connections: Arc<ConnectionRegistry>,
        stats: Arc<BrokerStats>,
    ) -> Self {
        Self {
            subscriptions,
            connections,
            stats,
        }
    }

    /// Deliver one message to every live subscriber of a topic
    ///
    /// Unknown topic, empty subscriber set, unresolvable subscriber id, dead
    /// connection: all routing misses, silently skipped. Subscription table
    /// is consulted before the connection registry; the id set is snapshotted
    /// so neither lock is held while events are queued. Returns the number of
    /// connections the event was queued to.
    pub async fn route(&self, topic: &str, message: &str) -> usize {
        self.stats.record_publish();

        let subscriber_ids = self.subscriptions.subscribers_of(topic).await;
        if subscriber_ids.is_empty() {
            self.stats.record_routing_miss();
            tracing::debug!(topic = %topic, "No subscribers for topic");
            return 0;
        }

        let event = format_event(topic, message);
        let mut delivered = 0;

        for id in &subscriber_ids {
            match self.connections.lookup(id).await {
                Some(handle) => {
                    if handle.send(event.clone()) {
                        self.stats.record_delivery();
                        delivered += 1;
                    } else {
                        // Writer task gone; connection died after registration
                        self.stats.record_routing_miss();
                        tracing::debug!(
                            topic = %topic,
                            subscriber_id = %id,
                            session_id = handle.session_id(),
                            "Subscriber connection closed, skipping"
                        );
                    }
                }
                None => {
                    self.stats.record_routing_miss();
                    tracing::debug!(
                        topic = %topic,
                        subscriber_id = %id,
                        "Subscriber id has no registered connection, skipping"
                    );
                }
            }
        }

        tracing::debug!(
            topic = %topic,
            subscribers = subscriber_ids.len(),
            delivered = delivered,
            "Routed publish"
        );

        delivered
    }
}
