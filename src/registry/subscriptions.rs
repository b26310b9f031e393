//! Subscription table
//!
//! Maps each topic to the set of subscriber ids currently interested in it.
//! The table is structurally append-only: a topic entry, once created, stays
//! for the lifetime of the broker even after its set empties. Only membership
//! shrinks.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

/// Topic -> set of subscriber ids
///
/// Thread-safe via `RwLock`; routing is read-heavy and benefits from
/// concurrent read access. Callers never see the map itself, only atomic
/// operations on it.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    topics: RwLock<HashMap<String, HashSet<String>>>,
}

impl SubscriptionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber id to a topic, creating the topic entry if needed
    ///
    /// Idempotent: re-subscribing an existing member changes nothing.
    /// Returns true if the id was newly added.
    pub async fn subscribe(&self, topic: &str, id: &str) -> bool {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_default()
            .insert(id.to_string())
    }

    /// Remove a subscriber id from a topic
    ///
    /// Silent no-op for an unknown topic or a non-member; the topic entry is
    /// kept even when its set empties. Returns true if the id was a member.
    pub async fn unsubscribe(&self, topic: &str, id: &str) -> bool {
        let mut topics = self.topics.write().await;
        match topics.get_mut(topic) {
            Some(subscribers) => subscribers.remove(id),
            None => false,
        }
    }

    /// Snapshot the subscriber ids for a topic
    ///
    /// An unknown topic yields an empty vec, not an error. The snapshot lets
    /// the router iterate without holding the table lock across writes.
    pub async fn subscribers_of(&self, topic: &str) -> Vec<String> {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|subscribers| subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether an id is currently subscribed to a topic
    pub async fn is_subscribed(&self, topic: &str, id: &str) -> bool {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|subscribers| subscribers.contains(id))
            .unwrap_or(false)
    }

    /// Number of topic entries ever created
    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let table = SubscriptionTable::new();

        assert!(table.subscribe("weather", "s1").await);
        assert!(!table.subscribe("weather", "s1").await);

        let subs = table.subscribers_of("weather").await;
        assert_eq!(subs, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let table = SubscriptionTable::new();
        table.subscribe("weather", "s1").await;

        assert!(table.unsubscribe("weather", "s1").await);
        assert!(!table.unsubscribe("weather", "s1").await);
        assert!(table.subscribers_of("weather").await.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_topic_is_noop() {
        let table = SubscriptionTable::new();

        assert!(!table.unsubscribe("nonexistent", "s1").await);
        assert_eq!(table.topic_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_topic_has_no_subscribers() {
        let table = SubscriptionTable::new();
        assert!(table.subscribers_of("nonexistent").await.is_empty());
    }

    #[tokio::test]
    async fn test_topic_entry_survives_last_unsubscribe() {
        let table = SubscriptionTable::new();
        table.subscribe("weather", "s1").await;
        table.unsubscribe("weather", "s1").await;

        // Entry stays with an empty set
        assert_eq!(table.topic_count().await, 1);
        assert!(table.subscribers_of("weather").await.is_empty());
    }

    #[tokio::test]
    async fn test_membership_follows_last_accepted_verb() {
        let table = SubscriptionTable::new();

        table.subscribe("weather", "s1").await;
        table.subscribe("weather", "s1").await;
        assert!(table.is_subscribed("weather", "s1").await);

        table.unsubscribe("weather", "s1").await;
        table.unsubscribe("weather", "s1").await;
        assert!(!table.is_subscribed("weather", "s1").await);

        table.subscribe("weather", "s1").await;
        assert!(table.is_subscribed("weather", "s1").await);
    }

    #[tokio::test]
    async fn test_topics_are_independent() {
        let table = SubscriptionTable::new();
        table.subscribe("weather", "s1").await;
        table.subscribe("sports", "s2").await;

        table.unsubscribe("weather", "s1").await;
        assert_eq!(table.subscribers_of("sports").await, vec!["s2".to_string()]);
    }
}
