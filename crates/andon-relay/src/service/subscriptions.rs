//! Subscription index.
//!
//! Two maps kept in step: topic -> subscribers for fan-out, and
//! connection -> topics so a disconnect costs O(own subscriptions).
//! When both are held, the per-connection shard is locked first.

use crate::domain::error::{RelayError, RelayResult};
use crate::domain::ids::ConnectionId;
use crate::domain::topic::{TopicKey, TopicKind};
use crate::service::registry::ConnectionRegistry;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Topic subscription index
pub struct SubscriptionIndex {
    /// Subscribers by topic
    by_topic: DashMap<TopicKey, HashSet<ConnectionId>>,
    /// Topics by connection
    by_connection: DashMap<ConnectionId, HashSet<TopicKey>>,
    registry: Arc<ConnectionRegistry>,
}

impl SubscriptionIndex {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            by_topic: DashMap::new(),
            by_connection: DashMap::new(),
            registry,
        }
    }

    /// Add `id` to `topic`. Returns `false` if it was already subscribed.
    pub fn subscribe(&self, id: ConnectionId, topic: TopicKey) -> RelayResult<bool> {
        if !self.registry.contains(id) {
            return Err(RelayError::connection_not_found(id));
        }

        {
            let mut own = self.by_connection.entry(id).or_default();
            if !own.insert(topic.clone()) {
                return Ok(false);
            }
            self.by_topic.entry(topic.clone()).or_default().insert(id);
        }

        // Lost a race with unregister: undo so nothing dangles.
        if !self.registry.contains(id) {
            self.remove_connection(id);
            return Err(RelayError::connection_not_found(id));
        }

        debug!(connection_id = %id, topic = %topic, "Subscribed");
        Ok(true)
    }

    /// Remove `id` from `topic`. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: ConnectionId, topic: &TopicKey) -> RelayResult<bool> {
        if !self.registry.contains(id) {
            return Err(RelayError::connection_not_found(id));
        }

        let removed = match self.by_connection.get_mut(&id) {
            Some(mut own) => {
                let removed = own.remove(topic);
                if removed {
                    if let Some(mut subs) = self.by_topic.get_mut(topic) {
                        subs.remove(&id);
                    }
                }
                removed
            }
            None => false,
        };

        if removed {
            self.by_topic.remove_if(topic, |_, subs| subs.is_empty());
            self.by_connection.remove_if(&id, |_, own| own.is_empty());
            debug!(connection_id = %id, topic = %topic, "Unsubscribed");
        }
        Ok(removed)
    }

    pub fn subscribers_of(&self, topic: &TopicKey) -> HashSet<ConnectionId> {
        self.by_topic
            .get(topic)
            .map(|subs| subs.clone())
            .unwrap_or_default()
    }

    /// Union of subscribers across `topics`.
    pub fn subscribers_of_any(&self, topics: &[TopicKey]) -> HashSet<ConnectionId> {
        let mut all = HashSet::new();
        for topic in topics {
            if let Some(subs) = self.by_topic.get(topic) {
                all.extend(subs.iter().copied());
            }
        }
        all
    }

    /// Drop every subscription of `id`. Returns how many were removed.
    pub fn remove_connection(&self, id: ConnectionId) -> usize {
        let Some((_, topics)) = self.by_connection.remove(&id) else {
            return 0;
        };
        for topic in &topics {
            if let Some(mut subs) = self.by_topic.get_mut(topic) {
                subs.remove(&id);
            }
            self.by_topic.remove_if(topic, |_, subs| subs.is_empty());
        }
        topics.len()
    }

    pub fn subscription_count(&self, id: ConnectionId) -> usize {
        self.by_connection.get(&id).map(|t| t.len()).unwrap_or(0)
    }

    pub fn topics_of(&self, id: ConnectionId) -> Vec<TopicKey> {
        self.by_connection
            .get(&id)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total_subscriptions(&self) -> usize {
        self.by_connection.iter().map(|e| e.value().len()).sum()
    }

    pub fn topic_count(&self) -> usize {
        self.by_topic.len()
    }

    /// Subscriptions per topic kind, zero-filled.
    pub fn topic_kind_counts(&self) -> BTreeMap<TopicKind, usize> {
        let mut counts: BTreeMap<TopicKind, usize> =
            TopicKind::ALL.into_iter().map(|k| (k, 0)).collect();
        for entry in self.by_topic.iter() {
            *counts.entry(entry.key().kind()).or_default() += entry.value().len();
        }
        counts
    }
}
