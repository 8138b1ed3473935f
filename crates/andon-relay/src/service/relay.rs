//! The relay service object.
//!
//! `FloorRelay` is built once at startup and handed to whatever needs it;
//! it owns the registry, subscription index, limiter, batcher, dispatcher
//! and health monitor. Nothing here is global.

use crate::domain::config::RelayConfig;
use crate::domain::error::{RelayError, RelayResult};
use crate::domain::ids::{ConnectionId, UserId};
use crate::domain::message::OutboundMessage;
use crate::domain::report::{PublishReport, RelayMetricsSnapshot, SweepReport};
use crate::domain::topic::TopicKey;
use crate::ports::inbound::FanoutApi;
use crate::ports::outbound::Transport;
use crate::service::batcher::{FlushOutcome, MessageBatcher};
use crate::service::dispatcher::Dispatcher;
use crate::service::health::HealthMonitor;
use crate::service::rate_limit::RateLimiter;
use crate::service::registry::ConnectionRegistry;
use crate::service::stats::RelayStats;
use crate::service::subscriptions::SubscriptionIndex;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Removes a connection from every structure that references it.
///
/// The registry goes first so concurrent subscribe and enqueue calls see
/// the connection as gone before its other state is dropped.
pub struct ConnectionTeardown {
    registry: Arc<ConnectionRegistry>,
    index: Arc<SubscriptionIndex>,
    batcher: Arc<MessageBatcher>,
    limiter: Arc<RateLimiter>,
}

impl ConnectionTeardown {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        index: Arc<SubscriptionIndex>,
        batcher: Arc<MessageBatcher>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            registry,
            index,
            batcher,
            limiter,
        }
    }

    /// Returns false if the connection was already gone.
    pub fn run(&self, id: ConnectionId) -> bool {
        let Some(entry) = self.registry.unregister(id) else {
            return false;
        };
        let subscriptions = self.index.remove_connection(id);
        let dropped = self.batcher.discard(id);
        self.limiter.forget(id);

        info!(
            connection_id = %id,
            user = %entry.user,
            subscriptions,
            dropped_messages = dropped,
            "Connection closed"
        );
        true
    }
}

/// Real-time fan-out relay
pub struct FloorRelay {
    config: RelayConfig,
    registry: Arc<ConnectionRegistry>,
    index: Arc<SubscriptionIndex>,
    batcher: Arc<MessageBatcher>,
    dispatcher: Dispatcher,
    health: Arc<HealthMonitor>,
    teardown: Arc<ConnectionTeardown>,
    stats: Arc<RelayStats>,
}

impl FloorRelay {
    pub fn new(config: RelayConfig) -> Self {
        let stats = Arc::new(RelayStats::new());
        let registry = Arc::new(ConnectionRegistry::new(config.connections.max_connections));
        let index = Arc::new(SubscriptionIndex::new(Arc::clone(&registry)));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let batcher = Arc::new(MessageBatcher::new(
            Arc::clone(&registry),
            Arc::clone(&limiter),
            Arc::clone(&stats),
            config.batching.clone(),
            config.connections.send_timeout(),
        ));
        let dispatcher = Dispatcher::new(Arc::clone(&index), Arc::clone(&batcher));
        let teardown = Arc::new(ConnectionTeardown::new(
            Arc::clone(&registry),
            Arc::clone(&index),
            Arc::clone(&batcher),
            limiter,
        ));
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&index),
            Arc::clone(&teardown),
            Arc::clone(&stats),
            config.health.clone(),
        ));

        Self {
            config,
            registry,
            index,
            batcher,
            dispatcher,
            health,
            teardown,
            stats,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Close signal for a live connection; `None` if it is already gone.
    pub fn closed_signal(&self, id: ConnectionId) -> Option<watch::Receiver<bool>> {
        self.registry.get(id).map(|entry| entry.closed())
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn index(&self) -> &Arc<SubscriptionIndex> {
        &self.index
    }

    pub fn batcher(&self) -> &Arc<MessageBatcher> {
        &self.batcher
    }

    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Inbound client traffic counts as activity.
    pub fn touch(&self, id: ConnectionId, bytes: u64) -> RelayResult<()> {
        self.registry.touch(id, 1, bytes, 0)
    }

    /// Queue one message directly for a connection.
    pub fn enqueue(&self, id: ConnectionId, message: OutboundMessage) -> RelayResult<()> {
        self.batcher.enqueue(id, message)
    }

    pub async fn flush(&self, id: ConnectionId) -> FlushOutcome {
        self.batcher.flush(id).await
    }

    /// Synchronous fan-out used by in-process producers.
    pub fn dispatch(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        topics: &[TopicKey],
    ) -> PublishReport {
        self.dispatcher.publish(event_type, payload, topics)
    }

    /// Start flushes for every batch past its age bound.
    pub fn flush_expired(&self) -> usize {
        self.batcher.flush_expired()
    }

    pub fn sweep_health(&self) -> SweepReport {
        self.health.sweep()
    }

    /// Decay per-connection counters past the configured bound.
    pub fn decay_counters(&self) -> usize {
        self.registry
            .decay_counters(self.config.maintenance.counter_bound)
    }

    pub fn subscribers_of(&self, topic: &TopicKey) -> Vec<ConnectionId> {
        self.index.subscribers_of(topic).into_iter().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    fn ensure_connected(&self, id: ConnectionId) -> RelayResult<()> {
        if self.registry.contains(id) {
            Ok(())
        } else {
            Err(RelayError::connection_not_found(id))
        }
    }
}

#[async_trait]
impl FanoutApi for FloorRelay {
    fn connect(&self, transport: Arc<dyn Transport>, user: UserId) -> RelayResult<ConnectionId> {
        self.registry.register(transport, user)
    }

    fn disconnect(&self, id: ConnectionId) {
        self.teardown.run(id);
    }

    fn subscribe(&self, id: ConnectionId, topic: TopicKey) -> RelayResult<bool> {
        self.ensure_connected(id)?;
        self.index.subscribe(id, topic)
    }

    fn unsubscribe(&self, id: ConnectionId, topic: &TopicKey) -> RelayResult<bool> {
        self.ensure_connected(id)?;
        self.index.unsubscribe(id, topic)
    }

    async fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        topics: &[TopicKey],
    ) -> PublishReport {
        self.dispatch(event_type, payload, topics)
    }

    fn metrics_snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            total_connections: self.registry.len(),
            total_subscriptions: self.index.total_subscriptions(),
            average_health_score: self.health.average_health(),
            total_messages_sent: RelayStats::load(&self.stats.messages_sent),
            total_errors: RelayStats::load(&self.stats.delivery_errors),
            per_topic_kind_counts: self.index.topic_kind_counts(),
            total_bytes_sent: RelayStats::load(&self.stats.bytes_sent),
            rate_limited: RelayStats::load(&self.stats.rate_limited),
            evictions: RelayStats::load(&self.stats.evictions),
            flushes: RelayStats::load(&self.stats.flushes),
            escalations_fired: RelayStats::load(&self.stats.escalations_fired),
        }
    }
}
