//! # Driving Ports (Inbound API)
//!
//! The two surfaces callers use: live fan-out for viewers and producers,
//! and the Andon alarm lifecycle.

use crate::domain::alarm::{AndonAlarm, NewAlarm};
use crate::domain::error::{RelayError, RelayResult};
use crate::domain::ids::{AlarmId, ConnectionId, UserId};
use crate::domain::report::{PublishReport, RelayMetricsSnapshot};
use crate::domain::topic::{TopicKey, TopicKind};
use crate::ports::outbound::Transport;
use async_trait::async_trait;
use std::sync::Arc;

/// Connection lifecycle, subscriptions and publishing.
#[async_trait]
pub trait FanoutApi: Send + Sync {
    /// Admit a connection.
    ///
    /// Fails with `CapacityExceeded` when the registry is full.
    fn connect(&self, transport: Arc<dyn Transport>, user: UserId) -> RelayResult<ConnectionId>;

    /// Drop a connection with its subscriptions and pending batch.
    /// Unknown ids are a no-op.
    fn disconnect(&self, id: ConnectionId);

    /// Returns `false` if the connection already held the topic.
    fn subscribe(&self, id: ConnectionId, topic: TopicKey) -> RelayResult<bool>;

    /// Returns `false` if the connection did not hold the topic.
    fn unsubscribe(&self, id: ConnectionId, topic: &TopicKey) -> RelayResult<bool>;

    /// Subscribe using a kind and parameter list as sent by clients.
    fn subscribe_parts(
        &self,
        id: ConnectionId,
        kind: TopicKind,
        params: &[String],
    ) -> RelayResult<bool> {
        let topic = TopicKey::from_parts(kind, params)
            .map_err(|e| RelayError::Validation(e.to_string()))?;
        self.subscribe(id, topic)
    }

    fn unsubscribe_parts(
        &self,
        id: ConnectionId,
        kind: TopicKind,
        params: &[String],
    ) -> RelayResult<bool> {
        let topic = TopicKey::from_parts(kind, params)
            .map_err(|e| RelayError::Validation(e.to_string()))?;
        self.unsubscribe(id, &topic)
    }

    /// Fan an event out to every subscriber of any of `topics`, once per
    /// connection.
    async fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        topics: &[TopicKey],
    ) -> PublishReport;

    fn metrics_snapshot(&self) -> RelayMetricsSnapshot;
}

/// Andon alarm lifecycle.
#[async_trait]
pub trait AndonApi: Send + Sync {
    /// Open a new alarm and arm its acknowledge timer.
    ///
    /// Fails with `NotFound` for an unknown line and `Conflict` when an
    /// active alarm already exists for the same line, equipment and event.
    async fn report(&self, alarm: NewAlarm) -> RelayResult<AndonAlarm>;

    async fn acknowledge(&self, id: AlarmId, user: UserId) -> RelayResult<AndonAlarm>;

    async fn resolve(&self, id: AlarmId, user: UserId, notes: String) -> RelayResult<AndonAlarm>;

    /// Manual escalation. Without a target the alarm moves up one level.
    async fn escalate(
        &self,
        id: AlarmId,
        user: UserId,
        target_level: Option<u32>,
        notes: Option<String>,
    ) -> RelayResult<AndonAlarm>;

    async fn get(&self, id: AlarmId) -> RelayResult<AndonAlarm>;

    async fn list_active(&self) -> RelayResult<Vec<AndonAlarm>>;
}
