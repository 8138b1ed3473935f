//! Outbound ports: collaborators the relay drives.

use crate::domain::alarm::{AlarmKey, AlarmStatus, AndonAlarm};
use crate::domain::ids::{AlarmId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delivery failure on one connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport i/o error: {0}")]
    Io(String),
}

/// Push channel to one live viewer.
///
/// Implementations must not block indefinitely; the batcher still wraps
/// every send in its own deadline.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, frame: String) -> Result<(), TransportError>;
}

/// Alarm storage failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("alarm {0} already stored")]
    Duplicate(AlarmId),
    #[error("alarm {0} not stored")]
    Missing(AlarmId),
}

/// Persistence collaborator for alarm rows.
#[async_trait]
pub trait AlarmStore: Send + Sync {
    async fn insert(&self, alarm: &AndonAlarm) -> Result<(), StoreError>;

    /// Persist the alarm's current status and transition fields.
    async fn update_status(&self, alarm: &AndonAlarm) -> Result<(), StoreError>;

    /// The active (non-resolved) alarm for a key, if any.
    async fn find_active_by_key(&self, key: &AlarmKey) -> Result<Option<AndonAlarm>, StoreError>;

    async fn get(&self, id: AlarmId) -> Result<Option<AndonAlarm>, StoreError>;

    async fn list_active(&self) -> Result<Vec<AndonAlarm>, StoreError>;
}

/// Payload of the transition hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub alarm_id: AlarmId,
    pub previous_status: AlarmStatus,
    pub new_status: AlarmStatus,
    pub actor: UserId,
    pub timestamp: DateTime<Utc>,
    pub escalation_level: u32,
}

/// Notification / audit collaborator, called after every alarm transition.
#[async_trait]
pub trait TransitionNotifier: Send + Sync {
    async fn on_transition(&self, record: TransitionRecord);
}

/// Known production lines.
#[async_trait]
pub trait LineDirectory: Send + Sync {
    async fn line_exists(&self, line: &str) -> Result<bool, StoreError>;
}
