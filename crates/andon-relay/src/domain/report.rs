//! Result summaries returned by publish, health sweeps and metrics.

use crate::domain::ids::ConnectionId;
use crate::domain::topic::TopicKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    /// Distinct subscribers across all topics
    pub matched: usize,
    /// Subscribers the message was queued for
    pub queued: usize,
    /// Subscribers that refused the message for backpressure
    pub rate_limited: Vec<ConnectionId>,
    /// Subscribers that disappeared before the message was queued
    pub failed: Vec<ConnectionId>,
}

impl PublishReport {
    pub fn is_fully_delivered(&self) -> bool {
        self.queued == self.matched
    }
}

/// Outcome of one health sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub scored: usize,
    pub evicted_unhealthy: usize,
    pub evicted_stale: usize,
}

impl SweepReport {
    pub fn evicted(&self) -> usize {
        self.evicted_unhealthy + self.evicted_stale
    }
}

/// Metrics snapshot for observability collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMetricsSnapshot {
    pub total_connections: usize,
    pub total_subscriptions: usize,
    pub average_health_score: f64,
    pub total_messages_sent: u64,
    pub total_errors: u64,
    pub per_topic_kind_counts: BTreeMap<TopicKind, usize>,
    pub total_bytes_sent: u64,
    pub rate_limited: u64,
    pub evictions: u64,
    pub flushes: u64,
    pub escalations_fired: u64,
}
