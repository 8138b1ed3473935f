//! Outbound push envelope and delivery priorities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery priority. Lower rank is delivered first within a batch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    Critical = 1,
    High = 2,
    Normal = 3,
    Low = 4,
}

impl Priority {
    /// Static event-type table. Unknown event types are Normal.
    pub fn for_event_type(event_type: &str) -> Self {
        match event_type {
            "andon_alarm" | "alarm_escalated" | "emergency_stop" => Self::Critical,
            "quality_alert" | "downtime" | "alarm_acknowledged" | "alarm_resolved" => Self::High,
            "equipment_state" | "production_count" | "job_update" | "oee_update" => Self::Normal,
            "heartbeat" | "metrics" | "telemetry_raw" => Self::Low,
            _ => Self::Normal,
        }
    }

    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p.rank()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Critical),
            2 => Ok(Self::High),
            3 => Ok(Self::Normal),
            4 => Ok(Self::Low),
            other => Err(format!("priority must be 1-4, got {other}")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
        };
        f.write_str(name)
    }
}

/// Push envelope: `{type, payload, priority, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
}

impl OutboundMessage {
    /// Envelope with the event type's static priority, stamped now.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        let event_type = event_type.into();
        Self {
            priority: Priority::for_event_type(&event_type),
            event_type,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Serialized size, used for the byte counters.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// Encode a flushed batch as one frame: a single object for one message,
/// a JSON array for several.
pub fn encode_batch(messages: &[OutboundMessage]) -> serde_json::Result<String> {
    match messages {
        [single] => serde_json::to_string(single),
        many => serde_json::to_string(many),
    }
}
