//! Domain layer: identifiers, topics, messages, alarms, health and config.

pub mod alarm;
pub mod config;
pub mod error;
pub mod health;
pub mod ids;
pub mod message;
pub mod report;
pub mod topic;

pub use alarm::{AlarmKey, AlarmPriority, AlarmStatus, AndonAlarm, NewAlarm, TimerKind};
pub use config::{
    BatchingConfig, ConfigError, ConnectionsConfig, EscalationConfig, EscalationPolicy,
    HealthConfig, MaintenanceConfig, RateLimitConfig, RelayConfig,
};
pub use error::{RelayError, RelayResult};
pub use health::{health_score, HealthInputs};
pub use ids::{AlarmId, ConnectionId, UserId};
pub use message::{encode_batch, OutboundMessage, Priority};
pub use report::{PublishReport, RelayMetricsSnapshot, SweepReport};
pub use topic::{TopicKey, TopicKind, TopicParseError};
