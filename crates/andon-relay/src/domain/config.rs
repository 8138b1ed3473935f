//! Relay configuration with validation.
//!
//! Every section is `#[serde(default)]`, so a TOML file only needs the keys
//! it overrides.

use crate::domain::alarm::AlarmPriority;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Connection admission and transport
    pub connections: ConnectionsConfig,
    /// Outbound batching
    pub batching: BatchingConfig,
    /// Per-connection sliding-window rate limit
    pub rate_limit: RateLimitConfig,
    /// Health scoring and eviction
    pub health: HealthConfig,
    /// Background loop intervals
    pub maintenance: MaintenanceConfig,
    /// Andon escalation timeouts and recipient ladders
    pub escalation: EscalationConfig,
}

impl RelayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connections.max_connections == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_connections cannot be 0".into(),
            ));
        }
        if self.connections.send_timeout_ms == 0 {
            return Err(ConfigError::InvalidInterval(
                "send_timeout_ms cannot be 0".into(),
            ));
        }
        if self.connections.outbound_buffer == 0 {
            return Err(ConfigError::InvalidLimit(
                "outbound_buffer cannot be 0".into(),
            ));
        }

        if self.batching.max_batch_size == 0 {
            return Err(ConfigError::InvalidLimit("max_batch_size cannot be 0".into()));
        }
        if self.batching.max_batch_age_ms == 0 {
            return Err(ConfigError::InvalidInterval(
                "max_batch_age_ms cannot be 0".into(),
            ));
        }

        if self.rate_limit.enabled
            && (self.rate_limit.max_messages == 0 || self.rate_limit.window_secs == 0)
        {
            return Err(ConfigError::InvalidLimit(
                "rate limit needs a non-zero budget and window".into(),
            ));
        }

        let health = &self.health;
        if !(0.0..=1.0).contains(&health.min_health_score) {
            return Err(ConfigError::InvalidHealth(format!(
                "min_health_score {} outside [0, 1]",
                health.min_health_score
            )));
        }
        if health.sweep_interval_secs == 0
            || health.stale_after_secs == 0
            || health.inactivity_timeout_secs == 0
        {
            return Err(ConfigError::InvalidInterval(
                "health intervals cannot be 0".into(),
            ));
        }
        if health.subscription_load_budget == 0 {
            return Err(ConfigError::InvalidHealth(
                "subscription_load_budget cannot be 0".into(),
            ));
        }

        if self.connections.ping_interval_secs == 0
            || self.connections.ping_interval_secs >= health.inactivity_timeout_secs
        {
            return Err(ConfigError::InvalidInterval(
                "ping_interval_secs must be non-zero and below inactivity_timeout_secs".into(),
            ));
        }

        let m = &self.maintenance;
        if m.flush_interval_ms == 0 || m.decay_interval_secs == 0 || m.error_backoff_ms == 0 {
            return Err(ConfigError::InvalidInterval(
                "maintenance intervals cannot be 0".into(),
            ));
        }
        if m.counter_bound == 0 {
            return Err(ConfigError::InvalidLimit("counter_bound cannot be 0".into()));
        }

        if self.escalation.store_retry_ms == 0 {
            return Err(ConfigError::InvalidInterval(
                "store_retry_ms cannot be 0".into(),
            ));
        }
        for priority in AlarmPriority::ALL {
            let policy = self.escalation.policy(priority);
            if policy.ladder.is_empty() || policy.ladder.iter().any(|level| level.is_empty()) {
                return Err(ConfigError::EmptyLadder(priority));
            }
            if policy.ack_timeout_mins == 0 || policy.resolve_timeout_mins == 0 {
                return Err(ConfigError::InvalidInterval(format!(
                    "{priority} escalation timeouts cannot be 0"
                )));
            }
        }

        Ok(())
    }
}

/// Connection admission and transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionsConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Deadline for one frame send
    pub send_timeout_ms: u64,
    /// Outbound frame buffer per connection
    pub outbound_buffer: usize,
    /// Server ping cadence; must stay below the inactivity timeout
    pub ping_interval_secs: u64,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            send_timeout_ms: 5_000,
            outbound_buffer: 256,
            ping_interval_secs: 30,
        }
    }
}

impl ConnectionsConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

/// Outbound batching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub max_batch_size: usize,
    pub max_batch_age_ms: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_batch_age_ms: 1_000,
        }
    }
}

impl BatchingConfig {
    pub fn max_batch_age(&self) -> Duration {
        Duration::from_millis(self.max_batch_age_ms)
    }
}

/// Sliding-window rate limit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Messages admitted per window
    pub max_messages: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_messages: 600,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Health scoring and eviction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub sweep_interval_secs: u64,
    /// Connections idle longer than this are evicted
    pub inactivity_timeout_secs: u64,
    /// Connections scoring below this are evicted
    pub min_health_score: f64,
    /// Recency reaches zero after this much idle time
    pub stale_after_secs: u64,
    /// Subscriptions a connection may hold before its load score drops
    pub subscription_load_budget: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            inactivity_timeout_secs: 300,
            min_health_score: 0.3,
            stale_after_secs: 300,
            subscription_load_budget: 10,
        }
    }
}

impl HealthConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

/// Background loop intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub flush_interval_ms: u64,
    pub decay_interval_secs: u64,
    /// Message counter value past which per-connection counters are decayed
    pub counter_bound: u64,
    /// Pause after a failed loop iteration
    pub error_backoff_ms: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 100,
            decay_interval_secs: 3_600,
            counter_bound: 10_000,
            error_backoff_ms: 1_000,
        }
    }
}

impl MaintenanceConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn decay_interval(&self) -> Duration {
        Duration::from_secs(self.decay_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// Timeouts and recipient ladder for one alarm priority.
///
/// `ladder[0]` is notified at report (level 1); `ladder[n]` when the alarm
/// reaches level `n + 1`. The ladder length is the maximum level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub ack_timeout_mins: u64,
    pub resolve_timeout_mins: u64,
    pub ladder: Vec<Vec<String>>,
}

impl EscalationPolicy {
    fn new(ack_timeout_mins: u64, resolve_timeout_mins: u64, ladder: &[&[&str]]) -> Self {
        Self {
            ack_timeout_mins,
            resolve_timeout_mins,
            ladder: ladder
                .iter()
                .map(|level| level.iter().map(|r| r.to_string()).collect())
                .collect(),
        }
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_mins * 60)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_mins * 60)
    }

    pub fn max_level(&self) -> u32 {
        self.ladder.len() as u32
    }

    /// Recipients for a 1-based level; empty outside the ladder.
    pub fn recipients(&self, level: u32) -> &[String] {
        level
            .checked_sub(1)
            .and_then(|idx| self.ladder.get(idx as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Andon escalation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub critical: EscalationPolicy,
    pub high: EscalationPolicy,
    pub medium: EscalationPolicy,
    pub low: EscalationPolicy,
    /// Arm a resolve deadline after acknowledgement
    pub escalate_on_resolve_timeout: bool,
    /// Delay before a timer whose store access failed fires again
    pub store_retry_ms: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            critical: EscalationPolicy::new(
                2,
                15,
                &[
                    &["line_supervisor"],
                    &["production_manager", "maintenance_manager"],
                    &["all_managers", "admin"],
                ],
            ),
            high: EscalationPolicy::new(
                5,
                30,
                &[&["line_supervisor"], &["production_manager"], &["all_managers"]],
            ),
            medium: EscalationPolicy::new(10, 45, &[&["line_supervisor"], &["production_manager"]]),
            low: EscalationPolicy::new(15, 60, &[&["line_supervisor"], &["production_manager"]]),
            escalate_on_resolve_timeout: true,
            store_retry_ms: 5_000,
        }
    }
}

impl EscalationConfig {
    pub fn store_retry(&self) -> Duration {
        Duration::from_millis(self.store_retry_ms)
    }

    pub fn policy(&self, priority: AlarmPriority) -> &EscalationPolicy {
        match priority {
            AlarmPriority::Critical => &self.critical,
            AlarmPriority::High => &self.high,
            AlarmPriority::Medium => &self.medium,
            AlarmPriority::Low => &self.low,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    #[error("invalid health setting: {0}")]
    InvalidHealth(String),
    #[error("escalation ladder for {0} priority has an empty level")]
    EmptyLadder(AlarmPriority),
}
