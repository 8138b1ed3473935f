//! Connection health scoring.

use crate::domain::config::HealthConfig;
use std::time::Duration;

/// Snapshot of the counters a health score is derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthInputs {
    pub message_count: u64,
    pub error_count: u64,
    pub idle: Duration,
    pub subscription_count: usize,
}

/// Mean of stability, recency and load, each in [0, 1].
///
/// - stability = 1 - errors / max(1, messages)
/// - recency = max(0, 1 - idle / stale_after)
/// - load = min(1, budget / max(1, subscriptions))
pub fn health_score(inputs: &HealthInputs, config: &HealthConfig) -> f64 {
    let stability =
        1.0 - inputs.error_count as f64 / inputs.message_count.max(1) as f64;
    let recency =
        1.0 - inputs.idle.as_secs_f64() / config.stale_after_secs.max(1) as f64;
    let load = config.subscription_load_budget as f64 / inputs.subscription_count.max(1) as f64;

    let score = (stability.clamp(0.0, 1.0) + recency.max(0.0) + load.min(1.0)) / 3.0;
    score.clamp(0.0, 1.0)
}
