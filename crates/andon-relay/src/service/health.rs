//! Health monitor: scores every connection and evicts degraded or stale ones.

use crate::domain::config::HealthConfig;
use crate::domain::health::{health_score, HealthInputs};
use crate::domain::report::SweepReport;
use crate::service::registry::ConnectionRegistry;
use crate::service::relay::ConnectionTeardown;
use crate::service::stats::RelayStats;
use crate::service::subscriptions::SubscriptionIndex;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

pub struct HealthMonitor {
    registry: Arc<ConnectionRegistry>,
    index: Arc<SubscriptionIndex>,
    teardown: Arc<ConnectionTeardown>,
    stats: Arc<RelayStats>,
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        index: Arc<SubscriptionIndex>,
        teardown: Arc<ConnectionTeardown>,
        stats: Arc<RelayStats>,
        config: HealthConfig,
    ) -> Self {
        Self {
            registry,
            index,
            teardown,
            stats,
            config,
        }
    }

    /// Rescore all connections and evict those idle past the inactivity
    /// timeout or scoring below the threshold.
    pub fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let inactivity_timeout = self.config.inactivity_timeout();
        let mut report = SweepReport::default();

        for entry in self.registry.entries() {
            let stats = entry.stats();
            let idle = now.duration_since(stats.last_activity);
            let inputs = HealthInputs {
                message_count: stats.message_count,
                error_count: stats.error_count,
                idle,
                subscription_count: self.index.subscription_count(entry.id),
            };
            let score = health_score(&inputs, &self.config);
            entry.set_health(score);
            report.scored += 1;

            if idle > inactivity_timeout {
                if self.teardown.run(entry.id) {
                    info!(
                        connection_id = %entry.id,
                        idle_secs = idle.as_secs(),
                        reason = "stale",
                        "Evicted connection"
                    );
                    report.evicted_stale += 1;
                }
            } else if score < self.config.min_health_score && self.teardown.run(entry.id) {
                info!(
                    connection_id = %entry.id,
                    score,
                    reason = "unhealthy",
                    "Evicted connection"
                );
                report.evicted_unhealthy += 1;
            }
        }

        self.stats.record_evictions(report.evicted() as u64);
        report
    }

    /// Mean stored health across live connections, 1.0 when there are none.
    pub fn average_health(&self) -> f64 {
        let entries = self.registry.entries();
        if entries.is_empty() {
            return 1.0;
        }
        entries.iter().map(|e| e.stats().health).sum::<f64>() / entries.len() as f64
    }
}
