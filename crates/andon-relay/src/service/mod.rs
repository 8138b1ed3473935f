//! Service layer: the fan-out pipeline, health, escalation and maintenance.

pub mod andon;
pub mod batcher;
pub mod dispatcher;
pub mod escalation;
pub mod health;
pub mod maintenance;
pub mod rate_limit;
pub mod registry;
pub mod relay;
pub mod stats;
pub mod subscriptions;

pub use andon::AndonService;
pub use batcher::{FlushOutcome, MessageBatcher};
pub use dispatcher::Dispatcher;
pub use escalation::{EscalationScheduler, EscalationTimer};
pub use health::HealthMonitor;
pub use maintenance::{run_periodic, MaintenanceLoops};
pub use rate_limit::RateLimiter;
pub use registry::{ConnectionEntry, ConnectionRegistry, ConnectionStats};
pub use relay::{ConnectionTeardown, FloorRelay};
pub use stats::RelayStats;
pub use subscriptions::SubscriptionIndex;
