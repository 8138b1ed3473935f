//! Andon Relay - real-time factory-floor fan-out and alarm escalation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            ANDON RELAY                               │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   producers ──publish──▶ Dispatcher ──▶ MessageBatcher ──▶ Transport │
//! │                             │               │    ▲                   │
//! │                             ▼               ▼    │                   │
//! │                   SubscriptionIndex    RateLimiter                   │
//! │                             │                    │                   │
//! │                             └────▶ ConnectionRegistry ◀── HealthMonitor
//! │                                                                      │
//! │   AndonService ──▶ EscalationScheduler (min-heap, one timer/alarm)   │
//! │        │                                                             │
//! │        ├──▶ AlarmStore / LineDirectory / TransitionNotifier (ports)  │
//! │        └──▶ Dispatcher (alarm lifecycle + escalation notifications)  │
//! │                                                                      │
//! │   MaintenanceLoops: batch flush 100ms │ health 30s │ decay 3600s     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use andon_relay::{FloorRelay, AndonService, MaintenanceLoops, RelayConfig};
//!
//! let relay = Arc::new(FloorRelay::new(RelayConfig::default()));
//! let andon = Arc::new(AndonService::new(relay.clone(), store, lines, notifier, config.escalation));
//! let loops = MaintenanceLoops::new(relay.clone());
//! loops.start();
//! andon.start();
//! ```
//!
//! # Delivery semantics
//!
//! - At most once: failed frames are counted against the connection, never retried.
//! - Within one flushed batch, CRITICAL messages precede lower priorities.
//! - No ordering across connections.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{
    encode_batch, AlarmId, AlarmKey, AlarmPriority, AlarmStatus, AndonAlarm, ConfigError,
    ConnectionId, NewAlarm, OutboundMessage, Priority, PublishReport, RelayConfig, RelayError,
    RelayMetricsSnapshot, RelayResult, SweepReport, TimerKind, TopicKey, TopicKind, UserId,
};
pub use ports::{
    AlarmStore, AndonApi, FanoutApi, LineDirectory, StoreError, TransitionNotifier,
    TransitionRecord, Transport, TransportError,
};
pub use service::{AndonService, FloorRelay, MaintenanceLoops};
