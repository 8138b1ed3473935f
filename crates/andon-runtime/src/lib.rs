//! # Andon Runtime
//!
//! Wires the relay core to its adapters and serves it over HTTP.
//!
//! ## Modules
//!
//! - `config/` - `RuntimeConfig` from TOML and environment
//! - `http/` - REST handlers for publishing, alarms, stats and metrics
//! - `ws/` - WebSocket session loop bridging a socket to a relay connection
//!
//! ## Routes
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET | `/ws?user=<id>` | Live fan-out session |
//! | GET | `/health` | Liveness and connection count |
//! | GET | `/metrics` | Prometheus text exposition |
//! | GET | `/stats` | Relay snapshot as JSON |
//! | POST | `/publish` | Fan an event out to topics |
//! | POST | `/alarms` | Report an alarm |
//! | GET | `/alarms` | Active alarms |
//! | GET | `/alarms/:id` | One alarm |
//! | POST | `/alarms/:id/acknowledge` | Acknowledge |
//! | POST | `/alarms/:id/resolve` | Resolve with notes |
//! | POST | `/alarms/:id/escalate` | Manual escalation |

pub mod config;
pub mod http;
pub mod ws;

use andon_relay::adapters::{InMemoryAlarmStore, StaticLineDirectory, TracingNotifier};
use andon_relay::{AndonService, FloorRelay, LineDirectory, MaintenanceLoops};
use andon_telemetry::log_event;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use config::{RuntimeConfig, RuntimeConfigError};

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<FloorRelay>,
    pub andon: Arc<AndonService>,
}

/// The assembled service graph, before anything is started.
pub struct AndonNode {
    pub state: AppState,
    pub loops: MaintenanceLoops,
}

impl AndonNode {
    /// Build the relay, the Andon service and their adapters.
    pub fn new(config: &RuntimeConfig) -> Self {
        let relay = Arc::new(FloorRelay::new(config.relay.clone()));

        let lines: Arc<dyn LineDirectory> = if config.lines.is_empty() {
            warn!("No production lines configured; accepting alarms for any line");
            Arc::new(StaticLineDirectory::permissive())
        } else {
            log_event!(info, "lines", "Loaded production line directory", lines = config.lines.len());
            Arc::new(StaticLineDirectory::new(config.lines.iter().cloned()))
        };

        let andon = Arc::new(AndonService::new(
            Arc::clone(&relay),
            Arc::new(InMemoryAlarmStore::new()),
            lines,
            Arc::new(TracingNotifier),
            config.relay.escalation.clone(),
        ));

        let loops = MaintenanceLoops::new(Arc::clone(&relay));

        Self {
            state: AppState { relay, andon },
            loops,
        }
    }

    /// Start background loops and re-arm timers for alarms already in the store.
    pub async fn start(&self) -> anyhow::Result<()> {
        self.loops.start();
        self.state.andon.start();
        let rearmed = self.state.andon.rearm_active().await?;
        if rearmed > 0 {
            log_event!(info, "escalation", "Re-armed escalation timers", alarms = rearmed);
        }
        Ok(())
    }

    /// Stop loops in reverse start order.
    pub async fn stop(&self) {
        self.state.andon.stop().await;
        self.loops.stop().await;
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }
}

/// Build the HTTP/WebSocket router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/health", get(http::health))
        .route("/metrics", get(http::metrics))
        .route("/stats", get(http::stats))
        .route("/publish", post(http::publish))
        .route("/alarms", post(http::report_alarm).get(http::list_alarms))
        .route("/alarms/:id", get(http::get_alarm))
        .route("/alarms/:id/acknowledge", post(http::acknowledge_alarm))
        .route("/alarms/:id/resolve", post(http::resolve_alarm))
        .route("/alarms/:id/escalate", post(http::escalate_alarm))
        .route_layer(axum::middleware::from_fn(http::track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
