//! Background maintenance loops.
//!
//! Three periodic drivers: batch-flush sweep, health sweep and counter
//! decay. Each iteration runs on its own task, so a panic is logged and
//! followed by a backoff instead of killing the loop. Loops only exit on
//! `stop()`.

use crate::domain::config::MaintenanceConfig;
use crate::service::relay::FloorRelay;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub struct MaintenanceLoops {
    relay: Arc<FloorRelay>,
    config: MaintenanceConfig,
    health_interval: Duration,
    running: parking_lot::Mutex<Option<(watch::Sender<bool>, Vec<JoinHandle<()>>)>>,
}

impl MaintenanceLoops {
    pub fn new(relay: Arc<FloorRelay>) -> Self {
        let config = relay.config().maintenance.clone();
        let health_interval = relay.config().health.sweep_interval();
        Self {
            relay,
            config,
            health_interval,
            running: parking_lot::Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawn the loops. No-op if already running.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let backoff = self.config.error_backoff();

        let relay = Arc::clone(&self.relay);
        let flush = tokio::spawn(run_periodic(
            "batch_flush",
            self.config.flush_interval(),
            backoff,
            shutdown_rx.clone(),
            move || {
                let relay = Arc::clone(&relay);
                async move {
                    let started = relay.flush_expired();
                    if started > 0 {
                        debug!(batches = started, "Flushed expired batches");
                    }
                }
            },
        ));

        let relay = Arc::clone(&self.relay);
        let health = tokio::spawn(run_periodic(
            "health_sweep",
            self.health_interval,
            backoff,
            shutdown_rx.clone(),
            move || {
                let relay = Arc::clone(&relay);
                async move {
                    let report = relay.sweep_health();
                    if report.evicted() > 0 {
                        info!(
                            scored = report.scored,
                            evicted_unhealthy = report.evicted_unhealthy,
                            evicted_stale = report.evicted_stale,
                            "Health sweep evicted connections"
                        );
                    } else {
                        debug!(scored = report.scored, "Health sweep complete");
                    }
                }
            },
        ));

        let relay = Arc::clone(&self.relay);
        let decay = tokio::spawn(run_periodic(
            "metric_decay",
            self.config.decay_interval(),
            backoff,
            shutdown_rx,
            move || {
                let relay = Arc::clone(&relay);
                async move {
                    let decayed = relay.decay_counters();
                    debug!(connections = decayed, "Decayed connection counters");
                }
            },
        ));

        *running = Some((shutdown_tx, vec![flush, health, decay]));
        info!("Maintenance loops started");
    }

    /// Signal the loops and wait for them to exit.
    pub async fn stop(&self) {
        let Some((shutdown_tx, handles)) = self.running.lock().take() else {
            return;
        };
        let _ = shutdown_tx.send(true);
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Maintenance loop ended abnormally");
            }
        }
        info!("Maintenance loops stopped");
    }
}

/// Run `iteration` every `period` until shutdown. The first run happens one
/// period after start.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    backoff: Duration,
    mut shutdown: watch::Receiver<bool>,
    iteration: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = tokio::spawn(iteration()).await {
            error!(loop_name = name, error = %e, "Maintenance iteration failed");
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
    debug!(loop_name = name, "Maintenance loop exited");
}
