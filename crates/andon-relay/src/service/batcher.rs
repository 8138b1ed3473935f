//! Per-connection outbound batching.
//!
//! Each connection owns at most one pending batch. A batch is flushed when
//! it reaches `max_batch_size`, or by the maintenance sweep once it is older
//! than `max_batch_age`. Flushing sends one frame with priority ordering and
//! a per-send deadline. Delivery is at-most-once: failed frames are counted
//! against the connection and dropped.

use crate::domain::config::BatchingConfig;
use crate::domain::error::{RelayError, RelayResult};
use crate::domain::ids::ConnectionId;
use crate::domain::message::{encode_batch, OutboundMessage};
use crate::ports::outbound::TransportError;
use crate::service::rate_limit::RateLimiter;
use crate::service::registry::ConnectionRegistry;
use crate::service::stats::RelayStats;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Pending messages for one connection
#[derive(Debug)]
struct Batch {
    messages: Vec<OutboundMessage>,
    created: Instant,
}

impl Batch {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            created: Instant::now(),
        }
    }

    fn is_ready(&self, config: &BatchingConfig, now: Instant) -> bool {
        self.messages.len() >= config.max_batch_size
            || now.duration_since(self.created) >= config.max_batch_age()
    }
}

/// Outcome of one flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing pending
    Empty,
    /// Connection gone; batch dropped without a send attempt
    Discarded(usize),
    Delivered { messages: usize, bytes: usize },
    Failed(usize),
}

/// Message batcher
pub struct MessageBatcher {
    batches: DashMap<ConnectionId, Batch>,
    registry: Arc<ConnectionRegistry>,
    limiter: Arc<RateLimiter>,
    stats: Arc<RelayStats>,
    config: BatchingConfig,
    send_timeout: Duration,
}

impl MessageBatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        limiter: Arc<RateLimiter>,
        stats: Arc<RelayStats>,
        config: BatchingConfig,
        send_timeout: Duration,
    ) -> Self {
        Self {
            batches: DashMap::new(),
            registry,
            limiter,
            stats,
            config,
            send_timeout,
        }
    }

    /// Queue a message for `id`.
    ///
    /// Fails with `RateLimited` when the connection is over budget. A batch
    /// that becomes full is flushed on its own task.
    pub fn enqueue(self: &Arc<Self>, id: ConnectionId, message: OutboundMessage) -> RelayResult<()> {
        if !self.registry.contains(id) {
            return Err(RelayError::connection_not_found(id));
        }

        if let Err(retry_after) = self.limiter.check(id) {
            self.stats.record_rate_limited();
            debug!(connection_id = %id, ?retry_after, "Enqueue rate limited");
            return Err(RelayError::RateLimited {
                connection_id: id,
                retry_after,
            });
        }

        let ready = {
            let mut batch = self.batches.entry(id).or_insert_with(Batch::new);
            batch.messages.push(message);
            batch.is_ready(&self.config, Instant::now())
        };

        if ready {
            let batcher = Arc::clone(self);
            tokio::spawn(async move {
                batcher.flush(id).await;
            });
        }
        Ok(())
    }

    /// Take the pending batch for `id` and send it as one frame.
    pub async fn flush(&self, id: ConnectionId) -> FlushOutcome {
        let Some((_, batch)) = self.batches.remove(&id) else {
            return FlushOutcome::Empty;
        };
        let mut messages = batch.messages;
        if messages.is_empty() {
            return FlushOutcome::Empty;
        }

        let Some(entry) = self.registry.get(id) else {
            debug!(connection_id = %id, dropped = messages.len(), "Discarded batch for closed connection");
            return FlushOutcome::Discarded(messages.len());
        };

        // Stable: equal priorities keep enqueue order
        messages.sort_by_key(|m| m.priority);
        let count = messages.len();

        let frame = match encode_batch(&messages) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection_id = %id, error = %e, "Failed to encode batch");
                entry.record_error();
                self.stats.record_delivery_error();
                return FlushOutcome::Failed(count);
            }
        };
        let bytes = frame.len();

        let result = match tokio::time::timeout(self.send_timeout, entry.transport().send(frame)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.send_timeout)),
        };

        match result {
            Ok(()) => {
                entry.touch(count as u64, bytes as u64, 0);
                self.stats.record_flush(count as u64, bytes as u64);
                FlushOutcome::Delivered {
                    messages: count,
                    bytes,
                }
            }
            Err(e) => {
                warn!(
                    connection_id = %id,
                    messages = count,
                    error = %e,
                    "Transport failure, batch dropped"
                );
                entry.record_error();
                self.stats.record_delivery_error();
                FlushOutcome::Failed(count)
            }
        }
    }

    /// Flush every batch past its age bound, each on its own task.
    /// Batches of connections that no longer exist are dropped here.
    /// Returns the number of flushes started.
    pub fn flush_expired(self: &Arc<Self>) -> usize {
        let now = Instant::now();
        let expired: Vec<ConnectionId> = self
            .batches
            .iter()
            .filter(|b| b.is_ready(&self.config, now) || !self.registry.contains(*b.key()))
            .map(|b| *b.key())
            .collect();

        for id in &expired {
            let batcher = Arc::clone(self);
            let id = *id;
            tokio::spawn(async move {
                batcher.flush(id).await;
            });
        }
        expired.len()
    }

    /// Flush every pending batch and wait for all sends.
    pub async fn flush_all(&self) -> Vec<FlushOutcome> {
        let ids: Vec<ConnectionId> = self.batches.iter().map(|b| *b.key()).collect();
        futures::future::join_all(ids.into_iter().map(|id| self.flush(id))).await
    }

    /// Drop the pending batch of `id` without sending it.
    pub fn discard(&self, id: ConnectionId) -> usize {
        self.batches
            .remove(&id)
            .map(|(_, batch)| batch.messages.len())
            .unwrap_or(0)
    }

    pub fn pending(&self, id: ConnectionId) -> usize {
        self.batches.get(&id).map(|b| b.messages.len()).unwrap_or(0)
    }

    pub fn pending_batches(&self) -> usize {
        self.batches.len()
    }
}
