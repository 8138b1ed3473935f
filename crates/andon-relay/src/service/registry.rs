//! Connection registry.
//!
//! Owns every live connection and its counters. Other components hold
//! connection ids only and look entries up here.

use crate::domain::error::{RelayError, RelayResult};
use crate::domain::ids::{ConnectionId, UserId};
use crate::ports::outbound::Transport;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

/// Per-connection counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionStats {
    pub message_count: u64,
    pub byte_count: u64,
    pub error_count: u64,
    pub last_activity: Instant,
    /// Last score computed by the health monitor
    pub health: f64,
}

impl ConnectionStats {
    fn new(now: Instant) -> Self {
        Self {
            message_count: 0,
            byte_count: 0,
            error_count: 0,
            last_activity: now,
            health: 1.0,
        }
    }
}

/// One registered connection.
pub struct ConnectionEntry {
    pub id: ConnectionId,
    pub user: UserId,
    pub created_at: DateTime<Utc>,
    transport: Arc<dyn Transport>,
    stats: Mutex<ConnectionStats>,
    /// Flipped to true when the entry leaves the registry
    closed: watch::Sender<bool>,
}

impl ConnectionEntry {
    /// Resolves once the connection is unregistered, whether by the owner
    /// or by eviction.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn stats(&self) -> ConnectionStats {
        *self.stats.lock()
    }

    /// Count traffic and refresh last activity.
    pub fn touch(&self, messages: u64, bytes: u64, errors: u64) {
        let mut stats = self.stats.lock();
        stats.message_count = stats.message_count.saturating_add(messages);
        stats.byte_count = stats.byte_count.saturating_add(bytes);
        stats.error_count = stats.error_count.saturating_add(errors);
        stats.last_activity = Instant::now();
    }

    /// Count a failure without treating it as activity.
    pub fn record_error(&self) {
        let mut stats = self.stats.lock();
        stats.error_count = stats.error_count.saturating_add(1);
    }

    pub fn set_health(&self, score: f64) {
        self.stats.lock().health = score;
    }

    /// Scale counters down once messages pass `bound`, keeping the error
    /// ratio. Returns true if anything changed.
    fn decay(&self, bound: u64) -> bool {
        let mut stats = self.stats.lock();
        if stats.message_count <= bound {
            return false;
        }
        let target = (bound / 10).max(1);
        let factor = target as f64 / stats.message_count as f64;
        stats.message_count = target;
        stats.error_count = (stats.error_count as f64 * factor).round() as u64;
        stats.byte_count = (stats.byte_count as f64 * factor).round() as u64;
        true
    }
}

impl std::fmt::Debug for ConnectionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEntry")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("created_at", &self.created_at)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Registry of live connections
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionEntry>>,
    /// Admission counter, reserved before insert so the cap is never exceeded
    admitted: AtomicUsize,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            admitted: AtomicUsize::new(0),
            max_connections,
        }
    }

    /// Admit a connection, failing when the registry is full.
    pub fn register(
        &self,
        transport: Arc<dyn Transport>,
        user: UserId,
    ) -> RelayResult<ConnectionId> {
        self.admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_connections).then_some(current + 1)
            })
            .map_err(|_| RelayError::CapacityExceeded {
                max: self.max_connections,
            })?;

        let id = ConnectionId::new();
        let entry = ConnectionEntry {
            id,
            user,
            created_at: Utc::now(),
            transport,
            stats: Mutex::new(ConnectionStats::new(Instant::now())),
            closed: watch::channel(false).0,
        };

        info!(
            connection_id = %id,
            user = %entry.user,
            "Connection registered"
        );
        self.connections.insert(id, Arc::new(entry));
        Ok(id)
    }

    /// Remove a connection. Idempotent: `None` if it was already gone.
    pub fn unregister(&self, id: ConnectionId) -> Option<Arc<ConnectionEntry>> {
        let (_, entry) = self.connections.remove(&id)?;
        self.admitted.fetch_sub(1, Ordering::AcqRel);
        entry.closed.send_replace(true);
        debug!(connection_id = %id, "Connection removed from registry");
        Some(entry)
    }

    /// Count traffic on a connection.
    pub fn touch(&self, id: ConnectionId, messages: u64, bytes: u64, errors: u64) -> RelayResult<()> {
        let entry = self
            .get(id)
            .ok_or_else(|| RelayError::connection_not_found(id))?;
        entry.touch(messages, bytes, errors);
        Ok(())
    }

    pub fn record_error(&self, id: ConnectionId) -> RelayResult<()> {
        let entry = self
            .get(id)
            .ok_or_else(|| RelayError::connection_not_found(id))?;
        entry.record_error();
        Ok(())
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionEntry>> {
        self.connections.get(&id).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| *e.key()).collect()
    }

    /// Snapshot of all entries; the map is not locked while callers use them.
    pub fn entries(&self) -> Vec<Arc<ConnectionEntry>> {
        self.connections.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Decay counters on every connection past `bound`. Returns how many
    /// connections were decayed.
    pub fn decay_counters(&self, bound: u64) -> usize {
        self.entries().iter().filter(|e| e.decay(bound)).count()
    }
}
