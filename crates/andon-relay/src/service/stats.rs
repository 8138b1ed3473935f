//! Relay-wide counters.
//!
//! Unlike per-connection stats these survive disconnects and evictions.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free relay counters
#[derive(Debug, Default)]
pub struct RelayStats {
    // Delivery
    pub messages_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub delivery_errors: AtomicU64,
    pub flushes: AtomicU64,

    // Backpressure
    pub rate_limited: AtomicU64,

    // Maintenance
    pub evictions: AtomicU64,

    // Andon
    pub escalations_fired: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delivered frame
    pub fn record_flush(&self, messages: u64, bytes: u64) {
        self.messages_sent.fetch_add(messages, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_error(&self) {
        self.delivery_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_escalation(&self) {
        self.escalations_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
