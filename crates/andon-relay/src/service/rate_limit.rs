//! Per-connection sliding-window rate limiter.

use crate::domain::config::RateLimitConfig;
use crate::domain::ids::ConnectionId;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding-window log limiter: at most `max_messages` admissions in any
/// trailing `window`.
pub struct RateLimiter {
    windows: DashMap<ConnectionId, VecDeque<Instant>>,
    max_messages: usize,
    window: Duration,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            max_messages: config.max_messages as usize,
            window: config.window(),
            enabled: config.enabled,
        }
    }

    /// Admit one message, or return how long until the oldest admission
    /// leaves the window.
    pub fn check(&self, id: ConnectionId) -> Result<(), Duration> {
        if !self.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let mut log = self.windows.entry(id).or_default();
        while let Some(&oldest) = log.front() {
            if now.duration_since(oldest) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }

        if log.len() >= self.max_messages {
            let retry_after = log
                .front()
                .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(self.window);
            return Err(retry_after);
        }

        log.push_back(now);
        Ok(())
    }

    /// Admissions currently counted for `id`.
    pub fn in_window(&self, id: ConnectionId) -> usize {
        let now = Instant::now();
        self.windows
            .get(&id)
            .map(|log| {
                log.iter()
                    .filter(|&&t| now.duration_since(t) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drop state for a departed connection.
    pub fn forget(&self, id: ConnectionId) {
        self.windows.remove(&id);
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}
