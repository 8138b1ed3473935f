//! Fan-out dispatcher.

use crate::domain::error::RelayError;
use crate::domain::message::OutboundMessage;
use crate::domain::report::PublishReport;
use crate::domain::topic::TopicKey;
use crate::service::batcher::MessageBatcher;
use crate::service::subscriptions::SubscriptionIndex;
use std::sync::Arc;
use tracing::{debug, trace};

/// Resolves topics to subscribers and queues one copy per connection.
pub struct Dispatcher {
    index: Arc<SubscriptionIndex>,
    batcher: Arc<MessageBatcher>,
}

impl Dispatcher {
    pub fn new(index: Arc<SubscriptionIndex>, batcher: Arc<MessageBatcher>) -> Self {
        Self { index, batcher }
    }

    /// Publish an event to the union of subscribers of `topics`.
    ///
    /// Enqueueing never blocks on a transport; per-connection failures are
    /// collected in the report and do not affect other subscribers.
    pub fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        topics: &[TopicKey],
    ) -> PublishReport {
        let subscribers = self.index.subscribers_of_any(topics);
        let mut report = PublishReport {
            matched: subscribers.len(),
            ..Default::default()
        };
        if subscribers.is_empty() {
            trace!(event_type, "No subscribers");
            return report;
        }

        let message = OutboundMessage::new(event_type, payload);
        for id in subscribers {
            match self.batcher.enqueue(id, message.clone()) {
                Ok(()) => report.queued += 1,
                Err(RelayError::RateLimited { .. }) => report.rate_limited.push(id),
                Err(_) => report.failed.push(id),
            }
        }

        debug!(
            event_type,
            priority = %message.priority,
            matched = report.matched,
            queued = report.queued,
            rate_limited = report.rate_limited.len(),
            "Published event"
        );
        report
    }
}
