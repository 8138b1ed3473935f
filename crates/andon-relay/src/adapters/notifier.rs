use crate::ports::outbound::{TransitionNotifier, TransitionRecord};
use async_trait::async_trait;
use tracing::info;

/// Writes every alarm transition to the log as an audit line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl TransitionNotifier for TracingNotifier {
    async fn on_transition(&self, record: TransitionRecord) {
        info!(
            target: "andon::audit",
            alarm_id = %record.alarm_id,
            from = %record.previous_status,
            to = %record.new_status,
            actor = %record.actor,
            level = record.escalation_level,
            at = %record.timestamp.to_rfc3339(),
            "Alarm transition"
        );
    }
}
