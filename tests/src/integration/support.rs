//! Shared fixtures: a wired floor (relay + Andon service + adapters) and
//! channel-backed viewers.

use andon_relay::adapters::{ChannelTransport, InMemoryAlarmStore, StaticLineDirectory};
use andon_relay::{
    AlarmPriority, AndonService, ConnectionId, FanoutApi, FloorRelay, NewAlarm, RelayConfig,
    TopicKey, TransitionNotifier, TransitionRecord, UserId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Notifier that keeps every transition for inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    records: Mutex<Vec<TransitionRecord>>,
}

impl RecordingNotifier {
    pub fn records(&self) -> Vec<TransitionRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl TransitionNotifier for RecordingNotifier {
    async fn on_transition(&self, record: TransitionRecord) {
        self.records.lock().push(record);
    }
}

/// Relay, Andon service and recording adapters for lines `L1` and `L2`.
pub struct Floor {
    pub relay: Arc<FloorRelay>,
    pub andon: Arc<AndonService>,
    pub store: Arc<InMemoryAlarmStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Floor {
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    pub fn with_config(config: RelayConfig) -> Self {
        let escalation = config.escalation.clone();
        let relay = Arc::new(FloorRelay::new(config));
        let store = Arc::new(InMemoryAlarmStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let andon = Arc::new(AndonService::new(
            Arc::clone(&relay),
            store.clone(),
            Arc::new(StaticLineDirectory::new(["L1", "L2"])),
            notifier.clone(),
            escalation,
        ));
        Self {
            relay,
            andon,
            store,
            notifier,
        }
    }

    /// Connect a viewer subscribed to `topics`.
    pub fn viewer(&self, user: &str, topics: &[TopicKey]) -> Viewer {
        let (transport, rx) = ChannelTransport::pair(64);
        let id = self
            .relay
            .connect(Arc::new(transport), UserId::new(user))
            .expect("connect viewer");
        for topic in topics {
            self.relay
                .subscribe(id, topic.clone())
                .expect("subscribe viewer");
        }
        Viewer { id, rx }
    }
}

impl Default for Floor {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected client and the frames pushed to it.
pub struct Viewer {
    pub id: ConnectionId,
    pub rx: mpsc::Receiver<String>,
}

impl Viewer {
    /// Flush this viewer's batch and return every message received so far.
    pub async fn receive(&mut self, relay: &FloorRelay) -> Vec<Value> {
        relay.flush(self.id).await;
        let mut messages = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            messages.extend(decode_frame(&frame));
        }
        messages
    }

    /// Event types received so far, in delivery order.
    pub async fn event_types(&mut self, relay: &FloorRelay) -> Vec<String> {
        self.receive(relay)
            .await
            .iter()
            .filter_map(|m| m["type"].as_str().map(str::to_string))
            .collect()
    }
}

/// A frame holds one envelope object or an array of them.
pub fn decode_frame(frame: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(frame) {
        Ok(Value::Array(messages)) => messages,
        Ok(message) => vec![message],
        Err(_) => Vec::new(),
    }
}

pub fn alarm(line: &str, equipment: &str, priority: AlarmPriority) -> NewAlarm {
    NewAlarm {
        line: line.to_string(),
        equipment: equipment.to_string(),
        event_type: "machine_stop".to_string(),
        priority,
        description: "operator pulled the cord".to_string(),
        reporter: UserId::new("op-1"),
    }
}
