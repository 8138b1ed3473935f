use crate::domain::alarm::{AlarmKey, AndonAlarm};
use crate::domain::ids::AlarmId;
use crate::ports::outbound::{AlarmStore, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory implementation of AlarmStore
pub struct InMemoryAlarmStore {
    alarms: RwLock<HashMap<AlarmId, AndonAlarm>>,
}

impl InMemoryAlarmStore {
    pub fn new() -> Self {
        Self {
            alarms: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.alarms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.read().is_empty()
    }
}

impl Default for InMemoryAlarmStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlarmStore for InMemoryAlarmStore {
    async fn insert(&self, alarm: &AndonAlarm) -> Result<(), StoreError> {
        let mut alarms = self.alarms.write();
        if alarms.contains_key(&alarm.id) {
            return Err(StoreError::Duplicate(alarm.id));
        }
        alarms.insert(alarm.id, alarm.clone());
        Ok(())
    }

    async fn update_status(&self, alarm: &AndonAlarm) -> Result<(), StoreError> {
        let mut alarms = self.alarms.write();
        match alarms.get_mut(&alarm.id) {
            Some(stored) => {
                *stored = alarm.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(alarm.id)),
        }
    }

    async fn find_active_by_key(&self, key: &AlarmKey) -> Result<Option<AndonAlarm>, StoreError> {
        Ok(self
            .alarms
            .read()
            .values()
            .find(|a| {
                a.is_active()
                    && a.line == key.line
                    && a.equipment == key.equipment
                    && a.event_type == key.event_type
            })
            .cloned())
    }

    async fn get(&self, id: AlarmId) -> Result<Option<AndonAlarm>, StoreError> {
        Ok(self.alarms.read().get(&id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<AndonAlarm>, StoreError> {
        let mut active: Vec<AndonAlarm> = self
            .alarms
            .read()
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|a| a.reported_at);
        Ok(active)
    }
}
