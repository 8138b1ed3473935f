//! Andon alarm service.
//!
//! Every transition on an alarm, whether from a person or from a fired
//! timer, runs under that alarm's lock and re-reads the stored alarm first.
//! A timer that fires after the alarm was acknowledged, resolved or
//! re-armed finds itself stale and does nothing.

use crate::domain::alarm::{AlarmKey, AlarmStatus, AndonAlarm, NewAlarm, TimerKind};
use crate::domain::config::{EscalationConfig, EscalationPolicy};
use crate::domain::error::{RelayError, RelayResult};
use crate::domain::ids::{AlarmId, UserId};
use crate::domain::topic::TopicKey;
use crate::ports::inbound::AndonApi;
use crate::ports::outbound::{AlarmStore, LineDirectory, TransitionNotifier, TransitionRecord};
use crate::service::escalation::{EscalationScheduler, EscalationTimer};
use crate::service::relay::FloorRelay;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type LockMap<K> = DashMap<K, Arc<Mutex<()>>>;

fn lock_for<K: Hash + Eq + Clone>(locks: &LockMap<K>, key: &K) -> Arc<Mutex<()>> {
    Arc::clone(locks.entry(key.clone()).or_default().value())
}

/// Drop a per-key lock once nobody else holds a handle to it.
fn release<K: Hash + Eq>(locks: &LockMap<K>, key: &K, lock: Arc<Mutex<()>>) {
    drop(lock);
    locks.remove_if(key, |_, l| Arc::strong_count(l) == 1);
}

/// Andon escalation service
pub struct AndonService {
    relay: Arc<FloorRelay>,
    store: Arc<dyn AlarmStore>,
    lines: Arc<dyn LineDirectory>,
    notifier: Arc<dyn TransitionNotifier>,
    config: EscalationConfig,
    scheduler: EscalationScheduler,
    alarm_locks: LockMap<AlarmId>,
    key_locks: LockMap<AlarmKey>,
    dispatch_loop: parking_lot::Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl AndonService {
    pub fn new(
        relay: Arc<FloorRelay>,
        store: Arc<dyn AlarmStore>,
        lines: Arc<dyn LineDirectory>,
        notifier: Arc<dyn TransitionNotifier>,
        config: EscalationConfig,
    ) -> Self {
        Self {
            relay,
            store,
            lines,
            notifier,
            config,
            scheduler: EscalationScheduler::new(),
            alarm_locks: DashMap::new(),
            key_locks: DashMap::new(),
            dispatch_loop: parking_lot::Mutex::new(None),
        }
    }

    pub fn scheduler(&self) -> &EscalationScheduler {
        &self.scheduler
    }

    /// Start the timer dispatch loop. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.dispatch_loop.lock();
        if slot.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move { service.dispatch_timers(shutdown_rx).await });
        *slot = Some((shutdown_tx, handle));
        info!("Escalation dispatch loop started");
    }

    /// Stop the dispatch loop and wait for it to exit. Armed timers are kept.
    pub async fn stop(&self) {
        let running = self.dispatch_loop.lock().take();
        if let Some((shutdown_tx, handle)) = running {
            let _ = shutdown_tx.send(true);
            if let Err(e) = handle.await {
                error!(error = %e, "Escalation dispatch loop ended abnormally");
            }
            info!("Escalation dispatch loop stopped");
        }
    }

    async fn dispatch_timers(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let armed = self.scheduler.armed();
            let next = self.scheduler.next_due();
            let sleep_until = next.unwrap_or_else(Instant::now);

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = armed => {}
                _ = tokio::time::sleep_until(sleep_until), if next.is_some() => {}
            }

            for timer in self.scheduler.due_timers(Instant::now()) {
                let service = Arc::clone(&self);
                tokio::spawn(async move { service.fire(timer).await });
            }
        }
    }

    /// Re-arm timers for active alarms that have none, e.g. after a restart
    /// against a persistent store. Returns how many were armed.
    pub async fn rearm_active(&self) -> RelayResult<usize> {
        let mut armed = 0;
        for alarm in self.store.list_active().await? {
            if self.scheduler.get(alarm.id).is_none() && self.arm_next(&alarm).is_some() {
                armed += 1;
            }
        }
        Ok(armed)
    }

    fn policy(&self, alarm: &AndonAlarm) -> &EscalationPolicy {
        self.config.policy(alarm.priority)
    }

    /// Arm the timer that would raise `alarm` one level. Unacknowledged
    /// alarms wait the acknowledge timeout, acknowledged ones the resolve
    /// timeout.
    fn arm_next(&self, alarm: &AndonAlarm) -> Option<EscalationTimer> {
        let policy = self.policy(alarm);
        if !alarm.is_active() || alarm.escalation_level >= policy.max_level() {
            return None;
        }

        let (kind, delay) = if alarm.is_acknowledged() {
            if !self.config.escalate_on_resolve_timeout {
                return None;
            }
            (TimerKind::Resolve, policy.resolve_timeout())
        } else {
            (TimerKind::Acknowledge, policy.ack_timeout())
        };

        let level = alarm.escalation_level + 1;
        let timer = self.scheduler.arm(
            alarm.id,
            level,
            kind,
            delay,
            policy.recipients(level).to_vec(),
        );
        debug!(
            alarm_id = %alarm.id,
            level,
            kind = ?kind,
            delay_secs = delay.as_secs(),
            "Escalation timer armed"
        );
        Some(timer)
    }

    async fn load(&self, id: AlarmId) -> RelayResult<AndonAlarm> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| RelayError::alarm_not_found(id))
    }

    /// Handle a due timer under the alarm lock.
    async fn fire(&self, timer: EscalationTimer) {
        let alarm_id = timer.alarm_id;
        let lock = lock_for(&self.alarm_locks, &alarm_id);
        {
            let _guard = lock.lock().await;
            self.fire_locked(timer).await;
        }
        release(&self.alarm_locks, &alarm_id, lock);
    }

    async fn fire_locked(&self, timer: EscalationTimer) {
        let Some(timer) = self.scheduler.take_if_current(timer.alarm_id, timer.generation()) else {
            debug!(alarm_id = %timer.alarm_id, "Stale escalation timer ignored");
            return;
        };

        let mut alarm = match self.store.get(timer.alarm_id).await {
            Ok(Some(alarm)) => alarm,
            Ok(None) => {
                warn!(alarm_id = %timer.alarm_id, "Escalation timer for unknown alarm");
                return;
            }
            Err(e) => {
                error!(alarm_id = %timer.alarm_id, error = %e, "Failed to load alarm for escalation");
                self.retry_later(timer);
                return;
            }
        };
        if !alarm.is_active() {
            return;
        }

        let max_level = self.policy(&alarm).max_level();
        let previous = match alarm.escalate_to(timer.level, max_level, Utc::now()) {
            Ok(previous) => previous,
            Err(e) => {
                debug!(alarm_id = %alarm.id, error = %e, "Escalation timer no longer applies");
                return;
            }
        };
        if let Err(e) = self.store.update_status(&alarm).await {
            error!(alarm_id = %alarm.id, error = %e, "Failed to persist escalation");
            self.retry_later(timer);
            return;
        }

        warn!(
            alarm_id = %alarm.id,
            level = alarm.escalation_level,
            kind = ?timer.kind,
            recipients = ?timer.recipients,
            "Alarm escalated by timeout"
        );
        self.announce_escalation(&alarm, previous, &UserId::system(), &timer.recipients)
            .await;
        self.arm_next(&alarm);
    }

    /// Re-arm a timer whose store access failed, same level and recipients.
    fn retry_later(&self, timer: EscalationTimer) {
        let delay = self.config.store_retry();
        self.scheduler
            .arm(timer.alarm_id, timer.level, timer.kind, delay, timer.recipients);
        warn!(
            alarm_id = %timer.alarm_id,
            level = timer.level,
            retry_ms = delay.as_millis() as u64,
            "Escalation deferred after store failure"
        );
    }

    /// Lifecycle topics: line, equipment, downtime, the alarm itself and its
    /// priority.
    fn lifecycle_topics(alarm: &AndonAlarm) -> Vec<TopicKey> {
        vec![
            TopicKey::line(alarm.line.clone()),
            TopicKey::equipment(alarm.equipment.clone()),
            TopicKey::downtime(alarm.line.clone(), alarm.equipment.clone()),
            TopicKey::Escalation(alarm.id),
            TopicKey::EscalationPriority(alarm.priority),
        ]
    }

    fn alarm_payload(alarm: &AndonAlarm, actor: &UserId) -> serde_json::Value {
        json!({
            "alarmId": alarm.id,
            "line": alarm.line,
            "equipment": alarm.equipment,
            "eventType": alarm.event_type,
            "priority": alarm.priority,
            "status": alarm.status,
            "escalationLevel": alarm.escalation_level,
            "description": alarm.description,
            "actor": actor,
        })
    }

    async fn record_transition(&self, alarm: &AndonAlarm, previous: AlarmStatus, actor: &UserId) {
        self.notifier
            .on_transition(TransitionRecord {
                alarm_id: alarm.id,
                previous_status: previous,
                new_status: alarm.status,
                actor: actor.clone(),
                timestamp: Utc::now(),
                escalation_level: alarm.escalation_level,
            })
            .await;
    }

    async fn announce_escalation(
        &self,
        alarm: &AndonAlarm,
        previous: AlarmStatus,
        actor: &UserId,
        recipients: &[String],
    ) {
        self.relay.stats().record_escalation();

        let mut topics = vec![
            TopicKey::Escalation(alarm.id),
            TopicKey::EscalationPriority(alarm.priority),
            TopicKey::line(alarm.line.clone()),
        ];
        topics.extend(recipients.iter().map(TopicKey::recipient));

        let mut payload = Self::alarm_payload(alarm, actor);
        payload["previousStatus"] = json!(previous);
        payload["recipients"] = json!(recipients);
        self.relay.dispatch("alarm_escalated", payload, &topics);

        self.record_transition(alarm, previous, actor).await;
    }

    async fn report_locked(&self, input: NewAlarm) -> RelayResult<AndonAlarm> {
        let key = input.key();
        if let Some(existing) = self.store.find_active_by_key(&key).await? {
            return Err(RelayError::Conflict(format!(
                "alarm {} is already {} for {key}",
                existing.id, existing.status
            )));
        }

        let alarm = AndonAlarm::report(input, Utc::now());
        self.store.insert(&alarm).await?;
        self.arm_next(&alarm);

        info!(
            alarm_id = %alarm.id,
            line = %alarm.line,
            equipment = %alarm.equipment,
            priority = %alarm.priority,
            "Andon alarm reported"
        );

        let mut topics = Self::lifecycle_topics(&alarm);
        topics.extend(
            self.policy(&alarm)
                .recipients(alarm.escalation_level)
                .iter()
                .map(TopicKey::recipient),
        );
        self.relay.dispatch(
            "andon_alarm",
            Self::alarm_payload(&alarm, &alarm.reporter),
            &topics,
        );
        Ok(alarm)
    }

    async fn acknowledge_locked(&self, id: AlarmId, user: UserId) -> RelayResult<AndonAlarm> {
        let mut alarm = self.load(id).await?;
        let previous = alarm.acknowledge(&user, Utc::now())?;
        self.store.update_status(&alarm).await?;

        self.scheduler.cancel(id);
        self.arm_next(&alarm);

        info!(alarm_id = %id, user = %user, "Andon alarm acknowledged");
        self.record_transition(&alarm, previous, &user).await;
        self.relay.dispatch(
            "alarm_acknowledged",
            Self::alarm_payload(&alarm, &user),
            &Self::lifecycle_topics(&alarm),
        );
        Ok(alarm)
    }

    async fn resolve_locked(
        &self,
        id: AlarmId,
        user: UserId,
        notes: String,
    ) -> RelayResult<AndonAlarm> {
        let mut alarm = self.load(id).await?;
        let previous = alarm.resolve(&user, &notes, Utc::now())?;
        self.store.update_status(&alarm).await?;
        self.scheduler.cancel(id);

        info!(alarm_id = %id, user = %user, "Andon alarm resolved");
        self.record_transition(&alarm, previous, &user).await;

        let mut payload = Self::alarm_payload(&alarm, &user);
        payload["resolutionNotes"] = json!(alarm.resolution_notes);
        self.relay
            .dispatch("alarm_resolved", payload, &Self::lifecycle_topics(&alarm));
        Ok(alarm)
    }

    async fn escalate_locked(
        &self,
        id: AlarmId,
        user: UserId,
        target_level: Option<u32>,
        notes: Option<String>,
    ) -> RelayResult<AndonAlarm> {
        let mut alarm = self.load(id).await?;
        let max_level = self.policy(&alarm).max_level();
        let target = target_level.unwrap_or(alarm.escalation_level + 1);

        let previous = alarm.escalate_to(target, max_level, Utc::now())?;
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            alarm.escalation_notes = Some(notes);
        }
        self.store.update_status(&alarm).await?;
        self.scheduler.cancel(id);

        warn!(alarm_id = %id, user = %user, level = target, "Andon alarm escalated manually");
        let recipients = self.policy(&alarm).recipients(target).to_vec();
        self.announce_escalation(&alarm, previous, &user, &recipients)
            .await;
        self.arm_next(&alarm);
        Ok(alarm)
    }
}

#[async_trait]
impl AndonApi for AndonService {
    async fn report(&self, mut alarm: NewAlarm) -> RelayResult<AndonAlarm> {
        alarm.normalize();
        alarm.validate()?;
        if !self.lines.line_exists(&alarm.line).await? {
            return Err(RelayError::line_not_found(&alarm.line));
        }

        let key = alarm.key();
        let lock = lock_for(&self.key_locks, &key);
        let result = {
            let _guard = lock.lock().await;
            self.report_locked(alarm).await
        };
        release(&self.key_locks, &key, lock);
        result
    }

    async fn acknowledge(&self, id: AlarmId, user: UserId) -> RelayResult<AndonAlarm> {
        let lock = lock_for(&self.alarm_locks, &id);
        let result = {
            let _guard = lock.lock().await;
            self.acknowledge_locked(id, user).await
        };
        release(&self.alarm_locks, &id, lock);
        result
    }

    async fn resolve(&self, id: AlarmId, user: UserId, notes: String) -> RelayResult<AndonAlarm> {
        let lock = lock_for(&self.alarm_locks, &id);
        let result = {
            let _guard = lock.lock().await;
            self.resolve_locked(id, user, notes).await
        };
        release(&self.alarm_locks, &id, lock);
        result
    }

    async fn escalate(
        &self,
        id: AlarmId,
        user: UserId,
        target_level: Option<u32>,
        notes: Option<String>,
    ) -> RelayResult<AndonAlarm> {
        let lock = lock_for(&self.alarm_locks, &id);
        let result = {
            let _guard = lock.lock().await;
            self.escalate_locked(id, user, target_level, notes).await
        };
        release(&self.alarm_locks, &id, lock);
        result
    }

    async fn get(&self, id: AlarmId) -> RelayResult<AndonAlarm> {
        self.load(id).await
    }

    async fn list_active(&self) -> RelayResult<Vec<AndonAlarm>> {
        Ok(self.store.list_active().await?)
    }
}
