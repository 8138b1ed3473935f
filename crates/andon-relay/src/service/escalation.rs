//! Escalation timer queue.
//!
//! A min-heap of due times drained by one dispatch loop. Each alarm has at
//! most one active timer; re-arming or cancelling bumps the alarm's
//! generation and leaves the old heap entry behind as stale, to be skipped
//! when it surfaces.

use crate::domain::alarm::TimerKind;
use crate::domain::ids::AlarmId;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A pending escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationTimer {
    pub alarm_id: AlarmId,
    /// Level the alarm reaches when this fires
    pub level: u32,
    pub kind: TimerKind,
    pub due: Instant,
    /// Recipients notified at `level`
    pub recipients: Vec<String>,
    generation: u64,
}

impl EscalationTimer {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Default)]
struct SchedulerState {
    heap: BinaryHeap<Reverse<(Instant, u64, AlarmId)>>,
    active: HashMap<AlarmId, EscalationTimer>,
    next_generation: u64,
}

impl SchedulerState {
    fn is_current(&self, alarm_id: &AlarmId, generation: u64) -> bool {
        self.active
            .get(alarm_id)
            .is_some_and(|t| t.generation == generation)
    }

    /// Drop stale entries from the top of the heap.
    fn prune(&mut self) {
        while let Some(Reverse((_, generation, alarm_id))) = self.heap.peek() {
            if self.is_current(alarm_id, *generation) {
                break;
            }
            self.heap.pop();
        }
    }
}

#[derive(Default)]
pub struct EscalationScheduler {
    state: Mutex<SchedulerState>,
    wake: Notify,
}

impl EscalationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer for `alarm_id`, replacing any existing one.
    pub fn arm(
        &self,
        alarm_id: AlarmId,
        level: u32,
        kind: TimerKind,
        delay: Duration,
        recipients: Vec<String>,
    ) -> EscalationTimer {
        let due = Instant::now() + delay;
        let timer = {
            let mut state = self.state.lock();
            state.next_generation += 1;
            let timer = EscalationTimer {
                alarm_id,
                level,
                kind,
                due,
                recipients,
                generation: state.next_generation,
            };
            state.heap.push(Reverse((due, timer.generation, alarm_id)));
            state.active.insert(alarm_id, timer.clone());
            timer
        };
        self.wake.notify_one();
        timer
    }

    /// Cancel the active timer for `alarm_id`, if any.
    pub fn cancel(&self, alarm_id: AlarmId) -> Option<EscalationTimer> {
        self.state.lock().active.remove(&alarm_id)
    }

    /// Claim a fired timer. Returns `None` if it was cancelled or replaced
    /// since it became due.
    pub fn take_if_current(&self, alarm_id: AlarmId, generation: u64) -> Option<EscalationTimer> {
        let mut state = self.state.lock();
        if state.is_current(&alarm_id, generation) {
            state.active.remove(&alarm_id)
        } else {
            None
        }
    }

    pub fn get(&self, alarm_id: AlarmId) -> Option<EscalationTimer> {
        self.state.lock().active.get(&alarm_id).cloned()
    }

    pub fn next_due(&self) -> Option<Instant> {
        let mut state = self.state.lock();
        state.prune();
        state.heap.peek().map(|Reverse((due, _, _))| *due)
    }

    /// Pop every current timer due at or before `now`.
    ///
    /// Popped timers stay active until claimed with `take_if_current`, so a
    /// concurrent cancel still wins.
    pub fn due_timers(&self, now: Instant) -> Vec<EscalationTimer> {
        let mut state = self.state.lock();
        let mut due = Vec::new();
        loop {
            state.prune();
            match state.heap.peek() {
                Some(Reverse((at, _, _))) if *at <= now => {}
                _ => break,
            }
            if let Some(Reverse((_, _, alarm_id))) = state.heap.pop() {
                if let Some(timer) = state.active.get(&alarm_id) {
                    due.push(timer.clone());
                }
            }
        }
        due
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Resolves after the next `arm`.
    pub fn armed(&self) -> Notified<'_> {
        self.wake.notified()
    }
}
