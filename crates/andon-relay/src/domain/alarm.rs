//! Andon alarm model and its lifecycle state machine.
//!
//! Transition methods are pure: they validate against the current status,
//! mutate the alarm and return the previous status. Timers, persistence and
//! notifications are driven by the escalation service around them.

use crate::domain::error::{RelayError, RelayResult};
use crate::domain::ids::{AlarmId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Alarm priority. Indexes the timeout table and the recipient ladders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl AlarmPriority {
    pub const ALL: [AlarmPriority; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for AlarmPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlarmPriority {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(RelayError::Validation(format!(
                "unknown alarm priority '{other}'"
            ))),
        }
    }
}

/// Alarm lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmStatus {
    Open,
    Acknowledged,
    Resolved,
    Escalated,
}

impl AlarmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Acknowledged => "ACKNOWLEDGED",
            Self::Resolved => "RESOLVED",
            Self::Escalated => "ESCALATED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved)
    }
}

impl fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which deadline an escalation timer enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Fires if nobody acknowledges in time
    Acknowledge,
    /// Fires if an acknowledged alarm is not resolved in time
    Resolve,
}

/// Duplicate-detection key. At most one active alarm exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlarmKey {
    pub line: String,
    pub equipment: String,
    pub event_type: String,
}

impl fmt::Display for AlarmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.line, self.equipment, self.event_type)
    }
}

/// Report input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlarm {
    pub line: String,
    pub equipment: String,
    pub event_type: String,
    pub priority: AlarmPriority,
    #[serde(default)]
    pub description: String,
    pub reporter: UserId,
}

impl NewAlarm {
    /// Trim the fields that become topic and duplicate keys, so they match
    /// what clients subscribe to.
    pub fn normalize(&mut self) {
        for field in [&mut self.line, &mut self.equipment, &mut self.event_type] {
            if field.trim().len() != field.len() {
                *field = field.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> RelayResult<()> {
        if self.line.trim().is_empty() {
            return Err(RelayError::Validation("line must not be empty".into()));
        }
        if self.equipment.trim().is_empty() {
            return Err(RelayError::Validation("equipment must not be empty".into()));
        }
        if self.event_type.trim().is_empty() {
            return Err(RelayError::Validation("event type must not be empty".into()));
        }
        if self.reporter.as_str().trim().is_empty() {
            return Err(RelayError::Validation("reporter must not be empty".into()));
        }
        Ok(())
    }

    pub fn key(&self) -> AlarmKey {
        AlarmKey {
            line: self.line.clone(),
            equipment: self.equipment.clone(),
            event_type: self.event_type.clone(),
        }
    }
}

/// An Andon stoppage alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AndonAlarm {
    pub id: AlarmId,
    pub line: String,
    pub equipment: String,
    pub event_type: String,
    pub priority: AlarmPriority,
    pub description: String,
    pub status: AlarmStatus,
    pub reporter: UserId,
    pub reported_at: DateTime<Utc>,
    pub acknowledged_by: Option<UserId>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub escalation_level: u32,
    pub resolution_notes: Option<String>,
    pub escalation_notes: Option<String>,
}

impl AndonAlarm {
    /// A freshly reported alarm: OPEN at level 1.
    pub fn report(input: NewAlarm, now: DateTime<Utc>) -> Self {
        Self {
            id: AlarmId::new(),
            line: input.line,
            equipment: input.equipment,
            event_type: input.event_type,
            priority: input.priority,
            description: input.description,
            status: AlarmStatus::Open,
            reporter: input.reporter,
            reported_at: now,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            escalated_at: None,
            escalation_level: 1,
            resolution_notes: None,
            escalation_notes: None,
        }
    }

    pub fn key(&self) -> AlarmKey {
        AlarmKey {
            line: self.line.clone(),
            equipment: self.equipment.clone(),
            event_type: self.event_type.clone(),
        }
    }

    /// Active alarms block duplicates and may still escalate.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }

    /// OPEN, or ESCALATED before anyone acknowledged, becomes ACKNOWLEDGED.
    pub fn acknowledge(&mut self, user: &UserId, now: DateTime<Utc>) -> RelayResult<AlarmStatus> {
        let allowed = match self.status {
            AlarmStatus::Open => true,
            AlarmStatus::Escalated => !self.is_acknowledged(),
            AlarmStatus::Acknowledged | AlarmStatus::Resolved => false,
        };
        if !allowed {
            return Err(self.invalid("acknowledge"));
        }

        let previous = self.status;
        self.status = AlarmStatus::Acknowledged;
        self.acknowledged_by = Some(user.clone());
        self.acknowledged_at = Some(now);
        Ok(previous)
    }

    /// Any non-resolved alarm becomes RESOLVED. Notes are mandatory.
    pub fn resolve(
        &mut self,
        user: &UserId,
        notes: &str,
        now: DateTime<Utc>,
    ) -> RelayResult<AlarmStatus> {
        if self.status.is_terminal() {
            return Err(self.invalid("resolve"));
        }
        if notes.trim().is_empty() {
            return Err(RelayError::Validation(
                "resolution notes are required".into(),
            ));
        }

        let previous = self.status;
        self.status = AlarmStatus::Resolved;
        self.resolved_by = Some(user.clone());
        self.resolved_at = Some(now);
        self.resolution_notes = Some(notes.trim().to_string());
        Ok(previous)
    }

    /// Raise the alarm to `level`, which must be above the current level and
    /// within the ladder.
    pub fn escalate_to(
        &mut self,
        level: u32,
        max_level: u32,
        now: DateTime<Utc>,
    ) -> RelayResult<AlarmStatus> {
        if self.status.is_terminal() || level <= self.escalation_level {
            return Err(self.invalid("escalate"));
        }
        if level > max_level {
            return Err(RelayError::Validation(format!(
                "escalation level {level} exceeds the maximum of {max_level}"
            )));
        }

        let previous = self.status;
        self.status = AlarmStatus::Escalated;
        self.escalation_level = level;
        self.escalated_at = Some(now);
        Ok(previous)
    }

    fn invalid(&self, action: &'static str) -> RelayError {
        RelayError::InvalidTransition {
            from: self.status,
            action,
        }
    }
}
