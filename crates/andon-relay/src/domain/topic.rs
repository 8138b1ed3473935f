//! Typed topic keys.
//!
//! Every key has a structured string form (`line:L1`, `downtime:L1:EQ-7`)
//! used on the wire and in logs. The subscription index hashes the typed
//! value and never looks inside it.

use crate::domain::alarm::AlarmPriority;
use crate::domain::ids::AlarmId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Topic category, used for per-kind counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    Line,
    Equipment,
    Downtime,
    Job,
    Escalation,
    EscalationPriority,
    Recipient,
}

impl TopicKind {
    pub const ALL: [TopicKind; 7] = [
        Self::Line,
        Self::Equipment,
        Self::Downtime,
        Self::Job,
        Self::Escalation,
        Self::EscalationPriority,
        Self::Recipient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Equipment => "equipment",
            Self::Downtime => "downtime",
            Self::Job => "job",
            Self::Escalation => "escalation",
            Self::EscalationPriority => "escalation_priority",
            Self::Recipient => "recipient",
        }
    }

    /// Number of parameters the key carries.
    pub fn arity(&self) -> usize {
        match self {
            Self::Downtime => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicKind {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TopicParseError::UnknownKind(s.to_string()))
    }
}

/// Malformed topic key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicParseError {
    #[error("unknown topic kind '{0}'")]
    UnknownKind(String),
    #[error("topic kind '{kind}' expects {expected} parameter(s), got {got}")]
    Arity {
        kind: TopicKind,
        expected: usize,
        got: usize,
    },
    #[error("empty parameter in topic '{0}'")]
    EmptyParam(String),
    #[error("invalid alarm id '{0}'")]
    InvalidAlarmId(String),
    #[error("invalid priority '{0}'")]
    InvalidPriority(String),
}

/// Routing key for fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopicKey {
    Line(String),
    Equipment(String),
    Downtime { line: String, equipment: String },
    Job(String),
    Escalation(AlarmId),
    EscalationPriority(AlarmPriority),
    Recipient(String),
}

fn trimmed(value: impl Into<String>) -> String {
    let value = value.into();
    if value.trim().len() == value.len() {
        value
    } else {
        value.trim().to_string()
    }
}

impl TopicKey {
    pub fn line(id: impl Into<String>) -> Self {
        Self::Line(trimmed(id))
    }

    pub fn equipment(code: impl Into<String>) -> Self {
        Self::Equipment(trimmed(code))
    }

    pub fn downtime(line: impl Into<String>, equipment: impl Into<String>) -> Self {
        Self::Downtime {
            line: trimmed(line),
            equipment: trimmed(equipment),
        }
    }

    pub fn job(id: impl Into<String>) -> Self {
        Self::Job(trimmed(id))
    }

    pub fn recipient(role: impl Into<String>) -> Self {
        Self::Recipient(trimmed(role))
    }

    pub fn kind(&self) -> TopicKind {
        match self {
            Self::Line(_) => TopicKind::Line,
            Self::Equipment(_) => TopicKind::Equipment,
            Self::Downtime { .. } => TopicKind::Downtime,
            Self::Job(_) => TopicKind::Job,
            Self::Escalation(_) => TopicKind::Escalation,
            Self::EscalationPriority(_) => TopicKind::EscalationPriority,
            Self::Recipient(_) => TopicKind::Recipient,
        }
    }

    /// Build a key from a client-supplied kind and parameter list.
    pub fn from_parts(kind: TopicKind, params: &[String]) -> Result<Self, TopicParseError> {
        if params.len() != kind.arity() {
            return Err(TopicParseError::Arity {
                kind,
                expected: kind.arity(),
                got: params.len(),
            });
        }
        if let Some(empty) = params.iter().find(|p| p.trim().is_empty()) {
            return Err(TopicParseError::EmptyParam(format!("{kind}:{empty}")));
        }

        let first = params[0].trim().to_string();
        Ok(match kind {
            TopicKind::Line => Self::Line(first),
            TopicKind::Equipment => Self::Equipment(first),
            TopicKind::Downtime => Self::Downtime {
                line: first,
                equipment: params[1].trim().to_string(),
            },
            TopicKind::Job => Self::Job(first),
            TopicKind::Escalation => Self::Escalation(
                AlarmId::parse(&first).map_err(|_| TopicParseError::InvalidAlarmId(first))?,
            ),
            TopicKind::EscalationPriority => Self::EscalationPriority(
                first
                    .parse()
                    .map_err(|_| TopicParseError::InvalidPriority(first))?,
            ),
            TopicKind::Recipient => Self::Recipient(first),
        })
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(id) => write!(f, "line:{id}"),
            Self::Equipment(code) => write!(f, "equipment:{code}"),
            Self::Downtime { line, equipment } => write!(f, "downtime:{line}:{equipment}"),
            Self::Job(id) => write!(f, "job:{id}"),
            Self::Escalation(id) => write!(f, "escalation:{id}"),
            Self::EscalationPriority(p) => write!(f, "escalation_priority:{p}"),
            Self::Recipient(role) => write!(f, "recipient:{role}"),
        }
    }
}

impl FromStr for TopicKey {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| TopicParseError::UnknownKind(s.to_string()))?;
        let kind: TopicKind = kind.parse()?;

        // Downtime carries two parameters; everything else keeps the rest
        // verbatim so equipment codes may contain ':'.
        let params: Vec<String> = match kind {
            TopicKind::Downtime => rest.splitn(2, ':').map(str::to_string).collect(),
            _ => vec![rest.to_string()],
        };
        Self::from_parts(kind, &params)
    }
}

impl Serialize for TopicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TopicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
