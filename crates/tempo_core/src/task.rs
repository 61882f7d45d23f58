//! Task types shared across pipeline stages.

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// A user's scheduling request.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub tz: Tz,
}

impl Query {
    pub fn new(text: impl Into<String>, tz: Tz) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(CoreError::EmptyQuery);
        }
        Ok(Self { text, tz })
    }
}

/// Whether a task is a single sitting or needs decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Simple,
    Complex,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

/// A concrete start/end placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl Slot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Slot) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// A placed simple task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledSimple {
    pub calendar_id: String,
    pub title: String,
    pub slot: Slot,
    pub id: Uuid,
}

/// A placed subtask of a complex task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledSubtask {
    pub title: String,
    pub slot: Slot,
    pub id: Uuid,
    pub parent_id: Uuid,
}

/// A complex task with placed subtasks. The parent itself has no slot and
/// never becomes a calendar event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledComplex {
    pub calendar_id: String,
    pub title: String,
    pub id: Uuid,
    pub subtasks: Vec<ScheduledSubtask>,
}

/// The allotter's output: one booking or an ordered family of bookings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScheduledTask {
    Simple(ScheduledSimple),
    Complex(ScheduledComplex),
}

impl ScheduledTask {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Simple(t) => t.id,
            Self::Complex(t) => t.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Simple(t) => &t.title,
            Self::Complex(t) => &t.title,
        }
    }

    pub fn calendar_id(&self) -> &str {
        match self {
            Self::Simple(t) => &t.calendar_id,
            Self::Complex(t) => &t.calendar_id,
        }
    }

    /// Number of backend events this task materializes as.
    pub fn event_count(&self) -> usize {
        match self {
            Self::Simple(_) => 1,
            Self::Complex(t) => t.subtasks.len(),
        }
    }
}
