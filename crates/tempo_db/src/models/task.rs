//! Task and event-mapping models.
//!
//! A task row is the durable record of a scheduled item. Complex tasks are
//! stored as a parent row plus one child row per subtask; only leaf rows
//! carry a calendar event, tracked in `event_map`.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted task.
///
/// `parent_id` is `None` for simple tasks and for complex parents;
/// children reference their parent through it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskRow {
    /// Unique identifier (UUID v4, assigned at scheduling time)
    pub id: String,

    /// Task title (short, actionable)
    pub title: String,

    /// Parent task for subtasks (None = top-level)
    pub parent_id: Option<String>,
}

/// Mapping from a task to the calendar event that realizes it.
///
/// Parent rows of complex tasks never have a mapping; the backend only
/// sees the subtask events.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventMapping {
    /// Task this event belongs to
    pub task_id: String,

    /// Event identifier assigned by the calendar backend
    pub backend_event_id: String,

    /// Calendar the event was created on
    pub calendar_id: String,
}

/// Task joined with its event mapping, for listings.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskWithEvent {
    /// Task ID
    pub id: String,

    /// Task title
    pub title: String,

    /// Parent task ID for hierarchy display
    pub parent_id: Option<String>,

    /// Backend event id (None for complex parents)
    pub backend_event_id: Option<String>,

    /// Calendar id (None for complex parents)
    pub calendar_id: Option<String>,
}
