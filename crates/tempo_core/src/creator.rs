//! Event creation and deletion.
//!
//! The only side-effecting stage. Every backend event carries the owning
//! task id (and parent id) in its notes, which is the reconciliation key
//! between the calendar and the local store. Rows are committed per child
//! after each successful POST so a partial failure leaves a coherent
//! database.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use tempo_db::{queries, EventMapping, TaskDb, TaskRow, TaskWithEvent};

use crate::calbridge::{CalendarBackend, NewEvent};
use crate::error::{CoreError, Result};
use crate::task::{ScheduledTask, Slot};

/// One successfully created event.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedEntry {
    pub task_id: String,
    pub title: String,
    pub backend_event_id: String,
}

/// One event that could not be created.
#[derive(Debug, Clone, Serialize)]
pub struct FailedEntry {
    pub task_id: String,
    pub title: String,
    pub error: String,
}

/// Outcome of committing one scheduled task.
#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    pub created: Vec<CreatedEntry>,
    pub failed: Vec<FailedEntry>,
    pub total: usize,
}

impl CommitReport {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    /// The trace-level error for a partial commit, if any.
    pub fn partial_error(&self) -> Option<CoreError> {
        self.is_partial().then(|| CoreError::EcPartial {
            created: self.created.len(),
            total: self.total,
        })
    }
}

/// Outcome of a deletion request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    pub backend_deleted: usize,
    pub rows_deleted: u64,
    pub errors: Vec<String>,
}

/// Creates and deletes backend events, keeping the store in sync.
pub struct EventCreator<'a, B: CalendarBackend + ?Sized> {
    backend: &'a B,
    db: &'a TaskDb,
}

fn note_for(id: Uuid, parent_id: Option<Uuid>) -> String {
    match parent_id {
        Some(parent) => format!("id: {id}, parent_id: {parent}"),
        None => format!("id: {id}, parent_id: null"),
    }
}

impl<'a, B: CalendarBackend + ?Sized> EventCreator<'a, B> {
    pub fn new(backend: &'a B, db: &'a TaskDb) -> Self {
        Self { backend, db }
    }

    /// Materialize a scheduled task as calendar events and store rows.
    pub async fn commit(&self, task: &ScheduledTask) -> Result<CommitReport> {
        match task {
            ScheduledTask::Simple(simple) => {
                let mut report = CommitReport {
                    created: Vec::new(),
                    failed: Vec::new(),
                    total: 1,
                };
                self.create_one(
                    simple.id,
                    None,
                    &simple.title,
                    &simple.slot,
                    &simple.calendar_id,
                    &mut report,
                )
                .await?;
                Ok(report)
            }
            ScheduledTask::Complex(complex) => {
                let mut report = CommitReport {
                    created: Vec::new(),
                    failed: Vec::new(),
                    total: complex.subtasks.len(),
                };

                // The parent exists only as metadata; it gets a row but
                // never a backend event.
                queries::insert_task(
                    self.db.pool(),
                    &TaskRow {
                        id: complex.id.to_string(),
                        title: complex.title.clone(),
                        parent_id: None,
                    },
                )
                .await
                .map_err(CoreError::Db)?;

                for sub in &complex.subtasks {
                    self.create_one(
                        sub.id,
                        Some(sub.parent_id),
                        &sub.title,
                        &sub.slot,
                        &complex.calendar_id,
                        &mut report,
                    )
                    .await?;
                }
                Ok(report)
            }
        }
    }

    /// Create one backend event and, on success, its rows.
    ///
    /// Backend rejections (including a slot gone stale) are recorded as
    /// failures rather than aborting the remaining children; transport
    /// failures abort, since nothing further can succeed.
    async fn create_one(
        &self,
        id: Uuid,
        parent_id: Option<Uuid>,
        title: &str,
        slot: &Slot,
        calendar_id: &str,
        report: &mut CommitReport,
    ) -> Result<()> {
        let event = NewEvent {
            title: title.to_string(),
            start_iso: slot.start.to_rfc3339(),
            end_iso: slot.end.to_rfc3339(),
            notes: Some(note_for(id, parent_id)),
            calendar_id: Some(calendar_id.to_string()),
        };

        match self.backend.add_event(&event).await {
            Ok(created) => {
                queries::insert_task(
                    self.db.pool(),
                    &TaskRow {
                        id: id.to_string(),
                        title: title.to_string(),
                        parent_id: parent_id.map(|p| p.to_string()),
                    },
                )
                .await
                .map_err(CoreError::Db)?;
                queries::insert_event_mapping(
                    self.db.pool(),
                    &EventMapping {
                        task_id: id.to_string(),
                        backend_event_id: created.id.clone(),
                        calendar_id: calendar_id.to_string(),
                    },
                )
                .await
                .map_err(CoreError::Db)?;

                info!(task_id = %id, event_id = %created.id, "created calendar event");
                report.created.push(CreatedEntry {
                    task_id: id.to_string(),
                    title: title.to_string(),
                    backend_event_id: created.id,
                });
                Ok(())
            }
            Err(CoreError::BackendRejected { status, body }) => {
                warn!(task_id = %id, status, "backend rejected event");
                report.failed.push(FailedEntry {
                    task_id: id.to_string(),
                    title: title.to_string(),
                    error: format!("HTTP {status}: {body}"),
                });
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    /// List every persisted task with its event mapping.
    pub async fn list(&self) -> Result<Vec<TaskWithEvent>> {
        queries::list_tasks(self.db.pool()).await.map_err(CoreError::Db)
    }

    /// Delete a task by id. A parent cascades to all of its children.
    pub async fn delete_task(&self, id: &str) -> Result<DeleteReport> {
        let Some(row) = queries::get_task(self.db.pool(), id).await.map_err(CoreError::Db)? else {
            return Err(CoreError::Db(tempo_db::DbError::not_found("task", id)));
        };

        let mut report = DeleteReport::default();
        let children = queries::children_of(self.db.pool(), id).await.map_err(CoreError::Db)?;

        for child in &children {
            self.delete_leaf(&child.id, &mut report).await?;
        }
        // The row itself: a leaf has an event; a parent does not.
        self.delete_leaf(&row.id, &mut report).await?;
        Ok(report)
    }

    /// Delete only the children of a parent task, keeping the parent row.
    pub async fn delete_children(&self, parent_id: &str) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        let children = queries::children_of(self.db.pool(), parent_id)
            .await
            .map_err(CoreError::Db)?;
        for child in &children {
            self.delete_leaf(&child.id, &mut report).await?;
        }
        Ok(report)
    }

    /// Delete every tracked task and event. The caller is responsible for
    /// having confirmed this with the user.
    pub async fn delete_all(&self) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        let mappings = queries::list_mappings(self.db.pool()).await.map_err(CoreError::Db)?;
        for mapping in &mappings {
            match self.backend.delete_event(&mapping.backend_event_id).await {
                Ok(true) => report.backend_deleted += 1,
                Ok(false) => {} // already gone
                Err(e) => report.errors.push(format!("{}: {e}", mapping.task_id)),
            }
        }
        report.rows_deleted = queries::delete_all_tasks(self.db.pool())
            .await
            .map_err(CoreError::Db)?;
        Ok(report)
    }

    /// Delete one task's backend event (if mapped) and its rows.
    ///
    /// A backend "not found" counts as success: the event is gone either
    /// way, and the row must not be orphaned. Other backend errors keep
    /// the row so the deletion can be retried.
    async fn delete_leaf(&self, task_id: &str, report: &mut DeleteReport) -> Result<()> {
        if let Some(mapping) = queries::mapping_for(self.db.pool(), task_id)
            .await
            .map_err(CoreError::Db)?
        {
            match self.backend.delete_event(&mapping.backend_event_id).await {
                Ok(true) => report.backend_deleted += 1,
                Ok(false) => {
                    info!(task_id, "backend event already gone");
                }
                Err(e) => {
                    report.errors.push(format!("{task_id}: {e}"));
                    return Ok(());
                }
            }
            queries::delete_mapping(self.db.pool(), task_id)
                .await
                .map_err(CoreError::Db)?;
        }
        if queries::delete_task(self.db.pool(), task_id)
            .await
            .map_err(CoreError::Db)?
        {
            report.rows_deleted += 1;
        }
        Ok(())
    }
}
