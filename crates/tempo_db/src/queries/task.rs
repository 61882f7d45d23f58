//! Task and event-mapping queries.

use sqlx::SqlitePool;

use crate::error::DbResult;
use crate::models::{EventMapping, TaskRow, TaskWithEvent};

// ============================================================================
// Task CRUD
// ============================================================================

/// Insert a task row.
pub async fn insert_task(pool: &SqlitePool, task: &TaskRow) -> DbResult<()> {
    sqlx::query("INSERT INTO tasks (id, title, parent_id) VALUES (?, ?, ?)")
        .bind(&task.id)
        .bind(&task.title)
        .bind(&task.parent_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Get a task by ID.
pub async fn get_task(pool: &SqlitePool, id: &str) -> DbResult<Option<TaskRow>> {
    let task = sqlx::query_as::<_, TaskRow>("SELECT id, title, parent_id FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(task)
}

/// Children of a parent task, in insertion order.
pub async fn children_of(pool: &SqlitePool, parent_id: &str) -> DbResult<Vec<TaskRow>> {
    let tasks = sqlx::query_as::<_, TaskRow>(
        "SELECT id, title, parent_id FROM tasks WHERE parent_id = ? ORDER BY rowid ASC",
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await?;
    Ok(tasks)
}

/// All tasks joined with their event mappings, parents before children.
pub async fn list_tasks(pool: &SqlitePool) -> DbResult<Vec<TaskWithEvent>> {
    let rows = sqlx::query_as::<_, TaskWithEvent>(
        r#"
        SELECT
            t.id,
            t.title,
            t.parent_id,
            m.backend_event_id,
            m.calendar_id
        FROM tasks t
        LEFT JOIN event_map m ON m.task_id = t.id
        ORDER BY COALESCE(t.parent_id, t.id), t.parent_id IS NOT NULL, t.rowid
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Delete a single task row. Returns true if a row was removed.
pub async fn delete_task(pool: &SqlitePool, id: &str) -> DbResult<bool> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete every task row and mapping. Returns the number of task rows removed.
pub async fn delete_all_tasks(pool: &SqlitePool) -> DbResult<u64> {
    sqlx::query("DELETE FROM event_map").execute(pool).await?;
    let result = sqlx::query("DELETE FROM tasks").execute(pool).await?;
    Ok(result.rows_affected())
}

// ============================================================================
// Event mappings
// ============================================================================

/// Insert an event mapping for a task.
pub async fn insert_event_mapping(pool: &SqlitePool, mapping: &EventMapping) -> DbResult<()> {
    sqlx::query("INSERT INTO event_map (task_id, backend_event_id, calendar_id) VALUES (?, ?, ?)")
        .bind(&mapping.task_id)
        .bind(&mapping.backend_event_id)
        .bind(&mapping.calendar_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Get the event mapping for a task, if any.
pub async fn mapping_for(pool: &SqlitePool, task_id: &str) -> DbResult<Option<EventMapping>> {
    let mapping = sqlx::query_as::<_, EventMapping>(
        "SELECT task_id, backend_event_id, calendar_id FROM event_map WHERE task_id = ?",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;
    Ok(mapping)
}

/// All event mappings.
pub async fn list_mappings(pool: &SqlitePool) -> DbResult<Vec<EventMapping>> {
    let mappings = sqlx::query_as::<_, EventMapping>(
        "SELECT task_id, backend_event_id, calendar_id FROM event_map ORDER BY rowid ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(mappings)
}

/// Delete the mapping for a task. Returns true if a row was removed.
pub async fn delete_mapping(pool: &SqlitePool, task_id: &str) -> DbResult<bool> {
    let result = sqlx::query("DELETE FROM event_map WHERE task_id = ?")
        .bind(task_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
