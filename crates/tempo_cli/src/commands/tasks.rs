//! Listing and deletion of persisted tasks.

use dialoguer::Input;
use miette::{IntoDiagnostic, Result};
use owo_colors::OwoColorize;

use tempo_core::calbridge::CalendarBackend;
use tempo_core::creator::EventCreator;
use tempo_db::TaskDb;

use crate::output::Output;

/// Print every persisted task, parents with their children indented.
pub async fn list<B: CalendarBackend>(backend: &B, db: &TaskDb, output: &Output) -> Result<()> {
    let creator = EventCreator::new(backend, db);
    let rows = creator.list().await?;

    if rows.is_empty() {
        output.status("No tracked tasks.");
        return Ok(());
    }

    output.status(&format!("{} tracked task(s):", rows.len()));
    for row in &rows {
        let indent = if row.parent_id.is_some() { "    " } else { "  " };
        let event = match &row.backend_event_id {
            Some(id) => format!("event {id}"),
            None => "no event (parent)".to_string(),
        };
        println!(
            "{indent}{}  {}  {}",
            row.id.dimmed(),
            row.title,
            event.dimmed()
        );
    }
    Ok(())
}

/// Delete one task (cascading when it is a parent).
pub async fn delete<B: CalendarBackend>(
    backend: &B,
    db: &TaskDb,
    id: &str,
    output: &Output,
) -> Result<()> {
    let creator = EventCreator::new(backend, db);
    let report = creator.delete_task(id).await?;
    report_deletion(&report, output);
    Ok(())
}

/// Delete only the children of a parent task.
pub async fn delete_parent<B: CalendarBackend>(
    backend: &B,
    db: &TaskDb,
    parent_id: &str,
    output: &Output,
) -> Result<()> {
    let creator = EventCreator::new(backend, db);
    let report = creator.delete_children(parent_id).await?;
    report_deletion(&report, output);
    Ok(())
}

/// Delete everything, after a typed confirmation.
pub async fn delete_all<B: CalendarBackend>(
    backend: &B,
    db: &TaskDb,
    output: &Output,
) -> Result<()> {
    let confirmation: String = Input::new()
        .with_prompt("This deletes every tracked task and calendar event. Type 'yes' to continue")
        .allow_empty(true)
        .interact_text()
        .into_diagnostic()?;

    if confirmation.trim() != "yes" {
        output.warning("Aborted.");
        return Ok(());
    }

    let creator = EventCreator::new(backend, db);
    let report = creator.delete_all().await?;
    report_deletion(&report, output);
    Ok(())
}

fn report_deletion(report: &tempo_core::creator::DeleteReport, output: &Output) {
    output.success(&format!(
        "Deleted {} calendar event(s) and {} database row(s)",
        report.backend_deleted, report.rows_deleted
    ));
    for error in &report.errors {
        output.error(error);
    }
}
