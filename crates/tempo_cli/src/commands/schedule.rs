//! Run the scheduling pipeline and render its trace.

use chrono::DateTime;
use owo_colors::OwoColorize;

use tempo_core::calbridge::CalendarBackend;
use tempo_core::model::LlmClient;
use tempo_core::pipeline::{Pipeline, StageStatus, Trace};
use tempo_core::ScheduledTask;

use crate::output::Output;

/// Run one query and print the result. Returns the process exit code.
pub async fn run<L: LlmClient, B: CalendarBackend>(
    pipeline: &Pipeline<L, B>,
    query: &str,
    json: bool,
    output: &Output,
) -> i32 {
    let trace = pipeline.run(query).await;

    if json {
        println!("{}", trace.to_json());
    } else {
        render(&trace, output);
    }
    trace.exit_code
}

fn format_slot_end(text: &str) -> String {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.format("%I:%M %p").to_string())
        .unwrap_or_else(|_| text.to_string())
}

fn format_slot_start(text: &str) -> String {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.format("%Y-%m-%d %a %I:%M %p").to_string())
        .unwrap_or_else(|_| text.to_string())
}

fn render(trace: &Trace, output: &Output) {
    output.blank();
    output.status(&format!("Query: {}", trace.query));

    for report in &trace.stages {
        let (icon, label) = match report.status {
            StageStatus::Ok => ("✓".green().to_string(), report.stage.to_string()),
            StageStatus::Error => ("✗".red().to_string(), report.stage.to_string()),
            StageStatus::Skipped => ("–".dimmed().to_string(), report.stage.to_string()),
            StageStatus::Pending => ("·".dimmed().to_string(), report.stage.to_string()),
        };
        match &report.detail {
            Some(detail) => println!("  {icon} {label:<12} {}", detail.dimmed()),
            None => println!("  {icon} {label:<12}"),
        }
    }

    if let Some(task) = &trace.task {
        output.blank();
        match task {
            ScheduledTask::Simple(simple) => {
                output.success(&format!("Scheduled \"{}\"", simple.title));
                output.info(
                    "slot:",
                    &format!(
                        "{} → {}",
                        format_slot_start(&simple.slot.start.to_rfc3339()),
                        format_slot_end(&simple.slot.end.to_rfc3339())
                    ),
                );
                output.info("id:", &simple.id.to_string());
            }
            ScheduledTask::Complex(complex) => {
                output.success(&format!(
                    "Scheduled \"{}\" as {} subtasks",
                    complex.title,
                    complex.subtasks.len()
                ));
                output.info("parent id:", &complex.id.to_string());
                for sub in &complex.subtasks {
                    output.list_item(&format!(
                        "{} → {}  {}",
                        format_slot_start(&sub.slot.start.to_rfc3339()),
                        format_slot_end(&sub.slot.end.to_rfc3339()),
                        sub.title
                    ));
                }
            }
        }
    }

    if let Some(commit) = &trace.commit {
        if !commit.failed.is_empty() {
            output.blank();
            output.warning(&format!(
                "{} of {} events could not be created:",
                commit.failed.len(),
                commit.total
            ));
            for failure in &commit.failed {
                output.list_item(&format!("{}: {}", failure.title, failure.error));
            }
        }
    }

    if let Some(error) = &trace.error {
        output.blank();
        output.error(&format!("[{}] {}", error.code, error.message));
    }
}
