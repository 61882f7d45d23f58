//! Task classification: difficulty, title, and calendar assignment.
//!
//! The model judges atomicity and picks a calendar category; everything
//! else (the duration decision table, calendar id resolution, title
//! bounds) is enforced in code so a drifting model cannot bend the
//! contract.

use serde::Deserialize;

use crate::calbridge::{CalendarBackend, CalendarInfo};
use crate::duration::TaskDuration;
use crate::error::{CoreError, Result};
use crate::model::{self, LlmClient, TEMPERATURE_CLASSIFY};
use crate::pipeline::Stage;
use crate::task::{Query, TaskKind};

const MAX_TITLE_CHARS: usize = 40;

/// Classified task, ready for decomposition or direct allotment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedTask {
    pub calendar_id: String,
    pub kind: TaskKind,
    pub title: String,
    pub duration: Option<TaskDuration>,
}

/// Permissive shape of the model's answer, validated at the boundary.
#[derive(Debug, Deserialize)]
struct RawClassification {
    calendar: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    title: String,
    #[serde(default)]
    #[allow(dead_code)]
    duration: Option<String>,
}

/// Writable Work/Home calendar ids resolved from the backend catalog.
#[derive(Debug, Default)]
struct CategoryIds {
    work: Option<String>,
    home: Option<String>,
}

/// Exact title match first, substring second; only writable calendars count.
fn resolve_categories(calendars: &[CalendarInfo]) -> CategoryIds {
    let mut ids = CategoryIds::default();

    for cal in calendars {
        if !cal.allows_modifications {
            continue;
        }
        let title = cal.title.trim().to_lowercase();
        if title == "work" && ids.work.is_none() {
            ids.work = Some(cal.id.clone());
        } else if title == "home" && ids.home.is_none() {
            ids.home = Some(cal.id.clone());
        }
    }

    for cal in calendars {
        if !cal.allows_modifications {
            continue;
        }
        let title = cal.title.trim().to_lowercase();
        if ids.work.is_none() && title.contains("work") {
            ids.work = Some(cal.id.clone());
        } else if ids.home.is_none() && title.contains("home") {
            ids.home = Some(cal.id.clone());
        }
    }

    ids
}

fn prompt(query: &Query, duration: Option<TaskDuration>, ids: &CategoryIds) -> String {
    let work = ids.work.as_deref().unwrap_or("null");
    let home = ids.home.as_deref().unwrap_or("null");
    let duration_str = duration.map_or("null".to_string(), |d| d.to_string());

    format!(
        r#"You are a Task Difficulty Analyzer that classifies tasks and assigns calendars.

CRITICAL RULES:
1. Return STRICT JSON only - no explanations, no markdown.
2. Type classification:
   - duration != null -> type = "simple"
   - duration == null AND the task is one atomic action -> type = "simple"
   - duration == null AND the task is multi-step or composite -> type = "complex"
3. Calendar: pick the Work id for professional vocabulary (client, manager,
   meeting, proposal, report, sprint, code, invoice, contract, deploy), the
   Home id otherwise (family, friends, errands, health, chores). If only one
   id exists, use it. If neither exists, return null.
4. Title: short imperative verb + object, 3-7 words, no dates or filler.

Atomic examples: "call mom", "send invoice", "book dentist", "pay rent".
Complex examples: "plan a trip", "prepare a proposal", "launch the site",
"research and write a report", "organize the garage".

Output:
{{"calendar": "<calendar_id>" | null, "type": "simple" | "complex", "title": "<imperative title>", "duration": "{duration_str}"}}

Duration must be passed through unchanged.

User Query: "{query}"
Duration: {duration_str}
Available Calendars:
- Work: {work}
- Home: {home}

Analyze the task and return JSON:"#,
        query = query.text.trim(),
    )
}

/// Run the classification stage.
///
/// `duration` is the standardizer's output; per the decision table it
/// forces `simple` when present, and atomic-but-undurationed tasks get the
/// thirty-minute default.
pub async fn classify<L, B>(
    llm: &L,
    backend: &B,
    query: &Query,
    duration: Option<TaskDuration>,
) -> Result<ClassifiedTask>
where
    L: LlmClient + ?Sized,
    B: CalendarBackend + ?Sized,
{
    let calendars = backend.calendars().await?;
    let ids = resolve_categories(&calendars);
    if ids.work.is_none() && ids.home.is_none() {
        return Err(CoreError::TdNoCalendar);
    }

    let prompt = prompt(query, duration, &ids);
    let raw: RawClassification =
        model::complete_validated(llm, Stage::Classify, &prompt, TEMPERATURE_CLASSIFY, |value| {
            serde_json::from_value(value).map_err(|e| format!("schema mismatch: {e}"))
        })
        .await?;

    let calendar_id = raw
        .calendar
        .filter(|id| Some(id) == ids.work.as_ref() || Some(id) == ids.home.as_ref())
        .or_else(|| match (&ids.work, &ids.home) {
            (Some(w), None) => Some(w.clone()),
            (None, Some(h)) => Some(h.clone()),
            _ => None,
        })
        .ok_or(CoreError::TdNoCalendar)?;

    let mut title = raw.title.trim().to_string();
    if title.is_empty() {
        title = query.text.trim().to_string();
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        title = title.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string();
    }

    // The decision table overrides whatever the model said about type.
    let (kind, duration) = match duration {
        Some(d) => (TaskKind::Simple, Some(d)),
        None => match raw.kind.as_str() {
            "complex" => (TaskKind::Complex, None),
            _ => (TaskKind::Simple, Some(TaskDuration::DEFAULT_SIMPLE)),
        },
    };

    Ok(ClassifiedTask {
        calendar_id,
        kind,
        title,
        duration,
    })
}
