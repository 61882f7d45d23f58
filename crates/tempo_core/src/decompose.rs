//! Decomposition: break a complex task into 2-5 ordered subtasks.

use serde::Deserialize;
use tracing::warn;

use crate::classify::ClassifiedTask;
use crate::duration::TaskDuration;
use crate::error::{CoreError, Result};
use crate::model::{strip_code_fences, LlmClient, TEMPERATURE_DECOMPOSE};
use crate::task::TaskKind;

const MIN_SUBTASKS: usize = 2;
const MAX_SUBTASKS: usize = 5;

/// One step of a decomposed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtaskSpec {
    pub title: String,
    pub duration: TaskDuration,
}

/// A complex task broken into ordered, bounded steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecomposedTask {
    pub calendar_id: String,
    pub title: String,
    pub subtasks: Vec<SubtaskSpec>,
}

#[derive(Debug, Deserialize)]
struct RawDecomposition {
    subtasks: Vec<RawSubtask>,
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
    title: String,
    duration: String,
}

fn prompt(task: &ClassifiedTask, tightened: bool) -> String {
    let extra = if tightened {
        "\nYOUR PREVIOUS ANSWER VIOLATED THE CONSTRAINTS. Re-read them: between \
2 and 5 subtasks, every duration in ISO-8601 PT form, none longer than PT3H."
    } else {
        ""
    };

    format!(
        r#"You are a task decomposer. Break the task below into subtasks.

CONSTRAINTS (all mandatory):
- Between 2 and 5 subtasks.
- Each duration in ISO-8601 form (PT30M, PT1H, PT2H30M), never longer than PT3H.
- Order the subtasks so doing them first-to-last makes sense.
- Each title is short and imperative, and ends with the parent task in
  parentheses, e.g. "Book flights (Japan trip)".

Output (STRICT JSON, nothing else):
{{"subtasks": [{{"title": "...", "duration": "PT1H"}}, ...]}}

Task: "{title}"
{extra}
Decompose and return JSON:"#,
        title = task.title,
    )
}

/// Tag appended to subtask titles so related events are identifiable when
/// scanning a calendar.
fn context_tag(parent_title: &str) -> String {
    parent_title.trim().trim_end_matches('.').to_string()
}

fn validate(
    raw: RawDecomposition,
    task: &ClassifiedTask,
) -> std::result::Result<Vec<SubtaskSpec>, String> {
    let count = raw.subtasks.len();
    if !(MIN_SUBTASKS..=MAX_SUBTASKS).contains(&count) {
        return Err(format!(
            "expected {MIN_SUBTASKS}-{MAX_SUBTASKS} subtasks, got {count}"
        ));
    }

    let tag = context_tag(&task.title);
    let mut specs = Vec::with_capacity(count);
    for (i, sub) in raw.subtasks.into_iter().enumerate() {
        let title = sub.title.trim();
        if title.len() < 3 {
            return Err(format!("subtask {i} has a degenerate title"));
        }
        let duration = TaskDuration::parse(&sub.duration)
            .ok_or_else(|| format!("subtask {i} has malformed duration {:?}", sub.duration))?;
        if duration > TaskDuration::SUBTASK_MAX {
            return Err(format!(
                "subtask {i} is {} min, above the {} min ceiling",
                duration.minutes(),
                TaskDuration::SUBTASK_MAX.minutes()
            ));
        }

        let title = if title.ends_with(')') {
            title.to_string()
        } else {
            format!("{title} ({tag})")
        };
        specs.push(SubtaskSpec { title, duration });
    }
    Ok(specs)
}

/// Run the decomposition stage.
///
/// One constraint violation earns a retry with a tightened prompt; the
/// second ends the query.
pub async fn decompose<L: LlmClient + ?Sized>(
    llm: &L,
    task: &ClassifiedTask,
) -> Result<DecomposedTask> {
    debug_assert_eq!(task.kind, TaskKind::Complex);

    let mut last_reason = String::new();
    for attempt in 0..2 {
        if attempt > 0 {
            warn!(%last_reason, "decomposition invalid, retrying with tightened prompt");
        }
        let prompt = prompt(task, attempt > 0);
        let raw_text = llm.complete(&prompt, TEMPERATURE_DECOMPOSE).await?;
        let cleaned = strip_code_fences(&raw_text);

        let parsed: std::result::Result<RawDecomposition, _> = serde_json::from_str(cleaned);
        match parsed {
            Ok(raw) => match validate(raw, task) {
                Ok(subtasks) => {
                    return Ok(DecomposedTask {
                        calendar_id: task.calendar_id.clone(),
                        title: task.title.clone(),
                        subtasks,
                    });
                }
                Err(reason) => last_reason = reason,
            },
            Err(e) => last_reason = format!("invalid JSON: {e}"),
        }
    }

    Err(CoreError::LdInvalid {
        reason: last_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockLlm;

    fn complex_task() -> ClassifiedTask {
        ClassifiedTask {
            calendar_id: "cal-home".into(),
            kind: TaskKind::Complex,
            title: "Plan Japan trip".into(),
            duration: None,
        }
    }

    #[tokio::test]
    async fn valid_decomposition_passes_through_ordered() {
        let llm = MockLlm::new();
        llm.push(
            r#"{"subtasks":[
                {"title":"Book flights (Plan Japan trip)","duration":"PT1H"},
                {"title":"Book hotels (Plan Japan trip)","duration":"PT2H"},
                {"title":"Plan itinerary (Plan Japan trip)","duration":"PT1H30M"}
            ]}"#,
        );

        let decomposed = decompose(&llm, &complex_task()).await.unwrap();
        assert_eq!(decomposed.subtasks.len(), 3);
        assert_eq!(decomposed.subtasks[0].title, "Book flights (Plan Japan trip)");
        assert_eq!(decomposed.subtasks[1].duration, TaskDuration::from_minutes(120));
    }

    #[tokio::test]
    async fn missing_tag_is_appended() {
        let llm = MockLlm::new();
        llm.push(
            r#"{"subtasks":[
                {"title":"Book flights","duration":"PT1H"},
                {"title":"Book hotels","duration":"PT1H"}
            ]}"#,
        );

        let decomposed = decompose(&llm, &complex_task()).await.unwrap();
        assert_eq!(decomposed.subtasks[0].title, "Book flights (Plan Japan trip)");
    }

    #[tokio::test]
    async fn wrong_count_retries_then_succeeds() {
        let llm = MockLlm::new();
        llm.push(r#"{"subtasks":[{"title":"Do everything","duration":"PT1H"}]}"#);
        llm.push(
            r#"{"subtasks":[
                {"title":"Book flights","duration":"PT1H"},
                {"title":"Book hotels","duration":"PT1H"}
            ]}"#,
        );

        let decomposed = decompose(&llm, &complex_task()).await.unwrap();
        assert_eq!(decomposed.subtasks.len(), 2);
    }

    #[tokio::test]
    async fn overlong_duration_fails_after_retry() {
        let llm = MockLlm::new();
        llm.push(
            r#"{"subtasks":[
                {"title":"Marathon session","duration":"PT8H"},
                {"title":"Wrap up","duration":"PT1H"}
            ]}"#,
        );
        llm.push(
            r#"{"subtasks":[
                {"title":"Marathon session","duration":"PT8H"},
                {"title":"Wrap up","duration":"PT1H"}
            ]}"#,
        );

        let err = decompose(&llm, &complex_task()).await.unwrap_err();
        match err {
            CoreError::LdInvalid { reason } => assert!(reason.contains("ceiling")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
