//! Slot extraction: pull verbatim temporal phrases out of a query.
//!
//! The model is only allowed to quote the user. Resolution of relatives
//! ("tomorrow", "by Friday") happens in the next stage with a full
//! temporal context; inventing or normalizing anything here corrupts the
//! rest of the pipeline.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{self, LlmClient, TEMPERATURE_DEFAULT};
use crate::pipeline::Stage;
use crate::task::Query;

/// Verbatim temporal phrases from the query. All three may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSlot {
    pub start_text: Option<String>,
    pub end_text: Option<String>,
    pub duration: Option<String>,
}

impl RawSlot {
    pub fn is_empty(&self) -> bool {
        self.start_text.is_none() && self.end_text.is_none() && self.duration.is_none()
    }
}

fn prompt(query: &Query) -> String {
    format!(
        r#"You are a slot extractor that finds time-related phrases in user queries.

CRITICAL RULE: ONLY extract time information that is EXPLICITLY stated. Do NOT
infer, assume, or invent anything.

Output contract (STRICT JSON, nothing else):
{{"start_text": string|null, "end_text": string|null, "duration": string|null}}

- Each value is a VERBATIM substring of the query or null.
- Return null freely when something is absent or unclear.
- No absolute dates, no ISO, no defaults, no normalization.

Detection rules:
1) duration: phrases like "for 30 minutes", "2h30m", "1.5h", "90m",
   "half an hour". Not durations: phone numbers, prices, counts.
2) end_text: deadline markers (by, before, no later than, due, deadline,
   until-without-start, EOD/EOW/EOM, end of day/week/month) or the end side
   of a range (from X to Y, between X and Y, X-Y, X through Y).
3) start_text: start anchors (today, tomorrow, tonight, this evening,
   next week, weekday names, dates, clock times, "in 2 hours", "starting
   Friday", "from 3").

Examples:
- "call mom tomorrow 4pm" -> {{"start_text":"tomorrow 4pm","end_text":null,"duration":null}}
- "send report by Friday 5pm" -> {{"start_text":null,"end_text":"Friday 5pm","duration":null}}
- "study for 2 hours tonight" -> {{"start_text":"tonight","end_text":null,"duration":"2 hours"}}
- "work from 9am to 5pm" -> {{"start_text":"9am","end_text":"5pm","duration":null}}
- "call mom" -> {{"start_text":null,"end_text":null,"duration":null}}
- "buy groceries at the store" -> {{"start_text":null,"end_text":null,"duration":null}}

Location phrases ("at the store", "at home") are NOT time information.
If the query has no explicit temporal words at all, return all nulls.

User Query: "{query}"
User Timezone: {tz}

Extract the slots and return JSON:"#,
        query = query.text.trim(),
        tz = query.tz.name(),
    )
}

/// Run the extraction stage.
pub async fn extract_slots<L: LlmClient + ?Sized>(llm: &L, query: &Query) -> Result<RawSlot> {
    let prompt = prompt(query);
    model::complete_validated(llm, Stage::Extract, &prompt, TEMPERATURE_DEFAULT, |value| {
        serde_json::from_value::<RawSlot>(value).map_err(|e| format!("schema mismatch: {e}"))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockLlm;
    use chrono_tz::America::New_York;

    #[tokio::test]
    async fn extracts_fields_verbatim() {
        let llm = MockLlm::new();
        llm.push(r#"{"start_text": "tomorrow at 10am", "end_text": null, "duration": "45 minutes"}"#);

        let query = Query::new("Call dentist tomorrow at 10am for 45 minutes", New_York).unwrap();
        let slot = extract_slots(&llm, &query).await.unwrap();
        assert_eq!(slot.start_text.as_deref(), Some("tomorrow at 10am"));
        assert_eq!(slot.end_text, None);
        assert_eq!(slot.duration.as_deref(), Some("45 minutes"));
    }

    #[tokio::test]
    async fn all_null_output_is_a_valid_slot() {
        let llm = MockLlm::new();
        llm.push(r#"{"start_text": null, "end_text": null, "duration": null}"#);

        let query = Query::new("Call mom", New_York).unwrap();
        let slot = extract_slots(&llm, &query).await.unwrap();
        assert!(slot.is_empty());
    }

    #[tokio::test]
    async fn markdown_fenced_json_is_tolerated() {
        let llm = MockLlm::new();
        llm.push("```json\n{\"start_text\": \"6pm\", \"end_text\": null, \"duration\": null}\n```");

        let query = Query::new("dinner at 6pm", New_York).unwrap();
        let slot = extract_slots(&llm, &query).await.unwrap();
        assert_eq!(slot.start_text.as_deref(), Some("6pm"));
    }
}
