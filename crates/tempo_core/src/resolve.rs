//! Absolute resolution: turn raw temporal phrases into one concrete
//! calendar date/time pair, given a precomputed temporal context.

use serde::{Deserialize, Serialize};

use crate::context::TemporalContext;
use crate::error::Result;
use crate::extract::RawSlot;
use crate::model::{self, LlmClient, TEMPERATURE_DEFAULT};
use crate::pipeline::Stage;

/// Resolved absolute window in canonical text form.
///
/// Both endpoints are always present after this stage; the resolver
/// supplies NOW / end-of-today defaults when the query had none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsoluteSlot {
    pub start_text: String,
    pub end_text: String,
    pub duration: Option<String>,
}

fn prompt(raw: &RawSlot, ctx: &TemporalContext) -> String {
    let slots_json = serde_json::json!({
        "start_text": raw.start_text,
        "end_text": raw.end_text,
        "duration": raw.duration,
    });

    format!(
        r#"You are an Absolute Resolver that converts time slots to absolute dates/times.

CRITICAL RULES:
- ONLY resolve information that is explicitly provided; never invent times.
- Duration is metadata: copy it AS-IS, never use it to move start or end.
- Always produce one specific calendar date/time for BOTH start_text and end_text.
- Always ensure start <= end; repair deterministically if violated.

Output (STRICT JSON, nothing else):
{{"start_text": "Month DD, YYYY HH:MM am/pm", "end_text": "Month DD, YYYY HH:MM am/pm", "duration": string|null}}

Resolution rules:
1) Both present: resolve each side; bare times attach to the same resolved
   date; if end < start, move end forward one day (or to the weekday's next
   occurrence).
2) Only end_text (deadline): start = NOW_ISO in canonical form; end = the
   deadline, at 11:59 pm when it names no time.
3) Only start_text: end = 11:59 pm on the SAME date as the resolved start.
4) Neither: start = NOW_ISO in canonical form, end = END_OF_TODAY.

Phrase anchors:
- Unqualified weekday: next occurrence (today if its time has not passed).
- Bare time of day: today if still in the future, else tomorrow.
- morning 09:00, afternoon 01:00 pm, evening 06:00 pm, tonight 08:00 pm,
  noon 12:00 pm, midnight 12:00 am.
- "tomorrow" without a time: 12:00 am of the next day.
- "next week": NEXT_MONDAY. "end of week": END_OF_WEEK. "EOM"/"end of
  month": END_OF_MONTH.

Examples (assume NOW = October 21, 2025 03:00 pm):
- {{"start_text":null,"end_text":"Nov 15","duration":"2h"}} ->
  {{"start_text":"October 21, 2025 03:00 pm","end_text":"November 15, 2025 11:59 pm","duration":"2h"}}
- {{"start_text":"tomorrow","end_text":null,"duration":"30m"}} ->
  {{"start_text":"October 22, 2025 12:00 am","end_text":"October 22, 2025 11:59 pm","duration":"30m"}}
- {{"start_text":"9am","end_text":"5pm","duration":null}} ->
  {{"start_text":"October 21, 2025 09:00 am","end_text":"October 21, 2025 05:00 pm","duration":null}}
- {{"start_text":null,"end_text":null,"duration":"2 hours"}} ->
  {{"start_text":"October 21, 2025 03:00 pm","end_text":"October 21, 2025 11:59 pm","duration":"2 hours"}}

Current context:
{context}
Slots to resolve:
{slots}

Resolve to absolute dates/times and return JSON:"#,
        context = ctx.prompt_block(),
        slots = slots_json,
    )
}

/// Run the resolution stage.
pub async fn resolve_absolute<L: LlmClient + ?Sized>(
    llm: &L,
    raw: &RawSlot,
    ctx: &TemporalContext,
) -> Result<AbsoluteSlot> {
    let prompt = prompt(raw, ctx);
    model::complete_validated(llm, Stage::Resolve, &prompt, TEMPERATURE_DEFAULT, |value| {
        let slot: AbsoluteSlot =
            serde_json::from_value(value).map_err(|e| format!("schema mismatch: {e}"))?;
        if slot.start_text.trim().is_empty() || slot.end_text.trim().is_empty() {
            return Err("start_text and end_text must both be resolved".to_string());
        }
        Ok(slot)
    })
    .await
}
