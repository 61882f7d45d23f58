//! Time standardization: canonical absolute text to zone-aware ISO window.
//!
//! No model involvement. The resolver's output is parsed against a fixed
//! grammar, repaired against the current clock, and checked for internal
//! consistency before anything downstream runs.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::localize;
use crate::duration::TaskDuration;
use crate::error::{CoreError, Result};
use crate::resolve::AbsoluteSlot;

/// The standardized scheduling window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub duration: Option<TaskDuration>,
}

/// Parse one absolute text in any accepted form, as local wall-clock time.
///
/// Accepted: canonical `"Month DD, YYYY HH:MM am|pm"`, the weekday-prefixed
/// extended form, and RFC 3339 as a fallback for resolver slips (its offset
/// is discarded; the wall time is kept).
fn parse_absolute(text: &str) -> Result<NaiveDateTime> {
    let trimmed = text.trim();

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%B %d, %Y %I:%M %p") {
        return Ok(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%A, %B %d, %Y %I:%M %p") {
        return Ok(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_local());
    }

    Err(CoreError::TsParse {
        text: trimmed.to_string(),
    })
}

/// Standardize a resolved slot into a zone-aware window.
///
/// `now` is injected rather than read from a clock so the repairs are
/// testable and a whole pipeline run sees one consistent instant.
pub fn standardize(slot: &AbsoluteSlot, tz: Tz, now: DateTime<Tz>) -> Result<StandardWindow> {
    let mut start = parse_absolute(&slot.start_text)?;
    let mut end = parse_absolute(&slot.end_text)?;

    // End-of-day anchors carry :59 seconds so the window reaches the last
    // schedulable minute; everything else is zeroed to the minute.
    let is_eod = slot.end_text.trim().to_lowercase().ends_with("11:59 pm");
    start = start.with_second(0).unwrap_or(start).with_nanosecond(0).unwrap_or(start);
    end = end.with_second(if is_eod { 59 } else { 0 }).unwrap_or(end);
    end = end.with_nanosecond(0).unwrap_or(end);

    // Repair stale references against the current clock.
    let now_local = now.naive_local();
    let start_past = start < now_local;
    let end_past = end < now_local;
    if start_past && end_past {
        warn!("both endpoints are in the past; shifting one day forward");
        start += Duration::days(1);
        end += Duration::days(1);
    } else if start_past {
        warn!("start is in the past; clamping to now");
        start = now_local;
    } else if end_past {
        warn!("end is in the past; moving it onto the start date");
        end = start
            .date()
            .and_hms_opt(end.hour(), end.minute(), end.second())
            .unwrap_or(start);
    }

    // start <= end, repaired by extending the end to the start's day.
    if end < start {
        warn!("end precedes start after repairs; extending to end of day");
        end = start.date().and_hms_opt(23, 59, 59).unwrap_or(start);
    }

    let duration = slot.duration.as_deref().and_then(|text| {
        let parsed = TaskDuration::parse(text);
        if parsed.is_none() {
            warn!(duration = text, "dropping unrecognized duration phrase");
        }
        parsed
    });

    let start = localize(tz, start);
    let end = localize(tz, end);

    if let Some(d) = duration {
        let window_minutes = (end - start).num_minutes();
        if window_minutes < d.minutes() {
            return Err(CoreError::TsInvariant {
                detail: format!(
                    "window of {window_minutes} min cannot hold a {} min task",
                    d.minutes()
                ),
            });
        }
    }

    Ok(StandardWindow {
        start: start.fixed_offset(),
        end: end.fixed_offset(),
        duration,
    })
}
