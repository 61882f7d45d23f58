//! Temporal context for the absolute resolver.
//!
//! The resolver model cannot be trusted with date arithmetic, so every
//! anchor it might need (end of today/week/month, next weekday
//! occurrences) is computed here and handed over as pre-resolved strings.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use chrono_tz::{OffsetComponents, Tz};

/// Context bundle handed to the absolute resolver prompt.
#[derive(Debug, Clone)]
pub struct TemporalContext {
    pub now_iso: String,
    pub timezone: String,
    pub today_human: String,
    /// Monday = 0 .. Sunday = 6
    pub today_dow_index: u32,
    pub is_dst: bool,
    pub end_of_today: String,
    pub end_of_week: String,
    pub end_of_month: String,
    pub next_monday: String,
    /// (weekday name, "Month DD, YYYY") for the next occurrence of each weekday
    pub next_occurrences: Vec<(&'static str, String)>,
}

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

impl TemporalContext {
    /// Compute the context for the given instant in the given zone.
    pub fn compute(tz: Tz, now: DateTime<Tz>) -> Self {
        let today = now.date_naive();
        let dow = now.weekday().num_days_from_monday();

        let end_of_today = at_time(tz, today, 23, 59);

        let days_until_sunday = (6 - dow) % 7;
        let end_of_week = at_time(tz, today + Duration::days(days_until_sunday as i64), 23, 59);

        let first_of_next_month = if today.month() == 12 {
            NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
        }
        .unwrap_or(today);
        let end_of_month = at_time(tz, first_of_next_month - Duration::days(1), 23, 59);

        let mut days_until_monday = (7 - dow) % 7;
        if days_until_monday == 0 {
            days_until_monday = 7;
        }
        let next_monday = at_time(tz, today + Duration::days(days_until_monday as i64), 9, 0);

        let next_occurrences = WEEKDAY_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut days_until = (i as u32 + 7 - dow) % 7;
                if days_until == 0 {
                    days_until = 7;
                }
                let date = today + Duration::days(days_until as i64);
                (*name, canonical_date(date))
            })
            .collect();

        Self {
            now_iso: now.to_rfc3339(),
            timezone: tz.name().to_string(),
            today_human: format!("{}, {}", now.format("%A"), canonical_date(today)),
            today_dow_index: dow,
            is_dst: now.offset().dst_offset() > Duration::zero(),
            end_of_today: canonical(&end_of_today),
            end_of_week: canonical(&end_of_week),
            end_of_month: canonical(&end_of_month),
            next_monday: canonical(&next_monday),
            next_occurrences,
        }
    }

    /// Render the context as the key/value block embedded in prompts.
    pub fn prompt_block(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("NOW_ISO: {}\n", self.now_iso));
        out.push_str(&format!("TIMEZONE: {}\n", self.timezone));
        out.push_str(&format!("TODAY_HUMAN: {}\n", self.today_human));
        out.push_str(&format!("TODAY_DOW_INDEX: {}\n", self.today_dow_index));
        out.push_str(&format!("IS_DST: {}\n", self.is_dst));
        out.push_str(&format!("END_OF_TODAY: {}\n", self.end_of_today));
        out.push_str(&format!("END_OF_WEEK: {}\n", self.end_of_week));
        out.push_str(&format!("END_OF_MONTH: {}\n", self.end_of_month));
        out.push_str(&format!("NEXT_MONDAY: {}\n", self.next_monday));
        out.push_str("NEXT_OCCURRENCES:\n");
        for (name, date) in &self.next_occurrences {
            out.push_str(&format!("  {name}: {date}\n"));
        }
        out
    }
}

/// Format a datetime in the canonical absolute form,
/// e.g. `November 19, 2025 10:00 am`.
pub fn canonical(dt: &DateTime<Tz>) -> String {
    let (is_pm, hour12) = dt.hour12();
    format!(
        "{} {:02}:{:02} {}",
        canonical_date(dt.date_naive()),
        hour12,
        dt.minute(),
        if is_pm { "pm" } else { "am" }
    )
}

/// Format a date in the canonical form, e.g. `November 19, 2025`.
pub fn canonical_date(date: NaiveDate) -> String {
    format!("{} {:02}, {}", date.format("%B"), date.day(), date.year())
}

/// Attach a zone to a naive wall-clock time, resolving DST folds to the
/// earlier instant and DST gaps to the first valid instant after the gap.
pub(crate) fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => {
            let mut probe = naive;
            for _ in 0..8 {
                probe += Duration::minutes(30);
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt;
                }
            }
            // Unreachable for real zones; fall back to interpreting as UTC.
            DateTime::<chrono::Utc>::from_naive_utc_and_offset(naive, chrono::Utc)
                .with_timezone(&tz)
        }
    }
}

fn at_time(tz: Tz, date: NaiveDate, hour: u32, minute: u32) -> DateTime<Tz> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    localize(tz, date.and_time(time))
}
