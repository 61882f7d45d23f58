//! Minute-precision task durations.
//!
//! Durations arrive from users and language models in many shapes
//! ("45 minutes", "2h30m", "1.5h", "1:30", "PT45M") and leave the system
//! as ISO-8601 strings. `TaskDuration` is the single normalization point.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A task duration, stored as whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskDuration {
    minutes: i64,
}

struct DurationPatterns {
    minutes: Regex,
    hours: Regex,
    compound: Regex,
    decimal: Regex,
    clock: Regex,
    iso: Regex,
}

fn patterns() -> &'static DurationPatterns {
    static PATTERNS: OnceLock<DurationPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| DurationPatterns {
        minutes: Regex::new(r"^(\d+)\s*(?:m|min|mins|minute|minutes)$").unwrap(),
        hours: Regex::new(r"^(\d+)\s*(?:h|hr|hrs|hour|hours)$").unwrap(),
        compound: Regex::new(
            r"^(\d+)\s*(?:h|hr|hrs|hour|hours)\s*(\d+)\s*(?:m|min|mins|minute|minutes)?$",
        )
        .unwrap(),
        decimal: Regex::new(r"^(\d+\.\d+)\s*(?:h|hr|hrs|hour|hours)$").unwrap(),
        clock: Regex::new(r"^(\d+):([0-5]\d)$").unwrap(),
        iso: Regex::new(r"^[Pp][Tt](?:(\d+)[Hh])?(?:(\d+)[Mm])?(?:(\d+)[Ss])?$").unwrap(),
    })
}

impl TaskDuration {
    /// Thirty minutes, the default for atomic tasks with no stated duration.
    pub const DEFAULT_SIMPLE: TaskDuration = TaskDuration { minutes: 30 };

    /// Three hours, the per-subtask ceiling for decomposed work.
    pub const SUBTASK_MAX: TaskDuration = TaskDuration { minutes: 180 };

    pub const fn from_minutes(minutes: i64) -> Self {
        Self { minutes }
    }

    pub fn minutes(&self) -> i64 {
        self.minutes
    }

    pub fn as_chrono(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes)
    }

    /// Parse a human or ISO-8601 duration phrase.
    ///
    /// Unknown forms yield `None`; callers decide whether that is an error
    /// or simply an absent duration.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }

        let p = patterns();

        if let Some(caps) = p.iso.captures(&text) {
            let hours: i64 = caps.get(1).map_or(0, |m| m.as_str().parse().unwrap_or(0));
            let minutes: i64 = caps.get(2).map_or(0, |m| m.as_str().parse().unwrap_or(0));
            let seconds: i64 = caps.get(3).map_or(0, |m| m.as_str().parse().unwrap_or(0));
            if caps.get(1).is_none() && caps.get(2).is_none() && caps.get(3).is_none() {
                return None;
            }
            return Some(Self::from_minutes(hours * 60 + minutes + seconds / 60));
        }

        if let Some(caps) = p.compound.captures(&text) {
            let hours: i64 = caps[1].parse().ok()?;
            let minutes: i64 = caps[2].parse().ok()?;
            return Some(Self::from_minutes(hours * 60 + minutes));
        }

        if let Some(caps) = p.minutes.captures(&text) {
            return Some(Self::from_minutes(caps[1].parse().ok()?));
        }

        if let Some(caps) = p.hours.captures(&text) {
            let hours: i64 = caps[1].parse().ok()?;
            return Some(Self::from_minutes(hours * 60));
        }

        if let Some(caps) = p.decimal.captures(&text) {
            let hours: f64 = caps[1].parse().ok()?;
            return Some(Self::from_minutes((hours * 60.0).round() as i64));
        }

        if let Some(caps) = p.clock.captures(&text) {
            let hours: i64 = caps[1].parse().ok()?;
            let minutes: i64 = caps[2].parse().ok()?;
            return Some(Self::from_minutes(hours * 60 + minutes));
        }

        match text.as_str() {
            "half an hour" | "half hour" => Some(Self::from_minutes(30)),
            "an hour" | "one hour" => Some(Self::from_minutes(60)),
            _ => None,
        }
    }
}

impl fmt::Display for TaskDuration {
    /// Renders the ISO-8601 form, e.g. `PT1H30M`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.minutes / 60;
        let minutes = self.minutes % 60;
        write!(f, "PT")?;
        if hours > 0 {
            write!(f, "{hours}H")?;
        }
        if minutes > 0 || hours == 0 {
            write!(f, "{minutes}M")?;
        }
        Ok(())
    }
}

impl FromStr for TaskDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unrecognized duration: {s:?}"))
    }
}

impl TryFrom<String> for TaskDuration {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskDuration> for String {
    fn from(value: TaskDuration) -> Self {
        value.to_string()
    }
}
