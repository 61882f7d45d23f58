//! Time allotment: adapt pipeline outputs to the scheduler and validate
//! the result against the backend's busy picture.

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::calbridge::{BackendEvent, CalendarBackend};
use crate::classify::ClassifiedTask;
use crate::decompose::DecomposedTask;
use crate::duration::TaskDuration;
use crate::error::{CoreError, Result};
use crate::scheduler::{self, Constraints, ScheduleOptions};
use crate::standardize::StandardWindow;
use crate::task::{
    ScheduledComplex, ScheduledSimple, ScheduledSubtask, ScheduledTask, Slot, TaskKind,
};

/// Cooldown between subtasks of one complex task.
const SUBTASK_GAP_MINUTES: i64 = 5;
/// Ceiling on how far ahead the backend is asked for events.
const MAX_LOOKAHEAD_DAYS: i64 = 365;

type BusyInterval = (DateTime<FixedOffset>, DateTime<FixedOffset>);

/// Schedules tasks into backend free time.
pub struct Allotter<'a, B: CalendarBackend + ?Sized> {
    backend: &'a B,
    options: ScheduleOptions,
    holiday_calendar: String,
}

impl<'a, B: CalendarBackend + ?Sized> Allotter<'a, B> {
    pub fn new(backend: &'a B, options: ScheduleOptions, holiday_calendar: impl Into<String>) -> Self {
        Self {
            backend,
            options,
            holiday_calendar: holiday_calendar.into(),
        }
    }

    /// Place a simple task into the earliest acceptable slot.
    pub async fn allot_simple(
        &self,
        task: &ClassifiedTask,
        window: &StandardWindow,
        tz: Tz,
        now: DateTime<Tz>,
    ) -> Result<ScheduledTask> {
        debug_assert_eq!(task.kind, TaskKind::Simple);

        let duration = window
            .duration
            .or(task.duration)
            .unwrap_or(TaskDuration::DEFAULT_SIMPLE);

        let busy = self.busy_intervals(&task.calendar_id, window, now).await?;
        let availability = free_intervals(&busy, window.start, window.end);

        let schedule = self.run_scheduler(
            &[duration.minutes()],
            &availability,
            window,
            tz,
            &Constraints::default(),
        )?;

        let assignment = &schedule.assignments[0];
        let slot = Slot {
            start: assignment.start.fixed_offset(),
            end: assignment.end.fixed_offset(),
        };
        validate_slot(&slot, duration.minutes(), window, &busy)?;

        Ok(ScheduledTask::Simple(ScheduledSimple {
            calendar_id: task.calendar_id.clone(),
            title: task.title.clone(),
            slot,
            id: Uuid::new_v4(),
        }))
    }

    /// Place every subtask of a complex task, preserving their order.
    pub async fn allot_complex(
        &self,
        task: &DecomposedTask,
        window: &StandardWindow,
        tz: Tz,
        now: DateTime<Tz>,
    ) -> Result<ScheduledTask> {
        let durations: Vec<i64> = task.subtasks.iter().map(|s| s.duration.minutes()).collect();

        let busy = self.busy_intervals(&task.calendar_id, window, now).await?;
        let availability = free_intervals(&busy, window.start, window.end);

        let constraints = Constraints {
            min_gap_minutes: SUBTASK_GAP_MINUTES,
            ..Default::default()
        };
        let schedule = self.run_scheduler(&durations, &availability, window, tz, &constraints)?;

        let parent_id = Uuid::new_v4();
        let mut subtasks = Vec::with_capacity(task.subtasks.len());
        let mut prev_slot: Option<Slot> = None;

        for (spec, assignment) in task.subtasks.iter().zip(&schedule.assignments) {
            let slot = Slot {
                start: assignment.start.fixed_offset(),
                end: assignment.end.fixed_offset(),
            };
            validate_slot(&slot, spec.duration.minutes(), window, &busy)?;

            if let Some(prev) = prev_slot {
                if slot.overlaps(&prev) || slot.start < prev.end {
                    return Err(CoreError::TaValidation {
                        detail: format!(
                            "subtask {:?} starts before its predecessor ends",
                            spec.title
                        ),
                    });
                }
            }
            prev_slot = Some(slot);

            subtasks.push(ScheduledSubtask {
                title: spec.title.clone(),
                slot,
                id: Uuid::new_v4(),
                parent_id,
            });
        }

        Ok(ScheduledTask::Complex(ScheduledComplex {
            calendar_id: task.calendar_id.clone(),
            title: task.title.clone(),
            id: parent_id,
            subtasks,
        }))
    }

    fn run_scheduler(
        &self,
        durations: &[i64],
        availability: &[BusyInterval],
        window: &StandardWindow,
        tz: Tz,
        constraints: &Constraints,
    ) -> Result<scheduler::Schedule> {
        let availability: Vec<(DateTime<Tz>, DateTime<Tz>)> = availability
            .iter()
            .map(|&(a, b)| (a.with_timezone(&tz), b.with_timezone(&tz)))
            .collect();
        let deadline = window.end.with_timezone(&tz);
        scheduler::schedule_ordered(durations, &availability, deadline, constraints, &self.options)
    }

    /// Busy intervals for the calendar over the window, holidays excluded.
    async fn busy_intervals(
        &self,
        calendar_id: &str,
        window: &StandardWindow,
        now: DateTime<Tz>,
    ) -> Result<Vec<BusyInterval>> {
        let lookahead = (window.end.with_timezone(&now.timezone()) - now).num_days() + 1;
        let days = lookahead.clamp(1, MAX_LOOKAHEAD_DAYS);

        let events = self.backend.events(days, Some(calendar_id)).await?;
        let holiday = self.holiday_calendar.to_lowercase();

        let mut busy = Vec::new();
        for event in events {
            if is_holiday(&event, &holiday) {
                continue;
            }
            let (Ok(start), Ok(end)) = (
                DateTime::parse_from_rfc3339(&event.start_iso),
                DateTime::parse_from_rfc3339(&event.end_iso),
            ) else {
                warn!(event = %event.id, "skipping event with malformed timestamps");
                continue;
            };
            // Only events overlapping the window matter.
            if start < window.end && end > window.start {
                busy.push((start, end));
            }
        }
        busy.sort_by_key(|iv| iv.0);
        debug!(count = busy.len(), "busy intervals in window");
        Ok(busy)
    }
}

fn is_holiday(event: &BackendEvent, holiday_lower: &str) -> bool {
    event
        .calendar_title
        .as_deref()
        .map(|t| t.to_lowercase().contains(holiday_lower))
        .unwrap_or(false)
}

/// Complement of the busy intervals within `[start, end)`.
///
/// `busy` must be sorted by start; overlapping busy intervals are handled
/// by the running cursor.
pub fn free_intervals(
    busy: &[BusyInterval],
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
) -> Vec<BusyInterval> {
    let mut free = Vec::new();
    let mut cursor = start;

    for &(busy_start, busy_end) in busy {
        if busy_end <= cursor {
            continue;
        }
        if cursor < busy_start {
            let slot_end = busy_start.min(end);
            if cursor < slot_end {
                free.push((cursor, slot_end));
            }
        }
        cursor = cursor.max(busy_end);
        if cursor >= end {
            return free;
        }
    }

    if cursor < end {
        free.push((cursor, end));
    }
    free
}

/// Post-scheduler slot checks. A failure here means the scheduler broke an
/// invariant or the availability snapshot went stale.
fn validate_slot(
    slot: &Slot,
    duration_minutes: i64,
    window: &StandardWindow,
    busy: &[BusyInterval],
) -> Result<()> {
    if slot.start < window.start || slot.end > window.end {
        return Err(CoreError::TaValidation {
            detail: format!(
                "slot [{}, {}] escapes window [{}, {}]",
                slot.start.to_rfc3339(),
                slot.end.to_rfc3339(),
                window.start.to_rfc3339(),
                window.end.to_rfc3339()
            ),
        });
    }
    if slot.duration_minutes() != duration_minutes {
        return Err(CoreError::TaValidation {
            detail: format!(
                "slot is {} min, expected {duration_minutes}",
                slot.duration_minutes()
            ),
        });
    }
    for &(busy_start, busy_end) in busy {
        if slot.start < busy_end && slot.end > busy_start {
            return Err(CoreError::TaValidation {
                detail: format!(
                    "slot [{}, {}] overlaps a busy interval",
                    slot.start.to_rfc3339(),
                    slot.end.to_rfc3339()
                ),
            });
        }
    }
    Ok(())
}
