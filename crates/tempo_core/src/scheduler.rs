//! Ordered even-spread scheduling.
//!
//! A pure function from availability + constraints to concrete
//! assignments. Input order is a hard constraint (subtasks are
//! prerequisite-ordered); spreading work evenly across the horizon is a
//! soft objective expressed through the day-ranking key.
//!
//! All arithmetic happens on zone-aware datetimes so midnight splits and
//! work-window boundaries stay correct across DST transitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::context::localize;
use crate::error::{CoreError, Result};

/// Daily work window, in local hours.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleOptions {
    /// First schedulable hour (inclusive).
    pub work_start_hour: u32,
    /// Last schedulable hour (exclusive).
    pub work_end_hour: u32,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            work_start_hour: 6,
            work_end_hour: 23,
        }
    }
}

/// Optional constraints layered on top of the work window.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    /// Recurring per-weekday blocked intervals.
    pub weekly_blackouts: Vec<(Weekday, NaiveTime, NaiveTime)>,
    /// Blocked intervals on specific dates.
    pub date_blackouts: Vec<(NaiveDate, NaiveTime, NaiveTime)>,
    /// Cooldown after each placed task on the same day.
    pub min_gap_minutes: i64,
    /// Cap on tasks per day (None = unlimited).
    pub max_tasks_per_day: Option<usize>,
}

/// One placed task.
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub task_index: usize,
    pub duration_minutes: i64,
    pub day: NaiveDate,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

/// Full placement result.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Assignments in input (= execution) order.
    pub assignments: Vec<Assignment>,
    /// Number of tasks placed on each day.
    pub per_day: BTreeMap<NaiveDate, usize>,
}

type Interval = (DateTime<Tz>, DateTime<Tz>);

/// Place `durations` (minutes, input-ordered) into `availability` before
/// `deadline`.
pub fn schedule_ordered(
    durations: &[i64],
    availability: &[Interval],
    deadline: DateTime<Tz>,
    constraints: &Constraints,
    options: &ScheduleOptions,
) -> Result<Schedule> {
    let tz = deadline.timezone();

    // 1) Normalize: split at local midnight, cap at the deadline, clip to
    // the work window, group by local date.
    let mut pieces: Vec<Interval> = Vec::new();
    for &(a, b) in availability {
        if a >= b {
            continue;
        }
        split_at_midnight(a, b, &mut pieces);
    }

    let mut days: BTreeMap<NaiveDate, Vec<Interval>> = BTreeMap::new();
    for (a, b) in pieces {
        if a >= deadline {
            continue;
        }
        let b = b.min(deadline);
        let date = a.date_naive();
        let work_start = at_hour(tz, date, options.work_start_hour);
        let work_end = at_hour(tz, date, options.work_end_hour);
        let start = a.max(work_start);
        let end = b.min(work_end);
        if start < end {
            days.entry(date).or_default().push((start, end));
        }
    }

    for (date, intervals) in days.iter_mut() {
        intervals.sort_by_key(|iv| iv.0);
        for (bs, be) in blackouts_for(constraints, *date) {
            let bs = localize(tz, date.and_time(bs));
            let be = localize(tz, date.and_time(be));
            *intervals = subtract(intervals, bs, be);
        }
    }
    days.retain(|_, intervals| !intervals.is_empty());

    if days.is_empty() {
        return Err(CoreError::NoEligibleDays);
    }

    // 2) Global feasibility.
    let have: i64 = days
        .values()
        .flatten()
        .map(|&(a, b)| (b - a).num_minutes())
        .sum();
    let need: i64 = durations.iter().sum();
    if have < need {
        return Err(CoreError::InfeasibleTotal { need, have });
    }

    let day_list: Vec<NaiveDate> = days.keys().copied().collect();
    let day_count = day_list.len();

    // 3) Even-spread target day index per task.
    let n = durations.len();
    let targets: Vec<usize> = (0..n)
        .map(|i| {
            if n == 1 {
                0
            } else {
                ((i as f64) * (day_count as f64 - 1.0) / (n as f64 - 1.0)).round() as usize
            }
        })
        .collect();

    // 4) Greedy placement in input order.
    let mut per_day: BTreeMap<NaiveDate, usize> =
        day_list.iter().map(|&d| (d, 0usize)).collect();
    let mut last_end_on_day: BTreeMap<NaiveDate, DateTime<Tz>> = BTreeMap::new();
    let mut prev_end: Option<DateTime<Tz>> = None;
    let mut assignments: Vec<Assignment> = Vec::with_capacity(n);

    for (i, &duration) in durations.iter().enumerate() {
        let need = Duration::minutes(duration);

        let mut ranked: Vec<usize> = (0..day_count).collect();
        ranked.sort_by_key(|&di| (di.abs_diff(targets[i]), per_day[&day_list[di]], di));

        let mut placed = false;
        for &di in &ranked {
            let day = day_list[di];
            if let Some(cap) = constraints.max_tasks_per_day {
                if per_day[&day] >= cap {
                    continue;
                }
            }

            // Execution order: never start before the previous task ended.
            // On a day that already holds a task, also honor the cooldown.
            let mut floor = prev_end;
            if let Some(&last_end) = last_end_on_day.get(&day) {
                let gapped = last_end + Duration::minutes(constraints.min_gap_minutes);
                floor = Some(floor.map_or(gapped, |f| f.max(gapped)));
            }

            let intervals = match days.get(&day) {
                Some(iv) => iv,
                None => continue,
            };
            let mut found = None;
            for &(a, b) in intervals {
                let start = match floor {
                    Some(f) if f > a => f,
                    _ => a,
                };
                let end = start + need;
                if end <= b && end <= deadline {
                    found = Some((start, end));
                    break;
                }
            }

            if let Some((start, end)) = found {
                let cooldown_end = end + Duration::minutes(constraints.min_gap_minutes);
                let updated = subtract(&days[&day], start, cooldown_end);
                days.insert(day, updated);

                *per_day.entry(day).or_insert(0) += 1;
                last_end_on_day
                    .entry(day)
                    .and_modify(|e| *e = (*e).max(end))
                    .or_insert(end);
                prev_end = Some(end);

                assignments.push(Assignment {
                    task_index: i,
                    duration_minutes: duration,
                    day,
                    start,
                    end,
                });
                placed = true;
                break;
            }
        }

        if !placed {
            return Err(CoreError::InfeasibleLocal {
                task_index: i,
                duration,
            });
        }
    }

    Ok(Schedule {
        assignments,
        per_day,
    })
}

/// Split `[a, b)` into segments that never cross a local midnight.
fn split_at_midnight(a: DateTime<Tz>, b: DateTime<Tz>, out: &mut Vec<Interval>) {
    let mut cur = a;
    while cur < b {
        let next_mid = next_local_midnight(cur);
        let seg_end = b.min(next_mid);
        out.push((cur, seg_end));
        if seg_end <= cur {
            break;
        }
        cur = seg_end;
    }
}

fn next_local_midnight(dt: DateTime<Tz>) -> DateTime<Tz> {
    let tz = dt.timezone();
    match dt.date_naive().succ_opt() {
        Some(next) => localize(tz, next.and_time(NaiveTime::MIN)),
        None => dt,
    }
}

fn at_hour(tz: Tz, date: NaiveDate, hour: u32) -> DateTime<Tz> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    localize(tz, date.and_time(time))
}

fn blackouts_for(constraints: &Constraints, date: NaiveDate) -> Vec<(NaiveTime, NaiveTime)> {
    let weekday = date.weekday();
    constraints
        .weekly_blackouts
        .iter()
        .filter(|(w, _, _)| *w == weekday)
        .map(|&(_, s, e)| (s, e))
        .chain(
            constraints
                .date_blackouts
                .iter()
                .filter(|(d, _, _)| *d == date)
                .map(|&(_, s, e)| (s, e)),
        )
        .collect()
}

/// Remove `[s, e)` from a sorted interval list, merging the remainder.
fn subtract(intervals: &[Interval], s: DateTime<Tz>, e: DateTime<Tz>) -> Vec<Interval> {
    let mut out: Vec<Interval> = Vec::with_capacity(intervals.len() + 1);
    for &(a, b) in intervals {
        if e <= a || s >= b {
            out.push((a, b));
        } else {
            if a < s {
                out.push((a, s));
            }
            if e < b {
                out.push((e, b));
            }
        }
    }
    out.sort_by_key(|iv| iv.0);

    let mut merged: Vec<Interval> = Vec::with_capacity(out.len());
    for iv in out {
        match merged.last_mut() {
            Some(last) if last.1 >= iv.0 => {
                if iv.1 > last.1 {
                    last.1 = iv.1;
                }
            }
            _ => merged.push(iv),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use chrono_tz::America::New_York;

    fn dt(text: &str) -> DateTime<Tz> {
        let naive = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").unwrap();
        localize(New_York, naive)
    }

    fn slots(pairs: &[(&str, &str)]) -> Vec<Interval> {
        pairs.iter().map(|&(a, b)| (dt(a), dt(b))).collect()
    }

    fn date(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    const TASKS_COMMON: [i64; 5] = [180, 150, 120, 180, 90];

    fn wide_horizon() -> Vec<Interval> {
        slots(&[
            ("2025-10-13T20:45:35", "2025-10-14T15:55:00"),
            ("2025-10-14T18:00:00", "2025-10-15T18:15:00"),
            ("2025-10-15T20:30:00", "2025-10-20T11:45:00"),
            ("2025-10-20T13:00:00", "2025-10-21T15:55:00"),
            ("2025-10-21T18:00:00", "2025-10-27T11:45:00"),
            ("2025-10-27T13:00:00", "2025-10-28T15:55:00"),
            ("2025-10-28T18:00:00", "2025-11-01T20:45:35"),
        ])
    }

    fn assert_invariants(
        schedule: &Schedule,
        durations: &[i64],
        deadline: DateTime<Tz>,
        constraints: &Constraints,
        options: &ScheduleOptions,
    ) {
        assert_eq!(schedule.assignments.len(), durations.len());
        for (i, a) in schedule.assignments.iter().enumerate() {
            // input order preserved
            assert_eq!(a.task_index, i);
            // duration fidelity
            assert_eq!((a.end - a.start).num_minutes(), durations[i]);
            // deadline
            assert!(a.end <= deadline);
            // no midnight crossing
            assert_eq!(a.start.date_naive(), a.end.date_naive());
            // work window
            assert!(a.start.time() >= NaiveTime::from_hms_opt(options.work_start_hour, 0, 0).unwrap());
            assert!(a.end.time() <= NaiveTime::from_hms_opt(options.work_end_hour, 0, 0).unwrap());
            // execution order is strict
            if i > 0 {
                assert!(a.start >= schedule.assignments[i - 1].end);
            }
        }
        if let Some(cap) = constraints.max_tasks_per_day {
            for &count in schedule.per_day.values() {
                assert!(count <= cap);
            }
        }
        // min gap between same-day neighbors
        for a in &schedule.assignments {
            for b in &schedule.assignments {
                if a.task_index < b.task_index && a.day == b.day {
                    assert!(
                        b.start - a.end >= Duration::minutes(constraints.min_gap_minutes),
                        "gap violated between {} and {}",
                        a.task_index,
                        b.task_index
                    );
                }
            }
        }
    }

    #[test]
    fn wide_horizon_spreads_over_distinct_days() {
        let deadline = dt("2025-11-01T23:59:00");
        let constraints = Constraints::default();
        let options = ScheduleOptions::default();
        let schedule =
            schedule_ordered(&TASKS_COMMON, &wide_horizon(), deadline, &constraints, &options)
                .unwrap();

        assert_invariants(&schedule, &TASKS_COMMON, deadline, &constraints, &options);
        let distinct_days: std::collections::BTreeSet<_> =
            schedule.assignments.iter().map(|a| a.day).collect();
        assert_eq!(distinct_days.len(), 5, "anti-bunching should use 5 days");
    }

    #[test]
    fn tight_but_feasible_places_every_task() {
        let deadline = dt("2025-10-21T23:59:00");
        let availability = slots(&[
            ("2025-10-14T06:30:00", "2025-10-14T09:30:00"),
            ("2025-10-15T08:00:00", "2025-10-15T09:30:00"),
            ("2025-10-16T07:00:00", "2025-10-16T08:30:00"),
            ("2025-10-17T19:00:00", "2025-10-17T21:00:00"),
            ("2025-10-20T06:00:00", "2025-10-20T07:30:00"),
            ("2025-10-21T20:00:00", "2025-10-21T23:00:00"),
        ]);
        let durations = [180, 90, 60, 90, 60];
        let constraints = Constraints::default();
        let options = ScheduleOptions::default();

        let schedule =
            schedule_ordered(&durations, &availability, deadline, &constraints, &options).unwrap();
        assert_invariants(&schedule, &durations, deadline, &constraints, &options);
    }

    #[test]
    fn starved_horizon_reports_totals() {
        let deadline = dt("2025-10-21T23:59:00");
        let availability = slots(&[
            ("2025-10-14T07:00:00", "2025-10-14T09:00:00"),
            ("2025-10-15T08:00:00", "2025-10-15T09:00:00"),
            ("2025-10-16T07:00:00", "2025-10-16T08:00:00"),
            ("2025-10-17T19:00:00", "2025-10-17T20:30:00"),
            ("2025-10-20T06:30:00", "2025-10-20T07:30:00"),
            ("2025-10-21T20:00:00", "2025-10-21T22:00:00"),
        ]);

        let err = schedule_ordered(
            &TASKS_COMMON,
            &availability,
            deadline,
            &Constraints::default(),
            &ScheduleOptions::default(),
        )
        .unwrap_err();

        match err {
            CoreError::InfeasibleTotal { need, have } => {
                assert_eq!(need, 720);
                assert_eq!(have, 510);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn three_day_horizon_with_gap_and_cap() {
        let deadline = dt("2025-10-16T23:59:00");
        let availability = slots(&[
            ("2025-10-14T07:00:00", "2025-10-14T14:00:00"),
            ("2025-10-15T07:00:00", "2025-10-15T10:30:00"),
            ("2025-10-16T07:00:00", "2025-10-16T11:00:00"),
        ]);
        let constraints = Constraints {
            min_gap_minutes: 30,
            max_tasks_per_day: Some(2),
            ..Default::default()
        };
        let options = ScheduleOptions::default();
        let durations = [90, 60, 90, 60, 60];

        let schedule =
            schedule_ordered(&durations, &availability, deadline, &constraints, &options).unwrap();
        assert_invariants(&schedule, &durations, deadline, &constraints, &options);
    }

    #[test]
    fn weekly_blackout_is_avoided() {
        let deadline = dt("2025-10-16T23:59:00");
        // 2025-10-13 is a Monday; the availability includes Tue-Thu only,
        // so add a blackout on Wednesday mornings instead.
        let availability = slots(&[
            ("2025-10-14T07:00:00", "2025-10-14T14:00:00"),
            ("2025-10-15T07:00:00", "2025-10-15T10:30:00"),
            ("2025-10-16T07:00:00", "2025-10-16T11:00:00"),
        ]);
        let constraints = Constraints {
            weekly_blackouts: vec![(
                Weekday::Wed,
                NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            )],
            ..Default::default()
        };
        let options = ScheduleOptions::default();
        let durations = [60, 60, 60];

        let schedule =
            schedule_ordered(&durations, &availability, deadline, &constraints, &options).unwrap();
        assert_invariants(&schedule, &durations, deadline, &constraints, &options);
        for a in &schedule.assignments {
            if a.day == date("2025-10-15") {
                assert!(a.start.time() >= NaiveTime::from_hms_opt(9, 0, 0).unwrap());
            }
        }
    }

    #[test]
    fn date_blackout_is_avoided() {
        let deadline = dt("2025-10-16T23:59:00");
        let availability = slots(&[
            ("2025-10-15T07:00:00", "2025-10-15T10:30:00"),
            ("2025-10-16T07:00:00", "2025-10-16T11:00:00"),
        ]);
        let constraints = Constraints {
            date_blackouts: vec![(
                date("2025-10-15"),
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            )],
            ..Default::default()
        };
        let options = ScheduleOptions::default();
        let durations = [120, 60];

        let schedule =
            schedule_ordered(&durations, &availability, deadline, &constraints, &options).unwrap();
        let blackout_start = dt("2025-10-15T09:00:00");
        let blackout_end = dt("2025-10-15T09:30:00");
        for a in &schedule.assignments {
            assert!(a.end <= blackout_start || a.start >= blackout_end);
        }
    }

    #[test]
    fn single_task_lands_on_the_first_day() {
        let deadline = dt("2025-10-16T23:59:00");
        let availability = slots(&[
            ("2025-10-14T07:00:00", "2025-10-14T14:00:00"),
            ("2025-10-15T07:00:00", "2025-10-15T10:30:00"),
            ("2025-10-16T07:00:00", "2025-10-16T11:00:00"),
        ]);

        let schedule = schedule_ordered(
            &[45],
            &availability,
            deadline,
            &Constraints::default(),
            &ScheduleOptions::default(),
        )
        .unwrap();
        assert_eq!(schedule.assignments[0].day, date("2025-10-14"));
        assert_eq!(schedule.assignments[0].start, dt("2025-10-14T07:00:00"));
    }

    #[test]
    fn availability_outside_work_window_is_clipped() {
        let deadline = dt("2025-10-15T23:59:00");
        // 4 am to 7 am: only 6-7 am survives the clip.
        let availability = slots(&[("2025-10-15T04:00:00", "2025-10-15T07:00:00")]);

        let schedule = schedule_ordered(
            &[60],
            &availability,
            deadline,
            &Constraints::default(),
            &ScheduleOptions::default(),
        )
        .unwrap();
        assert_eq!(schedule.assignments[0].start, dt("2025-10-15T06:00:00"));

        let err = schedule_ordered(
            &[90],
            &availability,
            deadline,
            &Constraints::default(),
            &ScheduleOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InfeasibleTotal { .. }));
    }

    #[test]
    fn midnight_spanning_availability_is_split() {
        let deadline = dt("2025-10-16T23:59:00");
        let availability = slots(&[("2025-10-14T21:00:00", "2025-10-15T08:00:00")]);

        let schedule = schedule_ordered(
            &[90, 90],
            &availability,
            deadline,
            &Constraints::default(),
            &ScheduleOptions::default(),
        )
        .unwrap();
        assert_eq!(schedule.assignments[0].day, date("2025-10-14"));
        assert_eq!(schedule.assignments[1].day, date("2025-10-15"));
        for a in &schedule.assignments {
            assert_eq!(a.start.date_naive(), a.end.date_naive());
        }
    }

    #[test]
    fn empty_availability_has_no_eligible_days() {
        let deadline = dt("2025-10-16T23:59:00");
        let err = schedule_ordered(
            &[30],
            &[],
            deadline,
            &Constraints::default(),
            &ScheduleOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::NoEligibleDays));
    }

    #[test]
    fn per_task_failure_names_the_task() {
        let deadline = dt("2025-10-15T23:59:00");
        // 3 hours total, but fragmented into 1-hour islands: a 2-hour task
        // fits nowhere even though the total is sufficient.
        let availability = slots(&[
            ("2025-10-14T07:00:00", "2025-10-14T08:00:00"),
            ("2025-10-14T10:00:00", "2025-10-14T11:00:00"),
            ("2025-10-15T07:00:00", "2025-10-15T08:00:00"),
        ]);

        let err = schedule_ordered(
            &[60, 120],
            &availability,
            deadline,
            &Constraints::default(),
            &ScheduleOptions::default(),
        )
        .unwrap_err();
        match err {
            CoreError::InfeasibleLocal { task_index, duration } => {
                assert_eq!(task_index, 1);
                assert_eq!(duration, 120);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn dst_fall_back_day_keeps_wall_clock_windows() {
        // 2025-11-02 is the fall-back day in New York (25 wall hours).
        let deadline = dt("2025-11-03T23:59:00");
        let availability = slots(&[("2025-11-02T00:30:00", "2025-11-02T10:00:00")]);

        let schedule = schedule_ordered(
            &[60],
            &availability,
            deadline,
            &Constraints::default(),
            &ScheduleOptions::default(),
        )
        .unwrap();
        let a = &schedule.assignments[0];
        assert_eq!(a.day, date("2025-11-02"));
        assert!(a.start.time() >= NaiveTime::from_hms_opt(6, 0, 0).unwrap());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_durations() -> impl Strategy<Value = Vec<i64>> {
            prop::collection::vec(15i64..=180, 1..=6)
        }

        fn arb_availability() -> impl Strategy<Value = Vec<(u32, u32, u32)>> {
            // (day offset, start hour, length hours) within October 2025
            prop::collection::vec((0u32..10, 5u32..20, 1u32..6), 1..=8)
        }

        proptest! {
            #[test]
            fn placements_respect_all_hard_constraints(
                durations in arb_durations(),
                raw in arb_availability(),
                gap in 0i64..=45,
                cap in prop::option::of(1usize..=3),
            ) {
                let availability: Vec<Interval> = raw
                    .iter()
                    .map(|&(day, hour, len)| {
                        let date = NaiveDate::from_ymd_opt(2025, 10, 10 + day)
                            .unwrap_or_else(|| NaiveDate::from_ymd_opt(2025, 10, 20).unwrap());
                        let start = localize(
                            New_York,
                            date.and_hms_opt(hour, 0, 0).unwrap(),
                        );
                        (start, start + Duration::hours(len as i64))
                    })
                    .collect();
                let deadline = localize(
                    New_York,
                    NaiveDate::from_ymd_opt(2025, 10, 25)
                        .unwrap()
                        .and_hms_opt(23, 59, 0)
                        .unwrap(),
                );
                let constraints = Constraints {
                    min_gap_minutes: gap,
                    max_tasks_per_day: cap,
                    ..Default::default()
                };
                let options = ScheduleOptions::default();

                match schedule_ordered(&durations, &availability, deadline, &constraints, &options) {
                    Ok(schedule) => {
                        assert_invariants(&schedule, &durations, deadline, &constraints, &options);
                    }
                    Err(CoreError::InfeasibleTotal { need, have }) => {
                        // feasibility completeness: the reported shortfall is real
                        prop_assert!(need > have);
                        prop_assert_eq!(need, durations.iter().sum::<i64>());
                    }
                    Err(CoreError::InfeasibleLocal { task_index, .. }) => {
                        prop_assert!(task_index < durations.len());
                    }
                    Err(CoreError::NoEligibleDays) => {}
                    Err(other) => return Err(TestCaseError::fail(format!("{other:?}"))),
                }
            }
        }
    }
}
