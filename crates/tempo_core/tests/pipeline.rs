//! End-to-end pipeline runs against mocked model and backend.

use chrono::{DateTime, TimeZone, Timelike};
use chrono_tz::America::New_York;
use chrono_tz::Tz;

use tempo_core::calbridge::CalendarInfo;
use tempo_core::creator::EventCreator;
use tempo_core::pipeline::{Pipeline, Stage, StageStatus};
use tempo_core::tempo_db::TaskDb;
use tempo_core::test_helpers::{MockBackend, MockLlm};
use tempo_core::{ScheduledTask, TempoConfig};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Tz> {
    New_York.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

fn standard_calendars() -> Vec<CalendarInfo> {
    vec![
        CalendarInfo {
            id: "cal-work".into(),
            title: "Work".into(),
            allows_modifications: true,
            color_hex: Some("#3366ff".into()),
        },
        CalendarInfo {
            id: "cal-home".into(),
            title: "Home".into(),
            allows_modifications: true,
            color_hex: Some("#33cc66".into()),
        },
        CalendarInfo {
            id: "cal-holidays".into(),
            title: "Holidays".into(),
            allows_modifications: false,
            color_hex: None,
        },
    ]
}

async fn pipeline(llm: MockLlm, backend: MockBackend) -> Pipeline<MockLlm, MockBackend> {
    let db = TaskDb::open_in_memory().await.unwrap();
    Pipeline::new(llm, backend, db, TempoConfig::default())
}

fn queue_japan_trip(llm: &MockLlm) {
    llm.push(r#"{"start_text": null, "end_text": "by Nov 25", "duration": null}"#);
    llm.push(
        r#"{"start_text":"November 18, 2025 01:08 am","end_text":"November 25, 2025 11:59 pm","duration":null}"#,
    );
    llm.push(r#"{"calendar":"cal-home","type":"complex","title":"Plan Japan trip","duration":null}"#);
    llm.push(
        r#"{"subtasks":[
            {"title":"Book flights (Japan trip)","duration":"PT1H"},
            {"title":"Book hotels (Japan trip)","duration":"PT2H"},
            {"title":"Plan city itineraries (Japan trip)","duration":"PT1H30M"},
            {"title":"Arrange rail passes (Japan trip)","duration":"PT2H"},
            {"title":"Pack and confirm (Japan trip)","duration":"PT45M"}
        ]}"#,
    );
}

#[tokio::test]
async fn simple_task_with_explicit_time() {
    let llm = MockLlm::new();
    llm.push(r#"{"start_text": "tomorrow at 10am", "end_text": null, "duration": "45 minutes"}"#);
    llm.push(
        r#"{"start_text":"November 19, 2025 10:00 am","end_text":"November 19, 2025 11:59 pm","duration":"45 minutes"}"#,
    );
    llm.push(r#"{"calendar":"cal-home","type":"simple","title":"Call dentist","duration":"PT45M"}"#);

    let backend = MockBackend::with_calendars(standard_calendars());
    let pipeline = pipeline(llm, backend).await;

    let trace = pipeline
        .run_at(
            "Call dentist tomorrow at 10am for 45 minutes",
            at(2025, 11, 18, 0, 0, 0),
        )
        .await;

    assert!(trace.succeeded(), "trace: {}", trace.to_json());
    let Some(ScheduledTask::Simple(simple)) = &trace.task else {
        panic!("expected a simple task in the trace");
    };
    assert_eq!(simple.calendar_id, "cal-home");
    assert_eq!(simple.slot.start.to_rfc3339(), "2025-11-19T10:00:00-05:00");
    assert_eq!(simple.slot.end.to_rfc3339(), "2025-11-19T10:45:00-05:00");

    let notes = pipeline.backend.last_notes().unwrap();
    assert_eq!(notes, format!("id: {}, parent_id: null", simple.id));

    let creator = EventCreator::new(&pipeline.backend, &pipeline.db);
    let rows = creator.list().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].parent_id, None);
}

#[tokio::test]
async fn complex_deadline_only_spreads_over_five_days() {
    let llm = MockLlm::new();
    queue_japan_trip(&llm);

    let backend = MockBackend::with_calendars(standard_calendars());
    let pipeline = pipeline(llm, backend).await;

    let trace = pipeline
        .run_at("Plan a 5-day Japan trip by Nov 25", at(2025, 11, 18, 1, 8, 55))
        .await;

    assert!(trace.succeeded(), "trace: {}", trace.to_json());
    let Some(ScheduledTask::Complex(complex)) = &trace.task else {
        panic!("expected a complex task in the trace");
    };
    assert_eq!(complex.subtasks.len(), 5);

    // Ordered, on distinct days, each day's placement starting at 06:00.
    let mut days = std::collections::BTreeSet::new();
    for (i, sub) in complex.subtasks.iter().enumerate() {
        assert_eq!(sub.parent_id, complex.id);
        days.insert(sub.slot.start.date_naive());
        assert_eq!(
            (sub.slot.start.hour(), sub.slot.start.minute()),
            (6, 0),
            "subtask {i} should start the day at 06:00"
        );
        if i > 0 {
            assert!(sub.slot.start >= complex.subtasks[i - 1].slot.end);
        }
    }
    assert_eq!(days.len(), 5);

    // Parent row exists but only children have backend events.
    let creator = EventCreator::new(&pipeline.backend, &pipeline.db);
    let rows = creator.list().await.unwrap();
    assert_eq!(rows.len(), 6);
    let parent = rows
        .iter()
        .find(|r| r.id == complex.id.to_string())
        .unwrap();
    assert!(parent.backend_event_id.is_none());
    assert_eq!(pipeline.backend.created_count(), 5);
}

#[tokio::test]
async fn atomic_task_without_time_defaults_to_half_hour() {
    let llm = MockLlm::new();
    llm.push(r#"{"start_text": null, "end_text": null, "duration": null}"#);
    llm.push(
        r#"{"start_text":"November 19, 2025 02:00 pm","end_text":"November 19, 2025 11:59 pm","duration":null}"#,
    );
    llm.push(r#"{"calendar":"cal-home","type":"simple","title":"Call mom","duration":null}"#);

    let backend = MockBackend::with_calendars(standard_calendars());
    let pipeline = pipeline(llm, backend).await;

    // Wednesday, 2 pm.
    let trace = pipeline.run_at("Call mom", at(2025, 11, 19, 14, 0, 0)).await;

    assert!(trace.succeeded(), "trace: {}", trace.to_json());
    let Some(ScheduledTask::Simple(simple)) = &trace.task else {
        panic!("expected a simple task");
    };
    assert_eq!(simple.slot.duration_minutes(), 30);
    assert_eq!(simple.slot.start.to_rfc3339(), "2025-11-19T14:00:00-05:00");
}

#[tokio::test]
async fn infeasible_total_aborts_before_any_write() {
    let llm = MockLlm::new();
    llm.push(r#"{"start_text": null, "end_text": "in 2 hours", "duration": null}"#);
    llm.push(
        r#"{"start_text":"November 19, 2025 02:00 pm","end_text":"November 19, 2025 04:00 pm","duration":null}"#,
    );
    llm.push(
        r#"{"calendar":"cal-work","type":"complex","title":"Prepare launch review","duration":null}"#,
    );
    llm.push(
        r#"{"subtasks":[
            {"title":"Collect metrics (launch review)","duration":"PT2H"},
            {"title":"Draft narrative (launch review)","duration":"PT2H"},
            {"title":"Build slides (launch review)","duration":"PT2H"},
            {"title":"Rehearse (launch review)","duration":"PT2H"},
            {"title":"Incorporate feedback (launch review)","duration":"PT2H"}
        ]}"#,
    );

    let backend = MockBackend::with_calendars(standard_calendars());
    let pipeline = pipeline(llm, backend).await;

    let trace = pipeline
        .run_at(
            "Prepare the launch review in the next two hours",
            at(2025, 11, 19, 14, 0, 0),
        )
        .await;

    assert_eq!(trace.exit_code, 2);
    let error = trace.error.as_ref().unwrap();
    assert_eq!(error.stage, Stage::Allot);
    assert!(error.code.contains("infeasible_total"), "code: {}", error.code);
    assert!(error.message.contains("need 600"), "message: {}", error.message);

    assert_eq!(pipeline.backend.created_count(), 0);
    let creator = EventCreator::new(&pipeline.backend, &pipeline.db);
    assert!(creator.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn cascade_delete_after_complex_commit() {
    let llm = MockLlm::new();
    queue_japan_trip(&llm);

    let backend = MockBackend::with_calendars(standard_calendars());
    let pipeline = pipeline(llm, backend).await;

    let trace = pipeline
        .run_at("Plan a 5-day Japan trip by Nov 25", at(2025, 11, 18, 1, 8, 55))
        .await;
    let parent_id = trace.task.as_ref().unwrap().id().to_string();

    let creator = EventCreator::new(&pipeline.backend, &pipeline.db);
    let report = creator.delete_task(&parent_id).await.unwrap();

    assert_eq!(report.backend_deleted, 5);
    assert_eq!(report.rows_deleted, 6);
    assert!(report.errors.is_empty());
    assert_eq!(pipeline.backend.deleted_ids().len(), 5);
    assert!(creator.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn partial_commit_reports_and_persists_successes() {
    let llm = MockLlm::new();
    queue_japan_trip(&llm);

    let backend = MockBackend::with_calendars(standard_calendars());
    // The backend starts rejecting at the third POST and never recovers.
    backend.fail_add_at(2);
    backend.fail_add_at(3);
    backend.fail_add_at(4);
    let pipeline = pipeline(llm, backend).await;

    let trace = pipeline
        .run_at("Plan a 5-day Japan trip by Nov 25", at(2025, 11, 18, 1, 8, 55))
        .await;

    // Partial success still exits cleanly, with the failure in the trace.
    assert_eq!(trace.exit_code, 0);
    let error = trace.error.as_ref().unwrap();
    assert_eq!(error.stage, Stage::Commit);
    assert!(error.code.contains("ec_partial"), "code: {}", error.code);

    let commit = trace.commit.as_ref().unwrap();
    assert_eq!(commit.created.len(), 2);
    assert_eq!(commit.failed.len(), 3);
    assert_eq!(commit.total, 5);

    let commit_stage = trace
        .stages
        .iter()
        .find(|s| s.stage == Stage::Commit)
        .unwrap();
    assert_eq!(commit_stage.status, StageStatus::Error);

    // Parent and the two successful children persist.
    let creator = EventCreator::new(&pipeline.backend, &pipeline.db);
    assert_eq!(creator.list().await.unwrap().len(), 3);
}

#[tokio::test]
async fn decompose_is_skipped_for_simple_tasks() {
    let llm = MockLlm::new();
    llm.push(r#"{"start_text": null, "end_text": null, "duration": null}"#);
    llm.push(
        r#"{"start_text":"November 19, 2025 02:00 pm","end_text":"November 19, 2025 11:59 pm","duration":null}"#,
    );
    llm.push(r#"{"calendar":"cal-home","type":"simple","title":"Call mom","duration":null}"#);

    let backend = MockBackend::with_calendars(standard_calendars());
    let pipeline = pipeline(llm, backend).await;
    let trace = pipeline.run_at("Call mom", at(2025, 11, 19, 14, 0, 0)).await;

    let decompose_stage = trace
        .stages
        .iter()
        .find(|s| s.stage == Stage::Decompose)
        .unwrap();
    assert_eq!(decompose_stage.status, StageStatus::Skipped);
}
