//! Pipeline orchestration.
//!
//! A linear driver: extraction, resolution, standardization,
//! classification, optional decomposition, allotment, commit. Each stage
//! consumes the previous stage's output; the first structured error stops
//! the run and is recorded against its stage in the trace.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use tempo_db::TaskDb;

use crate::allot::Allotter;
use crate::calbridge::CalendarBackend;
use crate::classify;
use crate::config::TempoConfig;
use crate::context::TemporalContext;
use crate::creator::{CommitReport, EventCreator};
use crate::decompose;
use crate::error::CoreError;
use crate::extract;
use crate::model::LlmClient;
use crate::resolve;
use crate::scheduler::ScheduleOptions;
use crate::standardize::{self, StandardWindow};
use crate::task::{Query, ScheduledTask, TaskKind};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Resolve,
    Standardize,
    Classify,
    Decompose,
    Allot,
    Commit,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Extract,
        Stage::Resolve,
        Stage::Standardize,
        Stage::Classify,
        Stage::Decompose,
        Stage::Allot,
        Stage::Commit,
    ];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Resolve => "resolve",
            Stage::Standardize => "standardize",
            Stage::Classify => "classify",
            Stage::Decompose => "decompose",
            Stage::Allot => "allot",
            Stage::Commit => "commit",
        };
        write!(f, "{name}")
    }
}

/// Per-stage outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Ok,
    Skipped,
    Error,
}

/// One stage's entry in the trace.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The error that stopped (or blemished) a run.
#[derive(Debug, Clone, Serialize)]
pub struct TraceError {
    pub stage: Stage,
    pub code: String,
    pub message: String,
}

/// Full record of one pipeline run, renderable as text or JSON.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub query: String,
    pub timezone: String,
    pub stages: Vec<StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<StandardWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<ScheduledTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TraceError>,
    pub exit_code: i32,
}

impl Trace {
    fn new(query: &str, timezone: &str) -> Self {
        Self {
            query: query.to_string(),
            timezone: timezone.to_string(),
            stages: Stage::ALL
                .iter()
                .map(|&stage| StageReport {
                    stage,
                    status: StageStatus::Pending,
                    detail: None,
                })
                .collect(),
            window: None,
            task: None,
            commit: None,
            error: None,
            exit_code: 0,
        }
    }

    fn mark(&mut self, stage: Stage, status: StageStatus, detail: Option<String>) {
        if let Some(report) = self.stages.iter_mut().find(|r| r.stage == stage) {
            report.status = status;
            report.detail = detail;
        }
    }

    fn fail(&mut self, stage: Stage, error: &CoreError) {
        self.mark(stage, StageStatus::Error, Some(error.to_string()));
        self.error = Some(TraceError {
            stage,
            code: error.code_string(),
            message: error.to_string(),
        });
        self.exit_code = error.exit_code();
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// The wired pipeline.
pub struct Pipeline<L, B> {
    pub llm: L,
    pub backend: B,
    pub db: TaskDb,
    pub config: TempoConfig,
}

impl<L: LlmClient, B: CalendarBackend> Pipeline<L, B> {
    pub fn new(llm: L, backend: B, db: TaskDb, config: TempoConfig) -> Self {
        Self {
            llm,
            backend,
            db,
            config,
        }
    }

    fn schedule_options(&self) -> ScheduleOptions {
        ScheduleOptions {
            work_start_hour: self.config.work_start_hour,
            work_end_hour: self.config.work_end_hour,
        }
    }

    /// Run a query against the current clock.
    pub async fn run(&self, text: &str) -> Trace {
        match self.config.tz() {
            Ok(tz) => self.run_at(text, Utc::now().with_timezone(&tz)).await,
            Err(e) => {
                let mut trace = Trace::new(text, &self.config.timezone);
                trace.fail(Stage::Extract, &e);
                trace
            }
        }
    }

    /// Run a query as of a specific instant. The injected clock keeps
    /// every stage consistent and makes full runs reproducible in tests.
    pub async fn run_at(&self, text: &str, now: DateTime<Tz>) -> Trace {
        let tz = now.timezone();
        let mut trace = Trace::new(text, tz.name());
        if let Err((stage, error)) = self.execute(text, tz, now, &mut trace).await {
            trace.fail(stage, &error);
        }
        trace
    }

    async fn execute(
        &self,
        text: &str,
        tz: Tz,
        now: DateTime<Tz>,
        trace: &mut Trace,
    ) -> std::result::Result<(), (Stage, CoreError)> {
        let query = Query::new(text, tz).map_err(|e| (Stage::Extract, e))?;

        // SE: verbatim temporal phrases
        let raw = extract::extract_slots(&self.llm, &query)
            .await
            .map_err(|e| (Stage::Extract, e))?;
        trace.mark(
            Stage::Extract,
            StageStatus::Ok,
            Some(format!(
                "start={:?} end={:?} duration={:?}",
                raw.start_text, raw.end_text, raw.duration
            )),
        );

        // AR: absolute canonical times
        let ctx = TemporalContext::compute(tz, now);
        let absolute = resolve::resolve_absolute(&self.llm, &raw, &ctx)
            .await
            .map_err(|e| (Stage::Resolve, e))?;
        trace.mark(
            Stage::Resolve,
            StageStatus::Ok,
            Some(format!("{} -> {}", absolute.start_text, absolute.end_text)),
        );

        // TS: zone-aware ISO window
        let window =
            standardize::standardize(&absolute, tz, now).map_err(|e| (Stage::Standardize, e))?;
        trace.window = Some(window.clone());
        trace.mark(
            Stage::Standardize,
            StageStatus::Ok,
            Some(format!(
                "{} -> {} ({})",
                window.start.to_rfc3339(),
                window.end.to_rfc3339(),
                window
                    .duration
                    .map_or("no duration".to_string(), |d| d.to_string())
            )),
        );

        // TD: difficulty + calendar
        let classified = classify::classify(&self.llm, &self.backend, &query, window.duration)
            .await
            .map_err(|e| (Stage::Classify, e))?;
        trace.mark(
            Stage::Classify,
            StageStatus::Ok,
            Some(format!(
                "{} \"{}\" on {}",
                classified.kind, classified.title, classified.calendar_id
            )),
        );

        // LD: subtasks, for complex tasks only
        let decomposed = match classified.kind {
            TaskKind::Simple => {
                trace.mark(Stage::Decompose, StageStatus::Skipped, None);
                None
            }
            TaskKind::Complex => {
                let d = decompose::decompose(&self.llm, &classified)
                    .await
                    .map_err(|e| (Stage::Decompose, e))?;
                trace.mark(
                    Stage::Decompose,
                    StageStatus::Ok,
                    Some(format!("{} subtasks", d.subtasks.len())),
                );
                Some(d)
            }
        };

        // The backend must be reachable and authorized before any
        // scheduling decision is made against its data.
        let status = self
            .backend
            .status()
            .await
            .map_err(|e| (Stage::Allot, e))?;
        if !status.authorized {
            return Err((
                Stage::Allot,
                CoreError::BackendUnavailable {
                    detail: "calendar access not authorized".to_string(),
                },
            ));
        }

        // TA: concrete slots
        let allotter = Allotter::new(
            &self.backend,
            self.schedule_options(),
            self.config.holiday_calendar.clone(),
        );
        let scheduled = match &decomposed {
            Some(d) => allotter
                .allot_complex(d, &window, tz, now)
                .await
                .map_err(|e| (Stage::Allot, e))?,
            None => allotter
                .allot_simple(&classified, &window, tz, now)
                .await
                .map_err(|e| (Stage::Allot, e))?,
        };
        trace.task = Some(scheduled.clone());
        trace.mark(
            Stage::Allot,
            StageStatus::Ok,
            Some(format!("{} event(s) placed", scheduled.event_count())),
        );

        // EC: side effects
        let creator = EventCreator::new(&self.backend, &self.db);
        let report = creator
            .commit(&scheduled)
            .await
            .map_err(|e| (Stage::Commit, e))?;

        if let Some(partial) = report.partial_error() {
            // Partial success: surfaced in the trace, but the created
            // events stand and the run exits cleanly.
            trace.mark(Stage::Commit, StageStatus::Error, Some(partial.to_string()));
            trace.error = Some(TraceError {
                stage: Stage::Commit,
                code: partial.code_string(),
                message: partial.to_string(),
            });
        } else {
            trace.mark(
                Stage::Commit,
                StageStatus::Ok,
                Some(format!("{} event(s) created", report.created.len())),
            );
        }
        trace.commit = Some(report);

        Ok(())
    }
}
