use miette::Diagnostic;
use thiserror::Error;

use crate::pipeline::Stage;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Diagnostic, Debug)]
pub enum CoreError {
    #[error("Query is empty")]
    #[diagnostic(code(tempo_core::empty_query))]
    EmptyQuery,

    #[error("Unknown IANA timezone: {0}")]
    #[diagnostic(
        code(tempo_core::invalid_timezone),
        help("Use an IANA zone name such as America/New_York")
    )]
    InvalidTimezone(String),

    #[error("{stage} stage returned unusable output: {detail}")]
    #[diagnostic(
        code(tempo_core::parse_llm),
        help("The language model produced non-JSON or schema-violating output twice in a row")
    )]
    ParseLlm { stage: Stage, detail: String },

    #[error("Language model request failed: {0}")]
    #[diagnostic(
        code(tempo_core::llm_unavailable),
        help("Check OLLAMA_BASE and that the model server is running")
    )]
    LlmUnavailable(String),

    #[error("Could not parse absolute time: {text:?}")]
    #[diagnostic(
        code(tempo_core::ts_parse),
        help("Expected the canonical form \"Month DD, YYYY HH:MM am|pm\"")
    )]
    TsParse { text: String },

    #[error("Standardized window is inconsistent: {detail}")]
    #[diagnostic(code(tempo_core::ts_invariant))]
    TsInvariant { detail: String },

    #[error("No writable calendar matches the requested category")]
    #[diagnostic(
        code(tempo_core::td_no_calendar),
        help("The backend must expose a writable calendar titled \"Work\" or \"Home\"")
    )]
    TdNoCalendar,

    #[error("Decomposition still invalid after retry: {reason}")]
    #[diagnostic(code(tempo_core::ld_invalid))]
    LdInvalid { reason: String },

    #[error("Not enough free time before the deadline: need {need} min, have {have} min")]
    #[diagnostic(code(tempo_core::infeasible_total))]
    InfeasibleTotal { need: i64, have: i64 },

    #[error("Could not place task {task_index} ({duration} min) before the deadline")]
    #[diagnostic(code(tempo_core::infeasible_local))]
    InfeasibleLocal { task_index: usize, duration: i64 },

    #[error("No eligible working-day intervals before the deadline")]
    #[diagnostic(code(tempo_core::no_eligible_days))]
    NoEligibleDays,

    #[error("Scheduled slots failed validation: {detail}")]
    #[diagnostic(
        code(tempo_core::ta_validation),
        help("Indicates a scheduler defect or availability that went stale mid-run")
    )]
    TaValidation { detail: String },

    #[error("Calendar backend unreachable: {detail}")]
    #[diagnostic(
        code(tempo_core::backend_unavailable),
        help("Check CALBRIDGE_BASE and that the bridge process is running and authorized")
    )]
    BackendUnavailable { detail: String },

    #[error("Calendar backend rejected the request: HTTP {status}: {body}")]
    #[diagnostic(code(tempo_core::backend_rejected))]
    BackendRejected { status: u16, body: String },

    #[error("Created {created} of {total} events; the rest failed")]
    #[diagnostic(code(tempo_core::ec_partial))]
    EcPartial { created: usize, total: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Db(#[from] tempo_db::DbError),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(tempo_core::config))]
    Config(String),
}

impl CoreError {
    /// Process exit code for this error when it terminates a query.
    ///
    /// 2 = infeasible schedule, 3 = external service unavailable,
    /// 1 = everything else. Partial event creation is not fatal and maps
    /// to 0 at the call site.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InfeasibleTotal { .. } | Self::InfeasibleLocal { .. } | Self::NoEligibleDays => 2,
            Self::BackendUnavailable { .. } | Self::LlmUnavailable(_) => 3,
            Self::EcPartial { .. } => 0,
            _ => 1,
        }
    }

    /// Stable machine-readable code, mirroring the diagnostic code.
    pub fn code_string(&self) -> String {
        self.code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "tempo_core::unknown".to_string())
    }
}
