//! Tempo core: natural-language utterances to concrete calendar bookings.
//!
//! Two subsystems do the real work:
//!
//! 1. A deterministic **time-understanding pipeline** that lifts a
//!    free-form string through extraction, absolute resolution, ISO
//!    standardization, classification, and optional decomposition into a
//!    typed scheduling request.
//! 2. An **ordered even-spread scheduler** that places each task into a
//!    concrete slot subject to hard constraints (work window, ordering,
//!    per-day caps, minimum gaps, deadline) and an anti-bunching
//!    objective, then materializes the result as calendar events with
//!    stable ids embedded in event notes.
//!
//! The language model and the calendar backend sit behind the
//! [`model::LlmClient`] and [`calbridge::CalendarBackend`] traits; the
//! scheduler itself is a pure function and never touches I/O.

pub mod allot;
pub mod calbridge;
pub mod classify;
pub mod config;
pub mod context;
pub mod creator;
pub mod decompose;
pub mod duration;
pub mod error;
pub mod extract;
pub mod model;
pub mod pipeline;
pub mod resolve;
pub mod scheduler;
pub mod standardize;
pub mod task;
pub mod test_helpers;

pub use tempo_db;

pub use config::TempoConfig;
pub use duration::TaskDuration;
pub use error::{CoreError, Result};
pub use pipeline::{Pipeline, Stage, StageStatus, Trace};
pub use task::{Query, ScheduledTask, TaskKind};
