//! Database models.
//!
//! These structs map directly to database tables via sqlx.

mod task;

pub use task::{EventMapping, TaskRow, TaskWithEvent};
