//! Tempo Database Layer
//!
//! SQLite-based storage for scheduled tasks and their calendar events.
//!
//! # Architecture
//!
//! - **Two tables** - `tasks` (id, title, parent link) and `event_map`
//!   (task → backend event)
//! - **Parent rows carry no event** - complex tasks exist only as metadata;
//!   their subtasks own the calendar events
//! - **Single-writer SQLite** - serializes concurrent pipeline commits
//!
//! # Usage
//!
//! ```rust,ignore
//! use tempo_db::TaskDb;
//!
//! let db = TaskDb::open("path/to/tempo.db").await?;
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod queries;

pub use connection::{DbStats, TaskDb};
pub use error::{DbError, DbResult};

// Re-export key model types for convenience
pub use models::{EventMapping, TaskRow, TaskWithEvent};
