//! Database query functions.
//!
//! Organized by domain:
//! - `task`: task rows and event mappings

mod task;

pub use task::*;
