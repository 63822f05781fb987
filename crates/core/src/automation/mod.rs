//! Automation state attached to tickets.
//!
//! A run moves through `pending -> in-progress -> completed | failed`, with
//! `paused` as a detour from `in-progress`. Each run records timed steps and
//! log lines. The records live in a local store keyed by ticket number.

mod machine;
mod sqlite_store;
mod store;
mod types;

pub use machine::{AutomationError, AutomationService};
pub use sqlite_store::SqliteAutomationStore;
pub use store::{AutomationStore, AutomationStoreError};
pub use types::*;
