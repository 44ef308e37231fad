//! Progress observation.
//!
//! The core never renders anything; it emits events through this interface
//! and the embedding application decides how to present them.

use serde::Serialize;

/// A notable moment in a migration run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted {
        source: String,
        destination: String,
    },
    SchemaStarted {
        schema: String,
    },
    TableStarted {
        schema: String,
        table: String,
    },
    TableMigrated {
        schema: String,
        table: String,
        rows: u64,
    },
    TableFailed {
        schema: String,
        table: String,
        reason: String,
    },
    RunFinished {
        tables_migrated: usize,
        tables_failed: usize,
    },
}

/// Observer callback for migration progress.
pub trait Progress: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Discards all events. The default observer.
pub struct NullProgress;

impl Progress for NullProgress {
    fn on_event(&self, _event: &ProgressEvent) {}
}
