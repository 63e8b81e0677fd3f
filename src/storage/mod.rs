//! Schema, migrator, and the `Store` — the engine's single source of truth.

mod models;
mod schema;
mod sqlite;
mod store;

pub use models::{
    ExportData, ImportStats, NewObservation, NewPrompt, Observation, Prompt, SearchFilter,
    Session, Stats, TimelineResult,
};
pub use store::Store;
