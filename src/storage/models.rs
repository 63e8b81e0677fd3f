//! Data types shared across the store, sync engine, and transport facades.

use serde::{Deserialize, Serialize};

/// A coding session: a caller-supplied opaque id bounding a stream of
/// observations and user prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Caller-supplied opaque identifier. Never generated by the engine.
    pub id: String,
    /// Project name the session belongs to.
    pub project: String,
    /// Working directory the session ran in.
    pub directory: String,
    /// RFC 3339 timestamp the session started.
    pub start_time: String,
    /// RFC 3339 timestamp the session ended, if `end_session` was called.
    pub end_time: Option<String>,
    /// Caller-supplied summary recorded at `end_session`.
    pub summary: Option<String>,
    /// Number of observations recorded in this session.
    #[serde(default)]
    pub observation_count: i64,
}

/// An immutable fact recorded during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Monotonically increasing id; authoritative chronological order.
    pub id: i64,
    /// The session this observation belongs to.
    pub session_id: String,
    /// Caller-defined type tag (e.g. `"decision"`, `"bugfix"`).
    pub r#type: String,
    /// Short title.
    pub title: String,
    /// Body content, truncated to the configured maximum length.
    pub content: String,
    /// Name of the tool that produced this observation, if any.
    pub tool_name: Option<String>,
    /// Project name, if different from the session's.
    pub project: Option<String>,
    /// RFC 3339 creation timestamp. Descriptive only — never used for
    /// ordering; `id` is the ordering contract.
    pub created_at: String,
}

/// A user-authored prompt captured verbatim (after redaction/truncation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Monotonically increasing id.
    pub id: i64,
    /// The session this prompt belongs to.
    pub session_id: String,
    /// Prompt content, truncated to the configured maximum length.
    pub content: String,
    /// Project name, if supplied.
    pub project: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Parameters for [`crate::storage::Store::add_observation`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewObservation {
    /// The session this observation belongs to.
    pub session_id: String,
    /// Caller-defined type tag.
    pub r#type: String,
    /// Short title.
    pub title: String,
    /// Body content, subject to redaction and truncation.
    pub content: String,
    /// Name of the tool that produced this observation.
    pub tool_name: Option<String>,
    /// Project name, if different from the session's.
    pub project: Option<String>,
}

/// Parameters for [`crate::storage::Store::add_prompt`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewPrompt {
    /// The session this prompt belongs to.
    pub session_id: String,
    /// Prompt content, subject to redaction and truncation.
    pub content: String,
    /// Project name, if supplied.
    pub project: Option<String>,
}

/// Filters for [`crate::storage::Store::search`] and `search_prompts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilter {
    /// Restrict to observations of this type (ignored for prompt search).
    pub r#type: Option<String>,
    /// Restrict to this project.
    pub project: Option<String>,
    /// Maximum rows to return; capped at `max_search_results`.
    pub limit: Option<usize>,
}

/// Result of [`crate::storage::Store::timeline`].
#[derive(Debug, Clone, Serialize)]
pub struct TimelineResult {
    /// The observation the timeline is centered on.
    pub pivot: Observation,
    /// The pivot's session, if it still exists. Absence is benign — it
    /// supports manually saved observations with no matching session row.
    pub session: Option<Session>,
    /// Observations immediately before the pivot, oldest first.
    pub before: Vec<Observation>,
    /// Observations immediately after the pivot, oldest first.
    pub after: Vec<Observation>,
    /// Total number of observations recorded in the pivot's session.
    pub total_in_session: i64,
}

/// Result of [`crate::storage::Store::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    /// Total number of sessions.
    pub session_count: i64,
    /// Total number of observations.
    pub observation_count: i64,
    /// Total number of user prompts.
    pub prompt_count: i64,
    /// Sorted, distinct, non-null project names seen across all three streams.
    pub projects: Vec<String>,
}

/// A structural snapshot of the entire store, used for export/import and
/// for sync chunk payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    /// Format version tag.
    pub version: String,
    /// RFC 3339 timestamp the export was produced.
    pub exported_at: String,
    /// All sessions, in ascending id order (sessions have no numeric id, so
    /// this is insertion order as read from the table).
    pub sessions: Vec<Session>,
    /// All observations, in ascending id order.
    pub observations: Vec<Observation>,
    /// All user prompts, in ascending id order.
    pub prompts: Vec<Prompt>,
}

/// Result of [`crate::storage::Store::import`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportStats {
    /// Number of sessions inserted (id collisions are skipped).
    pub sessions_imported: usize,
    /// Number of sessions skipped due to an id collision.
    pub sessions_skipped: usize,
    /// Number of observations inserted (always fresh ids).
    pub observations_imported: usize,
    /// Number of user prompts inserted (always fresh ids).
    pub prompts_imported: usize,
}
