//! The store: the single source of truth behind every operation the
//! transport facades expose.
//!
//! A single `Mutex<Connection>` backs the whole store. `SQLite`'s WAL mode
//! plus a 5s busy timeout (set in [`crate::storage::sqlite::configure_connection`])
//! let readers proceed without blocking on writers; the mutex only serializes
//! access from this process, which is all a single-user embedded engine
//! needs.

use std::path::Path;
use std::time::Instant;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::instrument;

use crate::config::EngramConfig;
use crate::security;
use crate::{Error, Result};

use super::models::{
    ExportData, ImportStats, NewObservation, NewPrompt, Observation, Prompt, SearchFilter,
    Session, Stats, TimelineResult,
};
use super::schema;
use super::sqlite::{acquire_lock, configure_connection, record_operation_metrics};

/// The engine's persistent store: sessions, observations, prompts, full-text
/// search, timelines, and the markdown context digest, all backed by one
/// `SQLite` file.
pub struct Store {
    conn: std::sync::Mutex<Connection>,
    max_observation_length: usize,
    max_context_results: usize,
    max_search_results: usize,
}

impl Store {
    /// Opens (creating if necessary) the database at `path` using the
    /// built-in default limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the database cannot be opened or
    /// configured, or [`Error::Io`] if the parent directory cannot be
    /// created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_limits(
            path,
            crate::config::DEFAULT_MAX_OBSERVATION_LENGTH,
            crate::config::DEFAULT_MAX_CONTEXT_RESULTS,
            crate::config::DEFAULT_MAX_SEARCH_RESULTS,
        )
    }

    /// Opens the database described by `config`, creating the data
    /// directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] or [`Error::Io`] as in [`Store::open`].
    pub fn open_with_config(config: &EngramConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Self::open_with_limits(
            config.db_path(),
            config.max_observation_length,
            config.max_context_results,
            config.max_search_results,
        )
    }

    /// Opens an in-memory database. Used by tests and by callers (such as
    /// the sync engine's own tests) that need a throwaway store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the schema cannot be applied.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        schema::apply(&conn)?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
            max_observation_length: crate::config::DEFAULT_MAX_OBSERVATION_LENGTH,
            max_context_results: crate::config::DEFAULT_MAX_CONTEXT_RESULTS,
            max_search_results: crate::config::DEFAULT_MAX_SEARCH_RESULTS,
        })
    }

    fn open_with_limits(
        path: impl AsRef<Path>,
        max_observation_length: usize,
        max_context_results: usize,
        max_search_results: usize,
    ) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        schema::apply(&conn)?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
            max_observation_length,
            max_context_results,
            max_search_results,
        })
    }

    // ---- write path ----------------------------------------------------

    /// Creates a session, ignoring the call if `id` already exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `project` or `directory` is empty,
    /// or [`Error::Storage`] if the insert fails.
    #[instrument(skip(self), fields(operation = "create_session"))]
    pub fn create_session(&self, id: &str, project: &str, directory: &str) -> Result<()> {
        if project.is_empty() {
            return Err(Error::InvalidInput("project must not be empty".to_string()));
        }
        if directory.is_empty() {
            return Err(Error::InvalidInput("directory must not be empty".to_string()));
        }

        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let result = conn.execute(
            "INSERT OR IGNORE INTO sessions (id, project, directory, start_time) VALUES (?1, ?2, ?3, ?4)",
            params![id, project, directory, crate::now_rfc3339()],
        );
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("create_session", start, status);
        result?;
        Ok(())
    }

    /// Records (or overwrites) the end timestamp and summary for a session.
    /// Not one-shot: calling this again on an already-ended session
    /// overwrites the previous end time and summary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `id` has no matching session, or
    /// [`Error::Storage`] if the update fails.
    #[instrument(skip(self, summary), fields(operation = "end_session"))]
    pub fn end_session(&self, id: &str, summary: &str) -> Result<()> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let summary = if summary.is_empty() {
            None
        } else {
            Some(security::strip(summary))
        };
        let rows = conn.execute(
            "UPDATE sessions SET end_time = ?1, summary = ?2 WHERE id = ?3",
            params![crate::now_rfc3339(), summary, id],
        );
        let status = if rows.is_ok() { "success" } else { "error" };
        record_operation_metrics("end_session", start, status);
        if rows? == 0 {
            return Err(Error::NotFound {
                kind: "session",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Redacts and truncates the title/content, then inserts a new
    /// observation, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the insert fails.
    #[instrument(skip(self, new), fields(operation = "add_observation"))]
    pub fn add_observation(&self, new: NewObservation) -> Result<i64> {
        let start = Instant::now();
        let title = security::strip(&new.title);
        let content = self.truncate_stored(&security::strip(&new.content));
        let tool_name = new.tool_name.filter(|s| !s.is_empty());
        let project = new.project.filter(|s| !s.is_empty());

        let conn = acquire_lock(&self.conn);
        let result = conn.execute(
            "INSERT INTO observations (session_id, type, title, content, tool_name, project, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![new.session_id, new.r#type, title, content, tool_name, project, crate::now_rfc3339()],
        );
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("add_observation", start, status);
        result?;
        Ok(conn.last_insert_rowid())
    }

    /// Redacts and truncates the content, then inserts a new user prompt,
    /// returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the insert fails.
    #[instrument(skip(self, new), fields(operation = "add_prompt"))]
    pub fn add_prompt(&self, new: NewPrompt) -> Result<i64> {
        let start = Instant::now();
        let content = self.truncate_stored(&security::strip(&new.content));
        let project = new.project.filter(|s| !s.is_empty());

        let conn = acquire_lock(&self.conn);
        let result = conn.execute(
            "INSERT INTO user_prompts (session_id, content, project, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![new.session_id, content, project, crate::now_rfc3339()],
        );
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("add_prompt", start, status);
        result?;
        Ok(conn.last_insert_rowid())
    }

    /// Truncates content to `max_observation_length` *characters*, appending
    /// `"... [truncated]"` only when truncation actually occurred. Content
    /// exactly at the limit is stored verbatim with no marker.
    fn truncate_stored(&self, content: &str) -> String {
        truncate_with_marker(content, self.max_observation_length)
    }

    // ---- read path -------------------------------------------------------

    /// Returns sessions ordered by start time descending, optionally scoped
    /// to `project`, each annotated with its observation count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    #[instrument(skip(self), fields(operation = "recent_sessions"))]
    pub fn recent_sessions(&self, project: Option<&str>, limit: usize) -> Result<Vec<Session>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT s.id, s.project, s.directory, s.start_time, s.end_time, s.summary,
                    (SELECT COUNT(*) FROM observations o WHERE o.session_id = s.id) AS obs_count
             FROM sessions s
             WHERE (?1 IS NULL OR s.project = ?1)
             ORDER BY s.start_time DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![project, cap(limit, usize::MAX)], row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Returns the most recently created observations, optionally scoped to
    /// `project`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    #[instrument(skip(self), fields(operation = "recent_observations"))]
    pub fn recent_observations(&self, project: Option<&str>, limit: usize) -> Result<Vec<Observation>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id, session_id, type, title, content, tool_name, project, created_at
             FROM observations
             WHERE (?1 IS NULL OR project = ?1)
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![project, cap(limit, usize::MAX)], row_to_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Returns the most recently created user prompts, optionally scoped to
    /// `project`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    #[instrument(skip(self), fields(operation = "recent_prompts"))]
    pub fn recent_prompts(&self, project: Option<&str>, limit: usize) -> Result<Vec<Prompt>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id, session_id, content, project, created_at
             FROM user_prompts
             WHERE (?1 IS NULL OR project = ?1)
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![project, cap(limit, usize::MAX)], row_to_prompt)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Fetches one observation by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no observation has this id.
    #[instrument(skip(self), fields(operation = "get_observation"))]
    pub fn get_observation(&self, id: i64) -> Result<Observation> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT id, session_id, type, title, content, tool_name, project, created_at
             FROM observations WHERE id = ?1",
            params![id],
            row_to_observation,
        )
        .optional()?
        .ok_or(Error::NotFound {
            kind: "observation",
            id: id.to_string(),
        })
    }

    /// Fetches one session by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no session has this id.
    #[instrument(skip(self), fields(operation = "get_session"))]
    pub fn get_session(&self, id: &str) -> Result<Session> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT s.id, s.project, s.directory, s.start_time, s.end_time, s.summary,
                    (SELECT COUNT(*) FROM observations o WHERE o.session_id = s.id) AS obs_count
             FROM sessions s WHERE s.id = ?1",
            params![id],
            row_to_session,
        )
        .optional()?
        .ok_or_else(|| Error::NotFound {
            kind: "session",
            id: id.to_string(),
        })
    }

    /// Returns a session's observations in ascending (chronological) id
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    #[instrument(skip(self), fields(operation = "session_observations"))]
    pub fn session_observations(&self, session_id: &str, limit: usize) -> Result<Vec<Observation>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id, session_id, type, title, content, tool_name, project, created_at
             FROM observations
             WHERE session_id = ?1
             ORDER BY id ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![session_id, cap(limit, usize::MAX)], row_to_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ---- search ------------------------------------------------------

    /// Full-text searches observations. An empty (post-sanitize) query
    /// returns no results rather than erroring against FTS5.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    #[instrument(skip(self, query), fields(operation = "search"))]
    pub fn search(&self, query: &str, filter: &SearchFilter) -> Result<Vec<Observation>> {
        let expr = crate::search::sanitize(query);
        if expr.is_empty() {
            return Ok(Vec::new());
        }
        let limit = cap(filter.limit.unwrap_or(self.max_search_results), self.max_search_results);

        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT o.id, o.session_id, o.type, o.title, o.content, o.tool_name, o.project, o.created_at
             FROM observations_fts
             JOIN observations o ON o.id = observations_fts.rowid
             WHERE observations_fts MATCH ?1
               AND (?2 IS NULL OR o.type = ?2)
               AND (?3 IS NULL OR o.project = ?3)
             ORDER BY observations_fts.rank
             LIMIT ?4",
        )?;
        let rows = stmt
            .query_map(
                params![expr, filter.r#type, filter.project, limit],
                row_to_observation,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Full-text searches user prompts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    #[instrument(skip(self, query), fields(operation = "search_prompts"))]
    pub fn search_prompts(&self, query: &str, filter: &SearchFilter) -> Result<Vec<Prompt>> {
        let expr = crate::search::sanitize(query);
        if expr.is_empty() {
            return Ok(Vec::new());
        }
        let limit = cap(filter.limit.unwrap_or(self.max_search_results), self.max_search_results);

        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT p.id, p.session_id, p.content, p.project, p.created_at
             FROM user_prompts_fts
             JOIN user_prompts p ON p.id = user_prompts_fts.rowid
             WHERE user_prompts_fts MATCH ?1
               AND (?2 IS NULL OR p.project = ?2)
             ORDER BY user_prompts_fts.rank
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![expr, filter.project, limit], row_to_prompt)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ---- timeline / stats / context -----------------------------------

    /// Returns the observations immediately surrounding `pivot_id` within
    /// its own session. `before`/`after` of `0` mean "use the default of 5".
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `pivot_id` does not exist.
    #[instrument(skip(self), fields(operation = "timeline"))]
    pub fn timeline(&self, pivot_id: i64, before: usize, after: usize) -> Result<TimelineResult> {
        let before = if before == 0 { 5 } else { before };
        let after = if after == 0 { 5 } else { after };

        let pivot = self.get_observation(pivot_id)?;
        let session = self.get_session(&pivot.session_id).ok();

        let conn = acquire_lock(&self.conn);

        let mut before_stmt = conn.prepare(
            "SELECT id, session_id, type, title, content, tool_name, project, created_at
             FROM observations WHERE session_id = ?1 AND id < ?2 ORDER BY id DESC LIMIT ?3",
        )?;
        let mut before_rows = before_stmt
            .query_map(params![pivot.session_id, pivot_id, before as i64], row_to_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        before_rows.reverse();

        let mut after_stmt = conn.prepare(
            "SELECT id, session_id, type, title, content, tool_name, project, created_at
             FROM observations WHERE session_id = ?1 AND id > ?2 ORDER BY id ASC LIMIT ?3",
        )?;
        let after_rows = after_stmt
            .query_map(params![pivot.session_id, pivot_id, after as i64], row_to_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let total_in_session: i64 = conn.query_row(
            "SELECT COUNT(*) FROM observations WHERE session_id = ?1",
            params![pivot.session_id],
            |row| row.get(0),
        )?;

        Ok(TimelineResult {
            pivot,
            session,
            before: before_rows,
            after: after_rows,
            total_in_session,
        })
    }

    /// Returns aggregate counts and the sorted list of distinct project
    /// names seen across sessions, observations, and prompts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a query fails.
    #[instrument(skip(self), fields(operation = "stats"))]
    pub fn stats(&self) -> Result<Stats> {
        let conn = acquire_lock(&self.conn);
        let session_count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        let observation_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
        let prompt_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM user_prompts", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT project FROM sessions
             UNION SELECT project FROM observations WHERE project IS NOT NULL
             UNION SELECT project FROM user_prompts WHERE project IS NOT NULL
             ORDER BY project",
        )?;
        let projects = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Stats {
            session_count,
            observation_count,
            prompt_count,
            projects,
        })
    }

    /// Builds the markdown context digest: up to 5 recent sessions, 10
    /// recent prompts, and `max_context_results` recent observations.
    /// Returns an empty string if all three sections would be empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a query fails.
    #[instrument(skip(self), fields(operation = "format_context"))]
    pub fn format_context(&self, project: Option<&str>) -> Result<String> {
        let mut sections = Vec::new();

        let sessions = self.recent_sessions(project, 5)?;
        if !sessions.is_empty() {
            let mut section = String::from("## Recent Sessions\n");
            for session in &sessions {
                section.push_str("- **");
                section.push_str(&session.project);
                section.push_str("** (");
                section.push_str(&session.start_time);
                section.push(')');
                if let Some(summary) = session.summary.as_ref().filter(|s| !s.is_empty()) {
                    section.push_str(": ");
                    section.push_str(&truncate_for_display(summary, 200));
                }
                section.push_str(&format!(" [{} observations]\n", session.observation_count));
            }
            sections.push(section.trim_end().to_string());
        }

        let prompts = self.recent_prompts(project, 10)?;
        if !prompts.is_empty() {
            let mut section = String::from("## Recent User Prompts\n");
            for prompt in &prompts {
                section.push_str("- ");
                section.push_str(&prompt.created_at);
                section.push_str(": ");
                section.push_str(&truncate_for_display(&prompt.content, 200));
                section.push('\n');
            }
            sections.push(section.trim_end().to_string());
        }

        let observations = self.recent_observations(project, self.max_context_results)?;
        if !observations.is_empty() {
            let mut section = String::from("## Recent Observations\n");
            for observation in &observations {
                section.push_str("- [");
                section.push_str(&observation.r#type);
                section.push_str("] **");
                section.push_str(&observation.title);
                section.push_str("**: ");
                section.push_str(&truncate_for_display(&observation.content, 300));
                section.push('\n');
            }
            sections.push(section.trim_end().to_string());
        }

        Ok(sections.join("\n\n"))
    }

    // ---- bulk export / import ------------------------------------------

    /// Dumps every row in the store as a structural snapshot, in ascending
    /// id order (sessions in table insertion order, since session ids are
    /// caller-supplied strings with no ordering contract of their own).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a query fails.
    #[instrument(skip(self), fields(operation = "export"))]
    pub fn export(&self) -> Result<ExportData> {
        let conn = acquire_lock(&self.conn);

        let mut session_stmt = conn.prepare(
            "SELECT s.id, s.project, s.directory, s.start_time, s.end_time, s.summary,
                    (SELECT COUNT(*) FROM observations o WHERE o.session_id = s.id) AS obs_count
             FROM sessions s ORDER BY s.rowid ASC",
        )?;
        let sessions = session_stmt
            .query_map([], row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut obs_stmt = conn.prepare(
            "SELECT id, session_id, type, title, content, tool_name, project, created_at
             FROM observations ORDER BY id ASC",
        )?;
        let observations = obs_stmt
            .query_map([], row_to_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut prompt_stmt = conn.prepare(
            "SELECT id, session_id, content, project, created_at FROM user_prompts ORDER BY id ASC",
        )?;
        let prompts = prompt_stmt
            .query_map([], row_to_prompt)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ExportData {
            version: "1".to_string(),
            exported_at: crate::now_rfc3339(),
            sessions,
            observations,
            prompts,
        })
    }

    /// Dumps the subset of the store matching `project` (or everything, when
    /// `project` is `None`), used by the sync engine to build export chunks.
    /// An observation or prompt with no project of its own inherits its
    /// session's project for the purpose of this filter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a query fails.
    #[instrument(skip(self), fields(operation = "export_filtered"))]
    pub fn export_filtered(&self, project: Option<&str>) -> Result<ExportData> {
        let conn = acquire_lock(&self.conn);

        let mut session_stmt = conn.prepare(
            "SELECT s.id, s.project, s.directory, s.start_time, s.end_time, s.summary,
                    (SELECT COUNT(*) FROM observations o WHERE o.session_id = s.id) AS obs_count
             FROM sessions s
             WHERE (?1 IS NULL OR s.project = ?1)
             ORDER BY s.rowid ASC",
        )?;
        let sessions = session_stmt
            .query_map(params![project], row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut obs_stmt = conn.prepare(
            "SELECT o.id, o.session_id, o.type, o.title, o.content, o.tool_name, o.project, o.created_at
             FROM observations o
             WHERE (?1 IS NULL OR COALESCE(o.project, (SELECT s.project FROM sessions s WHERE s.id = o.session_id)) = ?1)
             ORDER BY o.id ASC",
        )?;
        let observations = obs_stmt
            .query_map(params![project], row_to_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut prompt_stmt = conn.prepare(
            "SELECT p.id, p.session_id, p.content, p.project, p.created_at
             FROM user_prompts p
             WHERE (?1 IS NULL OR COALESCE(p.project, (SELECT s.project FROM sessions s WHERE s.id = p.session_id)) = ?1)
             ORDER BY p.id ASC",
        )?;
        let prompts = prompt_stmt
            .query_map(params![project], row_to_prompt)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ExportData {
            version: "1".to_string(),
            exported_at: crate::now_rfc3339(),
            sessions,
            observations,
            prompts,
        })
    }

    /// Reports whether a sync chunk id has already been recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    pub fn has_synced_chunk(&self, chunk_id: &str) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sync_chunks WHERE chunk_id = ?1)",
            params![chunk_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Records a sync chunk id as seen. Safe to call more than once for the
    /// same id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the insert fails.
    pub fn record_synced_chunk(&self, chunk_id: &str) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR IGNORE INTO sync_chunks (chunk_id, imported_at) VALUES (?1, ?2)",
            params![chunk_id, crate::now_rfc3339()],
        )?;
        Ok(())
    }

    /// Number of sync chunk ids recorded so far.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    pub fn synced_chunk_count(&self) -> Result<i64> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_chunks", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Imports a snapshot additively: sessions with a colliding id are
    /// skipped, observations and prompts are always inserted fresh with new
    /// ids. Runs inside a single transaction — commits wholly or rolls back
    /// wholly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if any insert fails, in which case nothing
    /// from this call is persisted.
    #[instrument(skip(self, data), fields(operation = "import"))]
    pub fn import(&self, data: &ExportData) -> Result<ImportStats> {
        let start = Instant::now();
        let mut conn = acquire_lock(&self.conn);
        let result = Self::import_tx(&mut conn, data);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("import", start, status);
        result
    }

    fn import_tx(conn: &mut Connection, data: &ExportData) -> Result<ImportStats> {
        let tx = conn.transaction()?;
        let mut stats = ImportStats::default();

        for session in &data.sessions {
            let changed = tx.execute(
                "INSERT OR IGNORE INTO sessions (id, project, directory, start_time, end_time, summary) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![session.id, session.project, session.directory, session.start_time, session.end_time, session.summary],
            )?;
            if changed == 1 {
                stats.sessions_imported += 1;
            } else {
                stats.sessions_skipped += 1;
            }
        }

        for observation in &data.observations {
            tx.execute(
                "INSERT INTO observations (session_id, type, title, content, tool_name, project, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![observation.session_id, observation.r#type, observation.title, observation.content, observation.tool_name, observation.project, observation.created_at],
            )?;
            stats.observations_imported += 1;
        }

        for prompt in &data.prompts {
            tx.execute(
                "INSERT INTO user_prompts (session_id, content, project, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![prompt.session_id, prompt.content, prompt.project, prompt.created_at],
            )?;
            stats.prompts_imported += 1;
        }

        tx.commit()?;
        Ok(stats)
    }
}

fn cap(requested: usize, hard_cap: usize) -> i64 {
    requested.min(hard_cap).min(i64::MAX as usize) as i64
}

fn truncate_with_marker(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(max_len).collect();
        format!("{truncated}... [truncated]")
    }
}

fn truncate_for_display(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(max_len).collect();
        format!("{truncated}...")
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        project: row.get(1)?,
        directory: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        summary: row.get(5)?,
        observation_count: row.get(6)?,
    })
}

fn row_to_observation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Observation> {
    Ok(Observation {
        id: row.get(0)?,
        session_id: row.get(1)?,
        r#type: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        tool_name: row.get(5)?,
        project: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn row_to_prompt(row: &rusqlite::Row<'_>) -> rusqlite::Result<Prompt> {
    Ok(Prompt {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        project: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_observation(session_id: &str) -> NewObservation {
        NewObservation {
            session_id: session_id.to_string(),
            r#type: "note".to_string(),
            title: "a title".to_string(),
            content: "some content".to_string(),
            tool_name: None,
            project: Some("engram".to_string()),
        }
    }

    #[test]
    fn test_create_session_idempotent() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        store.create_session("s1", "other-project", "/other").unwrap();

        let session = store.get_session("s1").unwrap();
        // The second call was a no-op: original project/directory survive.
        assert_eq!(session.project, "engram");
        assert_eq!(session.directory, "/tmp");
    }

    #[test]
    fn test_end_session_overwrites_on_repeat_calls() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        store.end_session("s1", "first summary").unwrap();
        store.end_session("s1", "second summary").unwrap();

        let session = store.get_session("s1").unwrap();
        assert_eq!(session.summary.as_deref(), Some("second summary"));
    }

    #[test]
    fn test_end_session_empty_summary_is_null() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        store.end_session("s1", "").unwrap();
        assert_eq!(store.get_session("s1").unwrap().summary, None);
    }

    #[test]
    fn test_end_session_missing_session_not_found() {
        let store = Store::in_memory().unwrap();
        let err = store.end_session("ghost", "x").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "session", .. }));
    }

    #[test]
    fn test_add_observation_redacts_private_spans() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        let id = store
            .add_observation(NewObservation {
                content: "key=<private>sk-abc123</private> rest".to_string(),
                ..new_observation("s1")
            })
            .unwrap();
        let observation = store.get_observation(id).unwrap();
        assert!(!observation.content.contains("sk-abc123"));
        assert!(observation.content.contains("[REDACTED]"));
    }

    #[test]
    fn test_add_observation_truncates_content() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        let long_content = "x".repeat(crate::config::DEFAULT_MAX_OBSERVATION_LENGTH + 10);
        let id = store
            .add_observation(NewObservation {
                content: long_content,
                ..new_observation("s1")
            })
            .unwrap();
        let observation = store.get_observation(id).unwrap();
        assert!(observation.content.ends_with("... [truncated]"));
    }

    #[test]
    fn test_add_observation_exact_max_length_has_no_marker() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        let exact = "x".repeat(crate::config::DEFAULT_MAX_OBSERVATION_LENGTH);
        let id = store
            .add_observation(NewObservation {
                content: exact.clone(),
                ..new_observation("s1")
            })
            .unwrap();
        let observation = store.get_observation(id).unwrap();
        assert_eq!(observation.content, exact);
        assert!(!observation.content.contains("truncated"));
    }

    #[test]
    fn test_add_observation_empty_optional_fields_become_null() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        let id = store
            .add_observation(NewObservation {
                tool_name: Some(String::new()),
                project: Some(String::new()),
                ..new_observation("s1")
            })
            .unwrap();
        let observation = store.get_observation(id).unwrap();
        assert_eq!(observation.tool_name, None);
        assert_eq!(observation.project, None);
    }

    #[test]
    fn test_get_observation_not_found() {
        let store = Store::in_memory().unwrap();
        let err = store.get_observation(999).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "observation", .. }));
    }

    #[test]
    fn test_session_observations_ascending_by_id() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        for i in 0..5 {
            store
                .add_observation(NewObservation {
                    title: format!("obs {i}"),
                    ..new_observation("s1")
                })
                .unwrap();
        }
        let observations = store.session_observations("s1", 10).unwrap();
        assert_eq!(observations.len(), 5);
        let ids: Vec<_> = observations.iter().map(|o| o.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_search_matches_all_tokens_case_insensitively() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        store
            .add_observation(NewObservation {
                title: "fix: auth!".to_string(),
                content: "Fixed the AUTH flow bug today".to_string(),
                ..new_observation("s1")
            })
            .unwrap();
        let results = store.search("auth bug", &SearchFilter::default()).unwrap();
        assert_eq!(results.len(), 1);

        let no_match = store.search("auth nonexistentword", &SearchFilter::default()).unwrap();
        assert!(no_match.is_empty());
    }

    #[test]
    fn test_search_empty_query_returns_empty() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        store.add_observation(new_observation("s1")).unwrap();
        let results = store.search("", &SearchFilter::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_respects_hard_cap() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        for _ in 0..30 {
            store
                .add_observation(NewObservation {
                    content: "shared keyword here".to_string(),
                    ..new_observation("s1")
                })
                .unwrap();
        }
        let results = store
            .search(
                "shared",
                &SearchFilter {
                    limit: Some(1000),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(results.len(), crate::config::DEFAULT_MAX_SEARCH_RESULTS);
    }

    #[test]
    fn test_timeline_defaults_to_five_and_five() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        let mut ids = Vec::new();
        for i in 0..11 {
            ids.push(
                store
                    .add_observation(NewObservation {
                        title: format!("obs {i}"),
                        ..new_observation("s1")
                    })
                    .unwrap(),
            );
        }
        let pivot = ids[5];
        let timeline = store.timeline(pivot, 0, 0).unwrap();
        assert_eq!(timeline.before.len(), 5);
        assert_eq!(timeline.after.len(), 5);
        assert_eq!(timeline.total_in_session, 11);
        assert_eq!(timeline.pivot.id, pivot);
    }

    #[test]
    fn test_timeline_missing_session_is_benign() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        let id = store.add_observation(new_observation("s1")).unwrap();
        // Delete the session row directly; the observation survives (no FK
        // cascade is defined), exercising the "manual save" scenario.
        {
            let conn = acquire_lock(&store.conn);
            conn.execute("DELETE FROM sessions WHERE id = 's1'", []).unwrap();
        }
        let timeline = store.timeline(id, 0, 0).unwrap();
        assert!(timeline.session.is_none());
    }

    #[test]
    fn test_timeline_not_found() {
        let store = Store::in_memory().unwrap();
        let err = store.timeline(999, 0, 0).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "observation", .. }));
    }

    #[test]
    fn test_format_context_empty_when_no_data() {
        let store = Store::in_memory().unwrap();
        assert_eq!(store.format_context(None).unwrap(), "");
    }

    #[test]
    fn test_format_context_contains_expected_sections() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        store.end_session("s1", "wired up the store").unwrap();
        store
            .add_prompt(NewPrompt {
                session_id: "s1".to_string(),
                content: "how does timeline work".to_string(),
                project: Some("engram".to_string()),
            })
            .unwrap();
        store.add_observation(new_observation("s1")).unwrap();

        let context = store.format_context(None).unwrap();
        assert!(context.contains("## Recent Sessions"));
        assert!(context.contains("## Recent User Prompts"));
        assert!(context.contains("## Recent Observations"));
    }

    #[test]
    fn test_export_import_round_trip_is_structurally_equal() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();
        store.add_observation(new_observation("s1")).unwrap();
        store
            .add_prompt(NewPrompt {
                session_id: "s1".to_string(),
                content: "a prompt".to_string(),
                project: None,
            })
            .unwrap();

        let exported = store.export().unwrap();

        let other = Store::in_memory().unwrap();
        let stats = other.import(&exported).unwrap();
        assert_eq!(stats.sessions_imported, 1);
        assert_eq!(stats.observations_imported, 1);
        assert_eq!(stats.prompts_imported, 1);

        let reimported = other.export().unwrap();
        assert_eq!(reimported.sessions.len(), exported.sessions.len());
        assert_eq!(reimported.observations.len(), exported.observations.len());
        assert_eq!(reimported.prompts.len(), exported.prompts.len());
        assert_eq!(reimported.sessions[0].project, exported.sessions[0].project);
        assert_eq!(
            reimported.observations[0].content,
            exported.observations[0].content
        );
    }

    #[test]
    fn test_import_skips_colliding_session_ids() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "engram", "/tmp").unwrap();

        let snapshot = store.export().unwrap();
        let stats = store.import(&snapshot).unwrap();
        assert_eq!(stats.sessions_skipped, 1);
        assert_eq!(stats.sessions_imported, 0);

        // Re-importing the same snapshot twice never duplicates the session.
        let sessions = store.recent_sessions(None, 10).unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_export_filtered_respects_project_with_session_fallback() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "acme", "/tmp").unwrap();
        store.create_session("s2", "other", "/tmp").unwrap();
        store.add_observation(new_observation("s1")).unwrap(); // project inherited-via-override is Some("engram")
        store
            .add_observation(NewObservation {
                project: None,
                ..new_observation("s2")
            })
            .unwrap();

        let filtered = store.export_filtered(Some("other")).unwrap();
        assert_eq!(filtered.sessions.len(), 1);
        assert_eq!(filtered.sessions[0].id, "s2");
        // s2's observation has no project of its own, so it inherits "other".
        assert_eq!(filtered.observations.len(), 1);
    }

    #[test]
    fn test_sync_chunk_bookkeeping() {
        let store = Store::in_memory().unwrap();
        assert_eq!(store.synced_chunk_count().unwrap(), 0);
        assert!(!store.has_synced_chunk("abc").unwrap());

        store.record_synced_chunk("abc").unwrap();
        store.record_synced_chunk("abc").unwrap(); // idempotent
        assert!(store.has_synced_chunk("abc").unwrap());
        assert_eq!(store.synced_chunk_count().unwrap(), 1);
    }

    #[test]
    fn test_stats_lists_sorted_distinct_projects() {
        let store = Store::in_memory().unwrap();
        store.create_session("s1", "zeta", "/tmp").unwrap();
        store.create_session("s2", "alpha", "/tmp").unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.session_count, 2);
        assert_eq!(stats.projects, vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
