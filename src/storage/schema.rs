//! Declarative, idempotent schema creation.
//!
//! Every statement uses `IF NOT EXISTS` so running this against an
//! already-initialized database is a no-op, as the migrator invariant
//! requires.

use rusqlite::Connection;

/// Creates all tables, indices, FTS5 virtual tables, and sync triggers if
/// they are not already present.
///
/// # Errors
///
/// Returns [`crate::Error::Storage`] if any statement fails.
pub fn apply(conn: &Connection) -> crate::Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS sessions (
            id          TEXT PRIMARY KEY,
            project     TEXT NOT NULL,
            directory   TEXT NOT NULL,
            start_time  TEXT NOT NULL,
            end_time    TEXT,
            summary     TEXT
        );

        CREATE TABLE IF NOT EXISTS observations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL,
            type        TEXT NOT NULL,
            title       TEXT NOT NULL,
            content     TEXT NOT NULL,
            tool_name   TEXT,
            project     TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_prompts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL,
            content     TEXT NOT NULL,
            project     TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_chunks (
            chunk_id    TEXT PRIMARY KEY,
            imported_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_observations_session_id ON observations(session_id);
        CREATE INDEX IF NOT EXISTS idx_observations_type ON observations(type);
        CREATE INDEX IF NOT EXISTS idx_observations_project ON observations(project);
        CREATE INDEX IF NOT EXISTS idx_observations_created_at ON observations(created_at DESC);

        CREATE INDEX IF NOT EXISTS idx_user_prompts_session_id ON user_prompts(session_id);
        CREATE INDEX IF NOT EXISTS idx_user_prompts_project ON user_prompts(project);
        CREATE INDEX IF NOT EXISTS idx_user_prompts_created_at ON user_prompts(created_at DESC);

        CREATE VIRTUAL TABLE IF NOT EXISTS observations_fts USING fts5(
            title, content, tool_name, type, project,
            content='observations', content_rowid='id'
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS user_prompts_fts USING fts5(
            content, project,
            content='user_prompts', content_rowid='id'
        );

        CREATE TRIGGER IF NOT EXISTS obs_fts_insert AFTER INSERT ON observations BEGIN
            INSERT INTO observations_fts(rowid, title, content, tool_name, type, project)
            VALUES (new.id, new.title, new.content, new.tool_name, new.type, new.project);
        END;

        CREATE TRIGGER IF NOT EXISTS obs_fts_delete AFTER DELETE ON observations BEGIN
            INSERT INTO observations_fts(observations_fts, rowid, title, content, tool_name, type, project)
            VALUES ('delete', old.id, old.title, old.content, old.tool_name, old.type, old.project);
        END;

        CREATE TRIGGER IF NOT EXISTS obs_fts_update AFTER UPDATE ON observations BEGIN
            INSERT INTO observations_fts(observations_fts, rowid, title, content, tool_name, type, project)
            VALUES ('delete', old.id, old.title, old.content, old.tool_name, old.type, old.project);
            INSERT INTO observations_fts(rowid, title, content, tool_name, type, project)
            VALUES (new.id, new.title, new.content, new.tool_name, new.type, new.project);
        END;

        CREATE TRIGGER IF NOT EXISTS prompt_fts_insert AFTER INSERT ON user_prompts BEGIN
            INSERT INTO user_prompts_fts(rowid, content, project)
            VALUES (new.id, new.content, new.project);
        END;

        CREATE TRIGGER IF NOT EXISTS prompt_fts_delete AFTER DELETE ON user_prompts BEGIN
            INSERT INTO user_prompts_fts(user_prompts_fts, rowid, content, project)
            VALUES ('delete', old.id, old.content, old.project);
        END;

        CREATE TRIGGER IF NOT EXISTS prompt_fts_update AFTER UPDATE ON user_prompts BEGIN
            INSERT INTO user_prompts_fts(user_prompts_fts, rowid, content, project)
            VALUES ('delete', old.id, old.content, old.project);
            INSERT INTO user_prompts_fts(rowid, content, project)
            VALUES (new.id, new.content, new.project);
        END;
        ",
    )?;

    Ok(())
}
