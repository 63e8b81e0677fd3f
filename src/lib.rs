//! # Engram
//!
//! A local, embeddable memory engine for a single AI coding agent user.
//!
//! Engram persists three linked entity streams behind one embedded `SQLite`
//! database — sessions, observations, and user prompts — and exposes them
//! through full-text search, a timeline-neighborhood query, and a markdown
//! context digest. Content is redacted before it ever reaches disk, and a
//! sync engine lets two machines exchange history through gzipped,
//! content-addressed chunks.
//!
//! ## Example
//!
//! ```rust,ignore
//! use engram::storage::Store;
//!
//! let store = Store::open("engram.db")?;
//! store.create_session("sess-1", "engram", "/home/user/engram")?;
//! store.add_observation(engram::storage::NewObservation {
//!     session_id: "sess-1".into(),
//!     r#type: "note".into(),
//!     title: "first observation".into(),
//!     content: "wired up the store".into(),
//!     tool_name: None,
//!     project: Some("engram".into()),
//! })?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

pub mod config;
pub mod http;
pub mod mcp;
pub mod observability;
pub mod search;
pub mod security;
pub mod storage;
pub mod sync;

pub use config::EngramConfig;
pub use storage::Store;

/// Error type for Engram operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `NotFound` | A caller-supplied id (session, observation) has no matching row |
/// | `InvalidInput` | A required field is empty, or a numeric parameter is out of range |
/// | `Storage` | A `SQLite` query, transaction, or pragma fails |
/// | `Io` | Filesystem access for the data dir or sync directory fails |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The requested entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// The kind of entity that was looked up (e.g. `"session"`).
        kind: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A storage-layer operation failed.
    #[error("storage operation '{operation}' failed: {cause}")]
    Storage {
        /// The operation that failed (e.g. `"add_observation"`).
        operation: String,
        /// The underlying cause, usually a `SQLite` error message.
        cause: String,
    },

    /// A filesystem operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage {
            operation: "sqlite".to_string(),
            cause: err.to_string(),
        }
    }
}

/// Result type alias for Engram operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current UTC timestamp formatted as RFC 3339.
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("empty content".to_string());
        assert_eq!(err.to_string(), "invalid input: empty content");

        let err = Error::NotFound {
            kind: "session",
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "session not found: abc");

        let err = Error::Storage {
            operation: "add_observation".to_string(),
            cause: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "storage operation 'add_observation' failed: disk full"
        );
    }
}
