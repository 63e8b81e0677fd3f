//! Content redaction applied before anything reaches persistent storage.

mod redactor;

pub use redactor::strip;
