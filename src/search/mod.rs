//! Translates a free-form search query into an FTS5 `MATCH` expression.

/// Converts a whitespace-separated query into an AND-of-literal-tokens FTS5
/// `MATCH` expression: each token is unquoted if wrapped in ASCII double
/// quotes, then re-quoted. Phrase queries are not supported by design —
/// tokens are always matched independently of order or adjacency.
#[must_use]
pub fn sanitize(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| token.trim_matches('"'))
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{token}\""))
        .collect::<Vec<_>>()
        .join(" ")
}
