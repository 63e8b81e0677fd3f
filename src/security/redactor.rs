//! Redacts `<private>...</private>` spans before content is stored.

use once_cell::sync::Lazy;
use regex::Regex;

static PRIVATE_SPAN: Lazy<Regex> = Lazy::new(|| {
    // (?is): case-insensitive, dot matches newline. Non-greedy so nested or
    // repeated tags collapse each outer span into a single [REDACTED] marker
    // rather than one marker per inner tag.
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?is)<private>.*?</private>").unwrap()
});

/// Replaces every `<private>...</private>` span with `[REDACTED]` and trims
/// surrounding whitespace. Idempotent: running it twice is the same as once.
#[must_use]
pub fn strip(text: &str) -> String {
    PRIVATE_SPAN.replace_all(text, "[REDACTED]").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_single_span() {
        assert_eq!(
            strip("hello <private>secret</private> world"),
            "hello [REDACTED] world"
        );
    }

    #[test]
    fn test_strip_case_insensitive() {
        assert_eq!(
            strip("a <PRIVATE>x</PRIVATE> b"),
            "a [REDACTED] b"
        );
    }

    #[test]
    fn test_strip_multiline() {
        let input = "keep\n<private>line one\nline two</private>\nkeep";
        assert_eq!(strip(input), "keep\n[REDACTED]\nkeep");
    }

    #[test]
    fn test_strip_multiple_spans() {
        assert_eq!(
            strip("<private>a</private> mid <private>b</private>"),
            "[REDACTED] mid [REDACTED]"
        );
    }

    #[test]
    fn test_strip_nested_tags_collapse_to_one_marker() {
        // Non-greedy matching means the first closing tag ends the span, and
        // the leftover closing tag is plain text, not a second redaction.
        let input = "<private>outer <private>inner</private></private>";
        let out = strip(input);
        assert_eq!(out.matches("[REDACTED]").count(), 1);
    }

    #[test]
    fn test_strip_no_private_tags() {
        assert_eq!(strip("nothing to redact"), "nothing to redact");
    }

    #[test]
    fn test_strip_trims_whitespace() {
        assert_eq!(strip("  hello world  "), "hello world");
    }

    #[test]
    fn test_strip_idempotent() {
        let input = "a <private>x</private> b";
        let once = strip(input);
        let twice = strip(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_strip_never_leaks_private_content() {
        let input = "public <private>API_KEY=abc123</private> text";
        let out = strip(input);
        assert!(!out.contains("API_KEY"));
        assert!(!out.contains("abc123"));
    }
}
