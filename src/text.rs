//! Input cleanup applied before text is sent to an embedding or
//! classification provider.

/// Collapses whitespace runs (including newlines) to single spaces, strips
/// surrounding whitespace, and hard-truncates to `max_chars` characters.
///
/// Truncation counts characters rather than bytes so multi-byte input is
/// never split mid-character. Any whitespace exposed at the cut point is
/// stripped, which keeps the operation idempotent. Whitespace-only input
/// collapses to the empty string; callers that require content must treat
/// that as invalid.
pub fn normalize(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let truncated: String = collapsed.chars().take(max_chars).collect();
    truncated.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(
            normalize("  hello \n\n world\t\tagain ", 100),
            "hello world again"
        );
    }

    #[test]
    fn whitespace_only_becomes_empty() {
        assert_eq!(normalize("", 100), "");
        assert_eq!(normalize(" \n\t  ", 100), "");
    }

    #[test]
    fn truncates_by_characters_not_bytes() {
        // Four 3-byte characters; a byte-based cut at 2 would panic or split.
        assert_eq!(normalize("日本語です", 2), "日本");
    }

    #[test]
    fn truncation_strips_trailing_whitespace() {
        // The cut lands just past "ab ", leaving a trailing space to remove.
        assert_eq!(normalize("ab cd", 3), "ab");
    }

    #[test]
    fn idempotent_with_and_without_truncation() {
        for (input, budget) in [
            ("  mixed \n whitespace  everywhere ", 100),
            ("ab cd ef", 4),
            ("日本語です", 2),
            ("", 10),
        ] {
            let once = normalize(input, budget);
            assert_eq!(normalize(&once, budget), once);
        }
    }
}
