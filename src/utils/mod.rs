pub mod concurrency;
pub mod retry;

/// Truncates to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Error messages stored on rows are capped at 500 characters.
pub fn error_message(s: &str) -> String {
    truncate_chars(s, 500)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(error_message(&"x".repeat(800)).len(), 500);
    }
}
