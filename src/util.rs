//! Small shared text helpers.

/// Truncate `s` to at most `max` bytes, backing off to a char boundary.
pub fn clip(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Like `clip`, appending `...` whenever anything was cut.
pub fn clip_with_ellipsis(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    format!("{}...", clip(s, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_pass_through() {
        assert_eq!(clip("hello", 10), "hello");
        assert_eq!(clip_with_ellipsis("hello", 5), "hello");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // "é" is two bytes; a cut at byte 1 must back off to 0
        assert_eq!(clip("é", 1), "");
        assert_eq!(clip("aé", 2), "a");
    }

    #[test]
    fn ellipsis_marks_truncation_only() {
        assert_eq!(clip_with_ellipsis("abcdef", 3), "abc...");
        assert_eq!(clip_with_ellipsis("abc", 3), "abc");
    }
}
