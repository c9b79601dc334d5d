//! Small string helpers.

/// Truncate `s` to at most `max_bytes`, backing off to a char boundary.
#[must_use]
pub fn truncate_to_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    &s[..s.floor_char_boundary(max_bytes)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_string_untouched() {
        assert_eq!(truncate_to_boundary("hello", 10), "hello");
    }

    #[test]
    fn cuts_ascii() {
        assert_eq!(truncate_to_boundary("hello world", 5), "hello");
    }

    #[test]
    fn backs_off_multibyte() {
        // "é" is two bytes; a cut at 1 must not split it.
        assert_eq!(truncate_to_boundary("éa", 1), "");
    }
}
