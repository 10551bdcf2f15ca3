//! UTF-8-safe string truncation utilities.

/// Truncate a string at the nearest char boundary at or before `max_bytes`.
///
/// If `s` is already within `max_bytes`, returns it unchanged. Otherwise,
/// walks backward from `max_bytes` to find the nearest valid `char`
/// boundary and returns the prefix up to that point.
///
/// # Examples
///
/// ```
/// use warden_core::truncate_to_boundary;
///
/// assert_eq!(truncate_to_boundary("hello world", 5), "hello");
///
/// // 'é' is two bytes; never split it.
/// assert_eq!(truncate_to_boundary("café", 4), "caf");
/// ```
#[must_use]
pub fn truncate_to_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_string_returned_unchanged() {
        assert_eq!(truncate_to_boundary("hello", 200), "hello");
    }

    #[test]
    fn ascii_truncates_at_exact_boundary() {
        let s = "x".repeat(300);
        assert_eq!(truncate_to_boundary(&s, 200).len(), 200);
    }

    #[test]
    fn four_byte_char_at_boundary() {
        let mut s = "x".repeat(198);
        s.push('🦀');
        assert_eq!(truncate_to_boundary(&s, 200), "x".repeat(198));
    }

    #[test]
    fn zero_max_bytes_returns_empty() {
        assert_eq!(truncate_to_boundary("hello", 0), "");
    }

    #[test]
    fn result_is_always_a_char_boundary() {
        let s = "añ€🦀".repeat(50);
        for boundary in [1, 2, 3, 4, 5, 50, 100, 199] {
            let result = truncate_to_boundary(&s, boundary);
            assert!(result.len() <= boundary);
            assert!(s.is_char_boundary(result.len()));
        }
    }
}
