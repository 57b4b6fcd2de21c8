use std::borrow::Cow;

/// Cut `s` to at most `max_chars` characters, marking the cut with `...`.
/// Always splits on a char boundary.
pub fn truncate(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(format!("{}...", &s[..idx])),
        None => Cow::Borrowed(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_is_borrowed() {
        assert!(matches!(truncate("abc", 3), Cow::Borrowed("abc")));
    }

    #[test]
    fn long_input_is_cut_with_marker() {
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[test]
    fn multibyte_input_cuts_on_char_boundary() {
        assert_eq!(truncate("héllo wörld", 2), "hé...");
    }
}
