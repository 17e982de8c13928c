//! Unsafe-marker stripping
//!
//! Models sometimes tag spans such as `_POTENTIALLY_UNSAFE__`. A single `_`
//! opens a suppressed region and `__` closes it; suppressed characters are
//! dropped. A region still open at the end of the text is unmatched and is
//! emitted literally, so unmatched markers pass through unmodified.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Keeping,
    Suppressing,
}

/// Strip unsafe-marker-delimited spans from a reply
///
/// Idempotent: `strip_unsafe(&strip_unsafe(s)) == strip_unsafe(s)`.
pub fn strip_unsafe(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    // Characters of the currently open region, kept in case it never closes.
    let mut pending = String::new();
    let mut state = ScanState::Keeping;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match (state, ch) {
            (ScanState::Keeping, '_') => {
                state = ScanState::Suppressing;
                pending.push(ch);
            }
            (ScanState::Keeping, _) => output.push(ch),
            (ScanState::Suppressing, '_') if chars.peek() == Some(&'_') => {
                chars.next();
                pending.clear();
                state = ScanState::Keeping;
            }
            (ScanState::Suppressing, _) => pending.push(ch),
        }
    }

    if state == ScanState::Suppressing {
        output.push_str(&pending);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_marked_span() {
        assert_eq!(
            strip_unsafe("_POTENTIALLY_UNSAFE__I like dogs."),
            "I like dogs."
        );
        assert_eq!(strip_unsafe("hi _x__ there"), "hi  there");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(strip_unsafe("no markers here"), "no markers here");
        assert_eq!(strip_unsafe(""), "");
    }

    #[test]
    fn test_unmatched_marker_is_literal() {
        assert_eq!(strip_unsafe("snake_case"), "snake_case");
        assert_eq!(strip_unsafe("trailing _"), "trailing _");
        assert_eq!(strip_unsafe("a__b"), "a__b");
    }

    #[test]
    fn test_mixed_closed_and_unmatched() {
        assert_eq!(strip_unsafe("a_b__c_d"), "ac_d");
        assert_eq!(strip_unsafe("___"), "");
        assert_eq!(strip_unsafe("x___y"), "xy");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "_POTENTIALLY_UNSAFE__ok",
            "a_b__c_d",
            "__x",
            "_a_b",
            "one _two__ three _four",
            "____",
            "é_ü__ß",
        ];
        for sample in samples {
            let once = strip_unsafe(sample);
            assert_eq!(strip_unsafe(&once), once, "not idempotent for {:?}", sample);
        }
    }
}
