//! Control tokens recognized inside TaskWorld utterances

/// In-band command carried by an utterance
///
/// Variants are declared in precedence order: when several tokens appear in
/// one utterance the earliest variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlToken {
    /// End the episode
    Done,
    /// Clear the agent's working context
    Reset,
    /// Reserved; currently inert
    FetchAll,
}

impl ControlToken {
    /// All tokens, highest precedence first
    pub const PRECEDENCE: [ControlToken; 3] =
        [ControlToken::Done, ControlToken::Reset, ControlToken::FetchAll];

    /// Literal form on the wire
    pub fn literal(self) -> &'static str {
        match self {
            ControlToken::Done => "[DONE]",
            ControlToken::Reset => "[RESET]",
            ControlToken::FetchAll => "[FETCH_ALL_DATA]",
        }
    }

    /// Highest-precedence token present as a whole word of `text`
    ///
    /// Punctuation hugging a word (`"[DONE]."`, `"[RESET],"`) is ignored;
    /// the brackets themselves must be present.
    pub fn detect(text: &str) -> Option<ControlToken> {
        let words: Vec<&str> = text
            .split_whitespace()
            .map(|word| word.trim_matches(is_edge_punctuation))
            .collect();
        Self::PRECEDENCE
            .into_iter()
            .find(|token| words.contains(&token.literal()))
    }
}

fn is_edge_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() && c != '[' && c != ']'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_bare_tokens() {
        assert_eq!(ControlToken::detect("[DONE]"), Some(ControlToken::Done));
        assert_eq!(ControlToken::detect(" [RESET] "), Some(ControlToken::Reset));
        assert_eq!(
            ControlToken::detect("[FETCH_ALL_DATA]"),
            Some(ControlToken::FetchAll)
        );
    }

    #[test]
    fn test_whole_word_only() {
        assert_eq!(ControlToken::detect("hello"), None);
        assert_eq!(ControlToken::detect("x[DONE]"), None);
        assert_eq!(ControlToken::detect("[done]"), None);
        assert_eq!(ControlToken::detect("ok, I'm [DONE] now"), Some(ControlToken::Done));
        assert_eq!(ControlToken::detect("DONE."), None);
    }

    #[test]
    fn test_surrounding_punctuation_is_ignored() {
        assert_eq!(ControlToken::detect("I'm [DONE]."), Some(ControlToken::Done));
        assert_eq!(ControlToken::detect("[RESET], please"), Some(ControlToken::Reset));
        assert_eq!(ControlToken::detect("[DONE], "), Some(ControlToken::Done));
        assert_eq!(ControlToken::detect("(\"[RESET]\")"), Some(ControlToken::Reset));
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            ControlToken::detect("[FETCH_ALL_DATA] [RESET] [DONE]"),
            Some(ControlToken::Done)
        );
        assert_eq!(
            ControlToken::detect("[FETCH_ALL_DATA] [RESET]"),
            Some(ControlToken::Reset)
        );
    }
}
