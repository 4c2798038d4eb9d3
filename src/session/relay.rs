use crate::decoder::{ResultMode, END_OF_UTTERANCE};

/// Transcript ready to be post-processed and sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResult {
    pub text: String,
    pub is_final: bool,
}

/// Turns decoder output into transcripts, one strategy per result protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultRelay {
    /// Accumulates words until the end-of-utterance token
    WordTokens { partial: String },
    /// Relays whole hypotheses as they arrive
    ResultObjects,
}

impl ResultRelay {
    pub fn new(mode: ResultMode) -> Self {
        match mode {
            ResultMode::WordTokens => ResultRelay::WordTokens {
                partial: String::new(),
            },
            ResultMode::ResultObjects => ResultRelay::ResultObjects,
        }
    }

    pub fn mode(&self) -> ResultMode {
        match self {
            ResultRelay::WordTokens { .. } => ResultMode::WordTokens,
            ResultRelay::ResultObjects => ResultMode::ResultObjects,
        }
    }

    /// Handle one word token. Returns `None` if this relay does not speak
    /// the word-token protocol.
    pub fn on_word(&mut self, token: &str) -> Option<PendingResult> {
        let ResultRelay::WordTokens { partial } = self else {
            return None;
        };

        if token == END_OF_UTTERANCE {
            return Some(PendingResult {
                text: std::mem::take(partial),
                is_final: true,
            });
        }

        if !partial.is_empty() {
            partial.push(' ');
        }
        partial.push_str(token);

        Some(PendingResult {
            text: partial.clone(),
            is_final: false,
        })
    }

    /// Handle one hypothesis. Returns `None` if this relay does not speak
    /// the result-object protocol.
    pub fn on_result(&mut self, hypothesis: String, is_final: bool) -> Option<PendingResult> {
        match self {
            ResultRelay::ResultObjects => Some(PendingResult {
                text: hypothesis,
                is_final,
            }),
            ResultRelay::WordTokens { .. } => None,
        }
    }

    /// Text accumulated since the last final segment
    pub fn partial(&self) -> &str {
        match self {
            ResultRelay::WordTokens { partial } => partial,
            ResultRelay::ResultObjects => "",
        }
    }

    pub fn reset(&mut self) {
        if let ResultRelay::WordTokens { partial } = self {
            partial.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(text: &str, is_final: bool) -> PendingResult {
        PendingResult {
            text: text.to_string(),
            is_final,
        }
    }

    #[test]
    fn test_words_accumulate_until_end_of_utterance() {
        let mut relay = ResultRelay::new(ResultMode::WordTokens);

        assert_eq!(relay.on_word("hello"), Some(pending("hello", false)));
        assert_eq!(relay.on_word("world"), Some(pending("hello world", false)));
        assert_eq!(
            relay.on_word(END_OF_UTTERANCE),
            Some(pending("hello world", true))
        );
        assert_eq!(relay.partial(), "");
    }

    #[test]
    fn test_next_utterance_starts_fresh() {
        let mut relay = ResultRelay::new(ResultMode::WordTokens);
        relay.on_word("one");
        relay.on_word(END_OF_UTTERANCE);

        assert_eq!(relay.on_word("two"), Some(pending("two", false)));
    }

    #[test]
    fn test_end_of_utterance_without_words_is_empty_final() {
        let mut relay = ResultRelay::new(ResultMode::WordTokens);
        assert_eq!(relay.on_word(END_OF_UTTERANCE), Some(pending("", true)));
    }

    #[test]
    fn test_result_objects_pass_through() {
        let mut relay = ResultRelay::new(ResultMode::ResultObjects);

        assert_eq!(
            relay.on_result("test".to_string(), true),
            Some(pending("test", true))
        );
        assert_eq!(
            relay.on_result("partial guess".to_string(), false),
            Some(pending("partial guess", false))
        );
        assert_eq!(relay.partial(), "");
    }

    #[test]
    fn test_wrong_protocol_is_rejected() {
        let mut words = ResultRelay::new(ResultMode::WordTokens);
        assert_eq!(words.on_result("x".to_string(), true), None);

        let mut results = ResultRelay::new(ResultMode::ResultObjects);
        assert_eq!(results.on_word("x"), None);
    }

    #[test]
    fn test_reset_clears_partial() {
        let mut relay = ResultRelay::new(ResultMode::WordTokens);
        relay.on_word("dangling");
        relay.reset();
        assert_eq!(relay.partial(), "");
        assert_eq!(relay.mode(), ResultMode::WordTokens);
    }
}
