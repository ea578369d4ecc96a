use crate::transcript::{Sentence, TranscriptFragment};

/// Characters that close a sentence.
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?'];

/// Quote and bracket characters that may trail a terminator ("He left."),
/// still counting as the end of a sentence.
const TRAILING_CLOSERS: &[char] = &['"', '\'', ')', ']'];

/// Leading punctuation that attaches to the previous word without a space.
const ATTACHING_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':', ')', ']'];

/// Folds final recognizer fragments into complete sentences.
///
/// Partial hypotheses are dropped; final fragments accumulate in a buffer
/// that is flushed whenever a fragment ends with sentence-closing
/// punctuation. Timing comes from the first and last fragments that carried
/// finite timestamps.
#[derive(Debug, Default)]
pub struct SentenceAggregator {
    buffer: String,
    buffer_start: Option<f64>,
    buffer_end: Option<f64>,
}

impl SentenceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one recognizer fragment. Returns a sentence when this fragment
    /// completes one, otherwise keeps accumulating.
    pub fn ingest(&mut self, fragment: &TranscriptFragment) -> Option<Sentence> {
        if !fragment.is_final {
            return None;
        }
        let text = fragment.text.trim();
        if text.is_empty() {
            return None;
        }

        if !self.buffer.is_empty() && !text.starts_with(ATTACHING_PUNCTUATION) {
            self.buffer.push(' ');
        }
        self.buffer.push_str(text);

        let start = fragment.start_time.filter(|t| t.is_finite());
        let end = fragment.end_time.filter(|t| t.is_finite());
        if self.buffer_start.is_none() {
            self.buffer_start = start;
        }
        if end.is_some() {
            self.buffer_end = end;
        }

        if ends_sentence(text) {
            return self.flush(end);
        }
        None
    }

    /// Flush whatever is still buffered at end of stream. Safe to call
    /// more than once; later calls return `None`.
    pub fn finalize(&mut self) -> Option<Sentence> {
        self.flush(None)
    }

    fn flush(&mut self, end_override: Option<f64>) -> Option<Sentence> {
        let text = self.buffer.trim();
        if text.is_empty() {
            self.reset();
            return None;
        }
        let sentence = Sentence {
            start: self.buffer_start.unwrap_or(0.0),
            end: end_override
                .or(self.buffer_end)
                .or(self.buffer_start)
                .unwrap_or(0.0),
            text: text.to_string(),
            speaker: None,
        };
        self.reset();
        Some(sentence)
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.buffer_start = None;
        self.buffer_end = None;
    }
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end_matches(TRAILING_CLOSERS)
        .ends_with(SENTENCE_TERMINATORS)
}
