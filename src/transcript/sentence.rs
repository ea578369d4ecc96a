use serde::{Deserialize, Serialize};

/// A finished sentence in an episode transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    /// Start time in seconds from the beginning of the episode audio
    pub start: f64,
    /// End time in seconds from the beginning of the episode audio
    pub end: f64,
    /// Sentence text, trimmed of surrounding whitespace
    pub text: String,
    /// Speaker label, when the recognizer provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// A single recognizer hypothesis as it arrives over the vendor stream.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptFragment {
    /// Recognized text for this fragment
    pub text: String,
    /// Whether the recognizer has committed to this text
    pub is_final: bool,
    /// Start time in seconds, when the recognizer reported a usable one
    pub start_time: Option<f64>,
    /// End time in seconds, when the recognizer reported a usable one
    pub end_time: Option<f64>,
}
