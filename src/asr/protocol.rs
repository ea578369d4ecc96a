use serde::{Deserialize, Serialize};

use crate::asr::AsrConfig;
use crate::transcript::TranscriptFragment;

/// First frame on the vendor socket. Declares the audio container and the
/// transcription options for the whole session.
#[derive(Debug, Serialize)]
pub struct StartRecognition {
    pub message: &'static str,
    pub audio_format: AudioFormat,
    pub transcription_config: TranscriptionConfig,
}

#[derive(Debug, Serialize)]
pub struct AudioFormat {
    /// Container type; "file" means a streamed encoded file rather than raw PCM
    #[serde(rename = "type")]
    pub format: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TranscriptionConfig {
    pub language: String,
    pub operating_point: String,
    pub enable_partials: bool,
    pub punctuation: PunctuationConfig,
}

#[derive(Debug, Serialize)]
pub struct PunctuationConfig {
    pub enabled: bool,
}

impl StartRecognition {
    pub fn new(config: &AsrConfig) -> Self {
        Self {
            message: "StartRecognition",
            audio_format: AudioFormat { format: "file" },
            transcription_config: TranscriptionConfig {
                language: config.language.clone(),
                operating_point: config.operating_point.clone(),
                enable_partials: true,
                punctuation: PunctuationConfig { enabled: true },
            },
        }
    }
}

/// Last frame on the vendor socket, sent once every audio byte is on the wire.
#[derive(Debug, Serialize)]
pub struct EndOfStream {
    pub message: &'static str,
    /// Sequence number of the final binary frame
    pub last_seq_no: u64,
}

impl EndOfStream {
    pub fn new(chunks_sent: u64) -> Self {
        Self {
            message: "EndOfStream",
            last_seq_no: chunks_sent.saturating_sub(1),
        }
    }
}

/// Any text frame the vendor sends back. `message` discriminates; the
/// remaining fields are only present for some message types.
#[derive(Debug, Deserialize)]
pub struct AsrEnvelope {
    pub message: String,
    #[serde(default)]
    pub metadata: Option<FragmentMetadata>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Fragment payload carried by `AddTranscript` frames.
#[derive(Debug, Deserialize)]
pub struct FragmentMetadata {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
}

impl From<FragmentMetadata> for TranscriptFragment {
    fn from(metadata: FragmentMetadata) -> Self {
        Self {
            text: metadata.transcript,
            is_final: metadata.is_final,
            start_time: metadata.start_time,
            end_time: metadata.end_time,
        }
    }
}
