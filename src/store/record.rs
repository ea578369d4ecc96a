use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transcript::Sentence;

/// Lifecycle of one (user, episode) transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionStatus {
    /// Row exists but no attempt has started yet
    Pending,
    /// A transcription run is in flight
    Processing,
    /// A finished transcript is stored
    Done,
    /// The last attempt failed; its partial data has been cleared
    Error,
}

impl TranscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One stored transcription. There is exactly one row per
/// (user, episode) pair; reruns update it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionRecord {
    /// Stable row identifier
    pub id: String,
    /// Owner of this transcription
    pub user_id: String,
    /// Episode the audio belongs to
    pub episode_id: String,
    /// Where the episode audio is fetched from
    pub audio_url: String,
    /// Feed the episode came from, when the client supplied it
    pub rss_url: Option<String>,
    /// Current lifecycle state
    pub status: TranscriptionStatus,
    /// Full transcript text, empty until a run completes
    pub result_text: String,
    /// Sentences accumulated so far, in arrival order
    pub sentences: Vec<Sentence>,
    /// When the row was first created
    pub created_at: DateTime<Utc>,
    /// When the row last changed
    pub updated_at: DateTime<Utc>,
}
