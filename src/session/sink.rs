use super::session::TranscriptBundle;
use crate::error::TranscribeError;
use crate::transcript::Sentence;

/// Receives session progress as it happens.
///
/// The WebSocket gateway implements this to stream sentences to the
/// browser; batch callers that only want the stored result can use
/// [`NullSink`]. Exactly one terminal callback fires per run: one of
/// `on_existing`, `on_complete`, or `on_error`.
#[async_trait::async_trait]
pub trait SessionSink: Send + Sync {
    /// A completed transcript already existed; no upstream work was done.
    async fn on_existing(&self, transcript: &TranscriptBundle);

    /// One more sentence was finalized and persisted.
    async fn on_sentence(&self, index: usize, sentence: &Sentence);

    /// A fresh transcription finished and was stored.
    async fn on_complete(&self, transcript: &TranscriptBundle);

    /// The run failed. Fired at most once per run.
    async fn on_error(&self, error: &TranscribeError);
}

/// Sink that discards every event.
pub struct NullSink;

#[async_trait::async_trait]
impl SessionSink for NullSink {
    async fn on_existing(&self, _transcript: &TranscriptBundle) {}

    async fn on_sentence(&self, _index: usize, _sentence: &Sentence) {}

    async fn on_complete(&self, _transcript: &TranscriptBundle) {}

    async fn on_error(&self, _error: &TranscribeError) {}
}
