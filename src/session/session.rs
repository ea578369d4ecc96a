use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::sink::SessionSink;
use crate::asr::AsrBridge;
use crate::error::{TranscribeError, TranscribeResult};
use crate::store::{TranscriptionStatus, TranscriptionStore};
use crate::transcript::{Sentence, SentenceAggregator};

/// Everything needed to start one transcription run.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Owner of the transcription
    pub user_id: String,

    /// Episode being transcribed
    pub episode_id: String,

    /// Where to fetch the episode audio
    pub audio_url: String,

    /// Feed the episode came from, if the client knows it
    pub rss_url: Option<String>,

    /// Redo the work even when a completed transcript already exists
    pub force: bool,
}

/// A finished transcript as handed to sinks and callers.
#[derive(Debug, Clone)]
pub struct TranscriptBundle {
    /// Sentences in playback order
    pub sentences: Vec<Sentence>,

    /// All sentence texts joined by single spaces
    pub full_text: String,
}

impl TranscriptBundle {
    fn from_sentences(sentences: Vec<Sentence>) -> Self {
        let full_text = sentences
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            sentences,
            full_text,
        }
    }
}

/// How a successful run ended.
#[derive(Debug, Clone)]
pub enum SessionEnd {
    /// A stored transcript was returned; no upstream work was done.
    Existing(TranscriptBundle),
    /// A fresh transcription completed and was stored.
    Completed(TranscriptBundle),
}

/// Orchestrates one transcription run end to end.
///
/// Applies the idempotency shortcut, drives the recognizer bridge, folds
/// fragments into sentences, and keeps the store in step while reporting
/// progress to the caller's sink. The sink sees exactly one terminal
/// event per run.
#[derive(Debug, Clone)]
pub struct TranscriptionSession {
    store: TranscriptionStore,
    bridge: AsrBridge,
}

impl TranscriptionSession {
    pub fn new(store: TranscriptionStore, bridge: AsrBridge) -> Self {
        Self { store, bridge }
    }

    pub async fn run(
        &self,
        request: SessionRequest,
        sink: Arc<dyn SessionSink>,
        cancel: CancellationToken,
    ) -> TranscribeResult<SessionEnd> {
        let result = self.execute(&request, Arc::clone(&sink), &cancel).await;
        if let Err(ref e) = result {
            warn!(
                "Transcription failed for {}/{}: {}",
                request.user_id, request.episode_id, e
            );
            sink.on_error(e).await;
        }
        result
    }

    async fn execute(
        &self,
        request: &SessionRequest,
        sink: Arc<dyn SessionSink>,
        cancel: &CancellationToken,
    ) -> TranscribeResult<SessionEnd> {
        // A completed transcript is never redone unless the caller forces it.
        if !request.force {
            if let Some(record) = self
                .store
                .find(&request.user_id, &request.episode_id)
                .await?
            {
                if record.status == TranscriptionStatus::Done {
                    info!(
                        "Returning stored transcript for {}/{} ({} sentences)",
                        request.user_id,
                        request.episode_id,
                        record.sentences.len()
                    );
                    let bundle = TranscriptBundle {
                        sentences: record.sentences,
                        full_text: record.result_text,
                    };
                    sink.on_existing(&bundle).await;
                    return Ok(SessionEnd::Existing(bundle));
                }
            }
        }

        self.store
            .mark_processing(
                &request.user_id,
                &request.episode_id,
                &request.audio_url,
                request.rss_url.as_deref(),
            )
            .await?;
        info!(
            "Transcribing {}/{} from {}",
            request.user_id, request.episode_id, request.audio_url
        );

        let outcome: TranscribeResult<TranscriptBundle> = async {
            let sentences = self.transcribe(request, Arc::clone(&sink), cancel).await?;
            let bundle = TranscriptBundle::from_sentences(sentences);
            self.store
                .mark_done(
                    &request.user_id,
                    &request.episode_id,
                    &bundle.sentences,
                    &bundle.full_text,
                )
                .await?;
            Ok(bundle)
        }
        .await;

        match outcome {
            Ok(bundle) => {
                info!(
                    "Transcription complete for {}/{} ({} sentences)",
                    request.user_id,
                    request.episode_id,
                    bundle.sentences.len()
                );
                sink.on_complete(&bundle).await;
                Ok(SessionEnd::Completed(bundle))
            }
            Err(e) => {
                // Best effort; the original failure is what the caller needs.
                if let Err(store_err) = self
                    .store
                    .mark_error(&request.user_id, &request.episode_id)
                    .await
                {
                    warn!(
                        "Could not record error state for {}/{}: {}",
                        request.user_id, request.episode_id, store_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Drive the bridge and fold its fragments into persisted sentences.
    async fn transcribe(
        &self,
        request: &SessionRequest,
        sink: Arc<dyn SessionSink>,
        cancel: &CancellationToken,
    ) -> TranscribeResult<Vec<Sentence>> {
        let (fragment_tx, mut fragment_rx) = mpsc::channel(64);
        let bridge = self.bridge.clone();
        let audio_url = request.audio_url.clone();
        let bridge_cancel = cancel.child_token();
        let worker_cancel = bridge_cancel.clone();
        let bridge_task =
            tokio::spawn(async move { bridge.run(&audio_url, fragment_tx, worker_cancel).await });

        let mut aggregator = SentenceAggregator::new();
        let mut sentences: Vec<Sentence> = Vec::new();
        let mut first_error: Option<TranscribeError> = None;

        while let Some(fragment) = fragment_rx.recv().await {
            let Some(sentence) = aggregator.ingest(&fragment) else {
                continue;
            };
            sink.on_sentence(sentences.len(), &sentence).await;
            if let Err(e) = self
                .store
                .append_sentence(&request.user_id, &request.episode_id, &sentence)
                .await
            {
                first_error = Some(e);
                bridge_cancel.cancel();
                break;
            }
            sentences.push(sentence);
        }

        // Unblock the bridge if we stopped reading early, then collect its
        // verdict.
        drop(fragment_rx);
        let bridge_result = match bridge_task.await {
            Ok(result) => result,
            Err(e) => {
                error!("ASR bridge task panicked: {}", e);
                Err(TranscribeError::UpstreamProtocol(format!(
                    "ASR bridge task failed: {}",
                    e
                )))
            }
        };
        if let Some(e) = first_error {
            return Err(e);
        }
        bridge_result?;

        // Whatever is still buffered becomes the closing sentence.
        if let Some(sentence) = aggregator.finalize() {
            sink.on_sentence(sentences.len(), &sentence).await;
            self.store
                .append_sentence(&request.user_id, &request.episode_id, &sentence)
                .await?;
            sentences.push(sentence);
        }

        Ok(sentences)
    }
}
