use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::session::{SessionEnd, SessionRequest, TranscriptionSession};
use super::sink::SessionSink;
use crate::error::{TranscribeError, TranscribeResult};

/// Identity of one transcription attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    user_id: String,
    episode_id: String,
}

type Outcome = Option<TranscribeResult<SessionEnd>>;

/// Deduplicates concurrent runs per (user, episode).
///
/// The first caller for a key becomes the leader and does the real work on
/// a detached task; callers arriving while it runs subscribe to the same
/// outcome instead of opening a second vendor session. The key is cleared
/// before the outcome is published, so anyone who has seen a result can
/// immediately start a fresh run.
pub struct SessionRegistry {
    session: TranscriptionSession,
    inflight: Arc<Mutex<HashMap<SessionKey, watch::Receiver<Outcome>>>>,
}

impl SessionRegistry {
    pub fn new(session: TranscriptionSession) -> Self {
        Self {
            session,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run a transcription, or join one already in flight for the same
    /// (user, episode). Every caller gets the same outcome; joiners have
    /// the terminal event replayed on their own sink.
    ///
    /// The in-flight key does not include `force`: a forced request that
    /// arrives while a non-forced run is in flight joins that run and
    /// shares its outcome, which can be `Existing`. Retrying after the
    /// result lands starts a fresh run, because the key clears first.
    pub async fn run_or_join(
        &self,
        request: SessionRequest,
        sink: Arc<dyn SessionSink>,
        cancel: CancellationToken,
    ) -> TranscribeResult<SessionEnd> {
        let key = SessionKey {
            user_id: request.user_id.clone(),
            episode_id: request.episode_id.clone(),
        };

        let (mut outcome_rx, leading) = {
            let mut inflight = self.inflight.lock().await;
            match inflight.get(&key) {
                Some(rx) => {
                    info!(
                        "Joining in-flight transcription for {}/{}",
                        key.user_id, key.episode_id
                    );
                    (rx.clone(), false)
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(key.clone(), rx.clone());

                    let session = self.session.clone();
                    let inflight_map = Arc::clone(&self.inflight);
                    let leader_sink = Arc::clone(&sink);
                    let leader_request = request.clone();
                    let leader_key = key.clone();
                    tokio::spawn(async move {
                        // The inner task isolates panics so the key still
                        // gets cleared and followers still get an outcome.
                        let worker = tokio::spawn(async move {
                            session.run(leader_request, leader_sink, cancel).await
                        });
                        let result = match worker.await {
                            Ok(result) => result,
                            Err(e) => {
                                warn!("Transcription task panicked: {}", e);
                                Err(TranscribeError::Cancelled(
                                    "transcription task failed".to_string(),
                                ))
                            }
                        };
                        inflight_map.lock().await.remove(&leader_key);
                        let _ = tx.send(Some(result));
                    });
                    (rx, true)
                }
            }
        };

        let outcome = loop {
            let current = outcome_rx.borrow_and_update().clone();
            if let Some(result) = current {
                break result;
            }
            if outcome_rx.changed().await.is_err() {
                break Err(TranscribeError::Cancelled(
                    "transcription ended without a result".to_string(),
                ));
            }
        };

        // The leader's sink already saw every event along the way.
        if !leading {
            match &outcome {
                Ok(SessionEnd::Existing(bundle)) => sink.on_existing(bundle).await,
                Ok(SessionEnd::Completed(bundle)) => sink.on_complete(bundle).await,
                Err(e) => sink.on_error(e).await,
            }
        }

        outcome
    }
}
