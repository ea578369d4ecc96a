use super::state::AppState;
use super::ws::TranscriptPayload;
use crate::error::TranscribeError;
use crate::session::{NullSink, SessionEnd, SessionRequest};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTranscriptionRequest {
    /// Owner of the transcription
    pub user_id: String,

    /// Episode to transcribe
    pub episode_id: String,

    /// Where to fetch the episode audio
    pub audio_url: String,

    /// Feed the episode came from
    pub rss_url: Option<String>,

    /// Redo the work even when a completed transcript exists
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionOutcome {
    pub user_id: String,
    pub episode_id: String,
    /// "existing" when a stored transcript was returned, "done" otherwise
    pub status: String,
    pub data: TranscriptPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /transcriptions
/// Run (or join) a transcription and respond once it finishes
pub async fn start_transcription(
    State(state): State<AppState>,
    Json(req): Json<StartTranscriptionRequest>,
) -> impl IntoResponse {
    info!(
        "Transcription requested for {}/{} (force: {})",
        req.user_id, req.episode_id, req.force
    );

    let request = SessionRequest {
        user_id: req.user_id.clone(),
        episode_id: req.episode_id.clone(),
        audio_url: req.audio_url,
        rss_url: req.rss_url,
        force: req.force,
    };

    let outcome = state
        .registry
        .run_or_join(request, Arc::new(NullSink), CancellationToken::new())
        .await;

    match outcome {
        Ok(end) => {
            let (status, bundle) = match &end {
                SessionEnd::Existing(bundle) => ("existing", bundle),
                SessionEnd::Completed(bundle) => ("done", bundle),
            };
            (
                StatusCode::OK,
                Json(TranscriptionOutcome {
                    user_id: req.user_id,
                    episode_id: req.episode_id,
                    status: status.to_string(),
                    data: TranscriptPayload::from(bundle),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(
                "Transcription failed for {}/{}: {}",
                req.user_id, req.episode_id, e
            );
            (
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /transcriptions/:user_id/:episode_id
/// Fetch the stored transcription record
pub async fn get_transcription(
    State(state): State<AppState>,
    Path((user_id, episode_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.find(&user_id, &episode_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No transcription for {}/{}", user_id, episode_id),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Lookup failed for {}/{}: {}", user_id, episode_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn error_status(error: &TranscribeError) -> StatusCode {
    match error {
        TranscribeError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        TranscribeError::AudioFetch(_) | TranscribeError::UpstreamProtocol(_) => {
            StatusCode::BAD_GATEWAY
        }
        TranscribeError::ClientProtocol(_) => StatusCode::BAD_REQUEST,
        TranscribeError::Persistence(_) | TranscribeError::Cancelled(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
