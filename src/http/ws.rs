use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::state::AppState;
use crate::error::TranscribeError;
use crate::session::{SessionEnd, SessionRequest, SessionSink, TranscriptBundle};
use crate::transcript::Sentence;

// WebSocket close codes used by the transcription protocol.
const CLOSE_NORMAL: u16 = 1000;
const CLOSE_UNSUPPORTED_DATA: u16 = 1003;
const CLOSE_POLICY_VIOLATION: u16 = 1008;
const CLOSE_INTERNAL_ERROR: u16 = 1011;

// ============================================================================
// Wire Types
// ============================================================================

/// Frames the gateway sends to the browser.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Ready,
    Started,
    Sentence { data: SentencePayload },
    Existing { data: TranscriptPayload },
    Complete { data: TranscriptPayload },
    Error { message: String },
}

impl ServerMessage {
    pub fn sentence(index: usize, sentence: &Sentence) -> Self {
        Self::Sentence {
            data: SentencePayload::new(index, sentence),
        }
    }

    pub fn existing(bundle: &TranscriptBundle) -> Self {
        Self::Existing {
            data: TranscriptPayload::from(bundle),
        }
    }

    pub fn complete(bundle: &TranscriptBundle) -> Self {
        Self::Complete {
            data: TranscriptPayload::from(bundle),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// One sentence as streamed to the browser.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentencePayload {
    /// Position in the transcript, starting at 0
    pub index: usize,
    pub text: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Start time in whole milliseconds, for players that seek by ms
    pub offset_milliseconds: i64,
    pub end_offset_milliseconds: i64,
}

impl SentencePayload {
    pub fn new(index: usize, sentence: &Sentence) -> Self {
        Self {
            index,
            text: sentence.text.clone(),
            start: sentence.start,
            end: sentence.end,
            offset_milliseconds: (sentence.start * 1000.0).round() as i64,
            end_offset_milliseconds: (sentence.end * 1000.0).round() as i64,
        }
    }
}

/// A whole transcript, as sent in `existing` and `complete` frames.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptPayload {
    pub sentences: Vec<Sentence>,
    pub full_text: String,
}

impl From<&TranscriptBundle> for TranscriptPayload {
    fn from(bundle: &TranscriptBundle) -> Self {
        Self {
            sentences: bundle.sentences.clone(),
            full_text: bundle.full_text.clone(),
        }
    }
}

/// First frame the browser sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMessage {
    pub action: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub episode_id: Option<String>,
    #[serde(default)]
    pub rss_url: Option<String>,
    #[serde(default)]
    pub force: bool,
}

/// Connection parameters. `user_id` stands in for the caller identity the
/// surrounding application resolves from its own authentication.
#[derive(Debug, Deserialize)]
pub struct TranscribeParams {
    pub user_id: String,
}

/// A validated start request.
struct StartRequest {
    audio_url: String,
    episode_id: String,
    rss_url: Option<String>,
    force: bool,
}

/// Frames queued for the single writer task.
enum Outbound {
    Event(ServerMessage),
    Close { code: u16, reason: &'static str },
}

// ============================================================================
// Handler
// ============================================================================

/// GET /transcribe
/// Upgrade to the live transcription protocol
pub async fn transcribe_ws(
    State(state): State<AppState>,
    Query(params): Query<TranscribeParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let (sender, mut receiver) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<Outbound>(64);

    // Every frame leaves through one writer task, so session callbacks and
    // the protocol driver never interleave writes.
    let writer = tokio::spawn(write_outbound(sender, out_rx));

    send_event(&out_tx, ServerMessage::Ready).await;

    let Some(start) = await_start(&mut receiver, &out_tx).await else {
        drop(out_tx);
        let _ = writer.await;
        return;
    };
    info!(
        "Live transcription for {}/{} (force: {})",
        user_id, start.episode_id, start.force
    );
    send_event(&out_tx, ServerMessage::Started).await;

    let request = SessionRequest {
        user_id: user_id.clone(),
        episode_id: start.episode_id,
        audio_url: start.audio_url,
        rss_url: start.rss_url,
        force: start.force,
    };
    let cancel = CancellationToken::new();
    let sink: Arc<dyn SessionSink> = Arc::new(ChannelSink {
        out: out_tx.clone(),
    });
    let registry = Arc::clone(&state.registry);
    let run_cancel = cancel.clone();
    let mut run =
        tokio::spawn(async move { registry.run_or_join(request, sink, run_cancel).await });

    // Watch the client while the session runs. A second start is answered
    // with an error frame but the connection stays up; a disconnect cancels
    // the in-flight work.
    let mut client_open = true;
    let outcome = loop {
        tokio::select! {
            joined = &mut run => break joined,
            frame = receiver.next(), if client_open => match frame {
                Some(Ok(Message::Text(_))) => {
                    send_event(
                        &out_tx,
                        client_error("Transcription already running on this connection"),
                    )
                    .await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    client_open = false;
                    cancel.cancel();
                }
                Some(Ok(_)) => {}
            },
        }
    };

    match outcome {
        Ok(Ok(SessionEnd::Existing(_))) => {
            send_close(&out_tx, CLOSE_NORMAL, "existing transcription").await;
        }
        Ok(Ok(SessionEnd::Completed(_))) => {
            send_close(&out_tx, CLOSE_NORMAL, "complete").await;
        }
        Ok(Err(e)) => {
            warn!("Live transcription failed for {}: {}", user_id, e);
            send_close(&out_tx, CLOSE_INTERNAL_ERROR, "transcription failed").await;
        }
        Err(e) => {
            error!("Transcription task panicked: {}", e);
            send_event(&out_tx, ServerMessage::error("internal error")).await;
            send_close(&out_tx, CLOSE_INTERNAL_ERROR, "transcription failed").await;
        }
    }

    drop(out_tx);
    let _ = writer.await;
}

/// Wait for the opening `start` frame, answering protocol violations with
/// an error frame and the matching close code. `None` means the connection
/// is done without a session.
async fn await_start(
    receiver: &mut SplitStream<WebSocket>,
    out: &mpsc::Sender<Outbound>,
) -> Option<StartRequest> {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let message: StartMessage = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        send_event(out, client_error(format!("Invalid JSON: {}", e))).await;
                        send_close(out, CLOSE_UNSUPPORTED_DATA, "expected JSON text frames").await;
                        return None;
                    }
                };
                if message.action != "start" {
                    send_event(
                        out,
                        client_error(format!("Unknown action {:?}", message.action)),
                    )
                    .await;
                    send_close(out, CLOSE_POLICY_VIOLATION, "expected a start request").await;
                    return None;
                }
                let audio_url = message.audio_url.filter(|s| !s.trim().is_empty());
                let episode_id = message.episode_id.filter(|s| !s.trim().is_empty());
                let (Some(audio_url), Some(episode_id)) = (audio_url, episode_id) else {
                    send_event(out, client_error("audioUrl and episodeId are required")).await;
                    send_close(out, CLOSE_POLICY_VIOLATION, "missing start parameters").await;
                    return None;
                };
                return Some(StartRequest {
                    audio_url,
                    episode_id,
                    rss_url: message.rss_url,
                    force: message.force,
                });
            }
            Ok(Message::Binary(_)) => {
                send_event(out, client_error("Binary frames are not supported")).await;
                send_close(out, CLOSE_UNSUPPORTED_DATA, "expected JSON text frames").await;
                return None;
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

/// Single writer for one client socket. Exits after a close frame or once
/// every sender is gone.
async fn write_outbound(mut sender: SplitSink<WebSocket, Message>, mut out_rx: mpsc::Receiver<Outbound>) {
    while let Some(outbound) = out_rx.recv().await {
        match outbound {
            Outbound::Event(message) => {
                let payload = match serde_json::to_string(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Could not encode server frame: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            Outbound::Close { code, reason } => {
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: Cow::Borrowed(reason),
                    })))
                    .await;
                break;
            }
        }
    }
}

async fn send_event(out: &mpsc::Sender<Outbound>, message: ServerMessage) {
    // A closed channel just means the client is already gone.
    let _ = out.send(Outbound::Event(message)).await;
}

async fn send_close(out: &mpsc::Sender<Outbound>, code: u16, reason: &'static str) {
    let _ = out.send(Outbound::Close { code, reason }).await;
}

/// Frames a protocol violation as `TranscribeError::ClientProtocol`, so the
/// wording matches what the REST surface maps to 400.
fn client_error(detail: impl Into<String>) -> ServerMessage {
    ServerMessage::error(TranscribeError::ClientProtocol(detail.into()).to_string())
}

/// Bridges session events onto the outbound frame queue.
struct ChannelSink {
    out: mpsc::Sender<Outbound>,
}

#[async_trait::async_trait]
impl SessionSink for ChannelSink {
    async fn on_existing(&self, transcript: &TranscriptBundle) {
        send_event(&self.out, ServerMessage::existing(transcript)).await;
    }

    async fn on_sentence(&self, index: usize, sentence: &Sentence) {
        send_event(&self.out, ServerMessage::sentence(index, sentence)).await;
    }

    async fn on_complete(&self, transcript: &TranscriptBundle) {
        send_event(&self.out, ServerMessage::complete(transcript)).await;
    }

    async fn on_error(&self, error: &TranscribeError) {
        send_event(&self.out, ServerMessage::error(error.to_string())).await;
    }
}
