// Shared test fixtures: an HTTP server for episode audio, a scripted
// stand-in for the speech vendor's WebSocket API, and wiring helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{routing::get, Router};
use futures::{SinkExt, StreamExt};
use lingopod_transcribe::{
    create_router, AppState, AsrBridge, AsrConfig, AudioFetcher, Sentence, SessionRegistry,
    SessionRequest, TranscriptionSession, TranscriptionStore,
};
use serde_json::json;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Bytes served as the fake episode audio.
pub const EPISODE_AUDIO: &[u8] = b"not really mp3, but plenty of bytes for a test stream";

/// Fragments every completing vendor script sends, in order.
pub const VENDOR_FRAGMENTS: [(&str, f64, f64); 3] = [
    ("Hello", 0.0, 0.4),
    (" world.", 0.4, 1.2),
    ("tail without terminator", 2.0, 3.0),
];

/// Serve `EPISODE_AUDIO` at `<base>/episode.mp3`. Returns the base URL.
pub async fn spawn_audio_server() -> Result<String> {
    let app = Router::new().route("/episode.mp3", get(|| async { EPISODE_AUDIO }));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{}", addr))
}

/// How the scripted vendor behaves once a session has streamed its audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorScript {
    /// Send `VENDOR_FRAGMENTS`, then EndOfTranscript.
    Complete,
    /// Same as `Complete` after a delay, holding sessions open long enough
    /// to join or cancel them.
    SlowComplete,
    /// Send an Error frame instead of any transcript.
    ErrorAfterStart,
    /// Drop the connection without an EndOfTranscript.
    CloseEarly,
}

/// Start a scripted vendor. Returns the ws:// URL and a counter of
/// accepted connections.
pub async fn spawn_vendor_server(script: VendorScript) -> Result<(String, Arc<AtomicUsize>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    let _ = vendor_session(ws, script).await;
                }
            });
        }
    });
    Ok((format!("ws://{}", addr), connections))
}

async fn vendor_session(ws: WebSocketStream<TcpStream>, script: VendorScript) -> Result<()> {
    let (mut write, mut read) = ws.split();

    // A session must open with StartRecognition.
    let Some(Ok(Message::Text(text))) = read.next().await else {
        anyhow::bail!("expected a StartRecognition frame");
    };
    let start: serde_json::Value = serde_json::from_str(text.as_ref())?;
    assert_eq!(start["message"], "StartRecognition");
    assert_eq!(start["audio_format"]["type"], "file");
    assert_eq!(start["transcription_config"]["punctuation"]["enabled"], true);

    // Consume binary audio until EndOfStream arrives.
    let mut chunks: u64 = 0;
    loop {
        match read.next().await {
            Some(Ok(Message::Binary(_))) => chunks += 1,
            Some(Ok(Message::Text(text))) => {
                let control: serde_json::Value = serde_json::from_str(text.as_ref())?;
                assert_eq!(control["message"], "EndOfStream");
                break;
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return Ok(()),
            Some(Ok(_)) => {}
        }
    }
    assert!(chunks > 0, "no audio was streamed before EndOfStream");

    match script {
        VendorScript::Complete | VendorScript::SlowComplete => {
            if script == VendorScript::SlowComplete {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            for (text, start_time, end_time) in VENDOR_FRAGMENTS {
                let frame = json!({
                    "message": "AddTranscript",
                    "metadata": {
                        "transcript": text,
                        "is_final": true,
                        "start_time": start_time,
                        "end_time": end_time,
                    }
                });
                write.send(Message::Text(frame.to_string().into())).await?;
            }
            write
                .send(Message::Text(
                    json!({ "message": "EndOfTranscript" }).to_string().into(),
                ))
                .await?;
        }
        VendorScript::ErrorAfterStart => {
            write
                .send(Message::Text(
                    json!({ "message": "Error", "reason": "quota exhausted" })
                        .to_string()
                        .into(),
                ))
                .await?;
        }
        VendorScript::CloseEarly => {
            write.send(Message::Close(None)).await?;
        }
    }

    Ok(())
}

/// Open a store in its own temporary directory.
pub async fn temp_store() -> Result<(TempDir, TranscriptionStore)> {
    let dir = TempDir::new()?;
    let store = TranscriptionStore::open(dir.path().join("transcriptions.db")).await?;
    Ok((dir, store))
}

/// Wire a session against a scripted vendor endpoint.
pub fn test_session(endpoint: &str, store: TranscriptionStore) -> Result<TranscriptionSession> {
    let config = AsrConfig {
        endpoint: endpoint.to_string(),
        api_key: Some("test-key".to_string()),
        language: "en".to_string(),
        operating_point: "enhanced".to_string(),
    };
    let fetcher = AudioFetcher::new()?;
    Ok(TranscriptionSession::new(store, AsrBridge::new(config, fetcher)))
}

/// Start the full HTTP/WebSocket app wired to a scripted vendor.
/// Returns the bound address ("127.0.0.1:port").
pub async fn spawn_gateway(vendor_url: &str, store: TranscriptionStore) -> Result<String> {
    let session = test_session(vendor_url, store.clone())?;
    let registry = Arc::new(SessionRegistry::new(session));
    let app = create_router(AppState::new(registry, store));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr.to_string())
}

pub fn request(user_id: &str, episode_id: &str, audio_url: &str, force: bool) -> SessionRequest {
    SessionRequest {
        user_id: user_id.to_string(),
        episode_id: episode_id.to_string(),
        audio_url: audio_url.to_string(),
        rss_url: None,
        force,
    }
}

pub fn sentence(text: &str, start: f64, end: f64) -> Sentence {
    Sentence {
        start,
        end,
        text: text.to_string(),
        speaker: None,
    }
}
