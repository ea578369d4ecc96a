// End-to-end tests for the browser-facing gateway
//
// These start the full HTTP/WebSocket app against a scripted vendor and a
// local audio server, then speak the same protocol a browser would.

mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use lingopod_transcribe::TranscriptionStatus;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use support::{spawn_audio_server, spawn_gateway, spawn_vendor_server, temp_store, VendorScript};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: &str, user_id: &str) -> Result<Client> {
    let (ws, _) = tokio_tungstenite::connect_async(format!(
        "ws://{}/transcribe?user_id={}",
        addr, user_id
    ))
    .await?;
    Ok(ws)
}

async fn send_json(ws: &mut Client, value: Value) -> Result<()> {
    ws.send(Message::Text(value.to_string().into())).await?;
    Ok(())
}

/// Read frames until the next JSON event.
async fn next_event(ws: &mut Client) -> Result<Value> {
    while let Some(frame) = ws.next().await {
        match frame? {
            Message::Text(text) => return Ok(serde_json::from_str(text.as_ref())?),
            Message::Close(frame) => anyhow::bail!("closed before an event: {:?}", frame),
            _ => {}
        }
    }
    anyhow::bail!("socket ended without an event")
}

/// Read frames until the server's close frame.
async fn next_close(ws: &mut Client) -> Result<(u16, String)> {
    while let Some(frame) = ws.next().await {
        match frame? {
            Message::Close(Some(frame)) => {
                return Ok((u16::from(frame.code), frame.reason.to_string()))
            }
            Message::Close(None) => anyhow::bail!("close frame carried no code"),
            Message::Text(text) => anyhow::bail!("unexpected event before close: {}", text),
            _ => {}
        }
    }
    anyhow::bail!("socket ended without a close frame")
}

fn start_frame(audio_url: &str, episode_id: &str) -> Value {
    json!({"action": "start", "audioUrl": audio_url, "episodeId": episode_id})
}

#[tokio::test]
async fn test_live_transcription_happy_path() -> Result<()> {
    let audio_base = spawn_audio_server().await?;
    let (vendor_url, _connections) = spawn_vendor_server(VendorScript::Complete).await?;
    let (_dir, store) = temp_store().await?;
    let gateway = spawn_gateway(&vendor_url, store).await?;

    let mut ws = connect(&gateway, "alice").await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "ready"}));

    send_json(
        &mut ws,
        start_frame(&format!("{}/episode.mp3", audio_base), "ep-1"),
    )
    .await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "started"}));

    let first = next_event(&mut ws).await?;
    assert_eq!(first["type"], "sentence");
    assert_eq!(first["data"]["index"], 0);
    assert_eq!(first["data"]["text"], "Hello world.");
    assert_eq!(first["data"]["offsetMilliseconds"], 0);
    assert_eq!(first["data"]["endOffsetMilliseconds"], 1200);

    let second = next_event(&mut ws).await?;
    assert_eq!(second["data"]["index"], 1);
    assert_eq!(second["data"]["text"], "tail without terminator");

    let complete = next_event(&mut ws).await?;
    assert_eq!(complete["type"], "complete");
    assert_eq!(
        complete["data"]["fullText"],
        "Hello world. tail without terminator"
    );
    assert_eq!(complete["data"]["sentences"].as_array().map(Vec::len), Some(2));

    let (code, reason) = next_close(&mut ws).await?;
    assert_eq!(code, 1000);
    assert_eq!(reason, "complete");

    Ok(())
}

#[tokio::test]
async fn test_existing_transcript_over_websocket() -> Result<()> {
    let audio_base = spawn_audio_server().await?;
    let (vendor_url, connections) = spawn_vendor_server(VendorScript::Complete).await?;
    let (_dir, store) = temp_store().await?;
    let gateway = spawn_gateway(&vendor_url, store).await?;
    let audio_url = format!("{}/episode.mp3", audio_base);

    // Setup: transcribe once over the REST surface.
    let response = reqwest::Client::new()
        .post(format!("http://{}/transcriptions", gateway))
        .json(&json!({"userId": "alice", "episodeId": "ep-1", "audioUrl": audio_url}))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "done");
    assert_eq!(
        body["data"]["fullText"],
        "Hello world. tail without terminator"
    );

    // A websocket start for the same episode returns the stored result.
    let mut ws = connect(&gateway, "alice").await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "ready"}));
    send_json(&mut ws, start_frame(&audio_url, "ep-1")).await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "started"}));

    let existing = next_event(&mut ws).await?;
    assert_eq!(existing["type"], "existing");
    assert_eq!(
        existing["data"]["fullText"],
        "Hello world. tail without terminator"
    );

    let (code, reason) = next_close(&mut ws).await?;
    assert_eq!(code, 1000);
    assert_eq!(reason, "existing transcription");
    assert_eq!(connections.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_rest_record_lookup() -> Result<()> {
    let audio_base = spawn_audio_server().await?;
    let (vendor_url, _connections) = spawn_vendor_server(VendorScript::Complete).await?;
    let (_dir, store) = temp_store().await?;
    let gateway = spawn_gateway(&vendor_url, store).await?;
    let client = reqwest::Client::new();

    let health = client.get(format!("http://{}/health", gateway)).send().await?;
    assert_eq!(health.status(), 200);

    // Nothing stored yet.
    let missing = client
        .get(format!("http://{}/transcriptions/alice/ep-1", gateway))
        .send()
        .await?;
    assert_eq!(missing.status(), 404);

    let started = client
        .post(format!("http://{}/transcriptions", gateway))
        .json(&json!({
            "userId": "alice",
            "episodeId": "ep-1",
            "audioUrl": format!("{}/episode.mp3", audio_base),
        }))
        .send()
        .await?;
    assert_eq!(started.status(), 200);

    let found = client
        .get(format!("http://{}/transcriptions/alice/ep-1", gateway))
        .send()
        .await?;
    assert_eq!(found.status(), 200);
    let record: Value = found.json().await?;
    assert_eq!(record["userId"], "alice");
    assert_eq!(record["episodeId"], "ep-1");
    assert_eq!(record["status"], "done");
    assert_eq!(record["resultText"], "Hello world. tail without terminator");
    assert_eq!(record["sentences"].as_array().map(Vec::len), Some(2));
    assert!(record["createdAt"].is_string());

    Ok(())
}

#[tokio::test]
async fn test_invalid_json_closes_1003() -> Result<()> {
    let (vendor_url, _connections) = spawn_vendor_server(VendorScript::Complete).await?;
    let (_dir, store) = temp_store().await?;
    let gateway = spawn_gateway(&vendor_url, store).await?;

    let mut ws = connect(&gateway, "alice").await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "ready"}));

    ws.send(Message::Text("definitely not json".into())).await?;

    let error = next_event(&mut ws).await?;
    assert_eq!(error["type"], "error");
    assert!(error["message"]
        .as_str()
        .unwrap_or_default()
        .starts_with("Client protocol error"));
    let (code, _reason) = next_close(&mut ws).await?;
    assert_eq!(code, 1003);

    Ok(())
}

#[tokio::test]
async fn test_binary_first_frame_closes_1003() -> Result<()> {
    let (vendor_url, _connections) = spawn_vendor_server(VendorScript::Complete).await?;
    let (_dir, store) = temp_store().await?;
    let gateway = spawn_gateway(&vendor_url, store).await?;

    let mut ws = connect(&gateway, "alice").await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "ready"}));

    ws.send(Message::Binary(vec![1, 2, 3].into())).await?;

    let error = next_event(&mut ws).await?;
    assert_eq!(error["type"], "error");
    let (code, _reason) = next_close(&mut ws).await?;
    assert_eq!(code, 1003);

    Ok(())
}

#[tokio::test]
async fn test_missing_start_parameters_close_1008() -> Result<()> {
    let (vendor_url, _connections) = spawn_vendor_server(VendorScript::Complete).await?;
    let (_dir, store) = temp_store().await?;
    let gateway = spawn_gateway(&vendor_url, store).await?;

    let mut ws = connect(&gateway, "alice").await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "ready"}));

    send_json(&mut ws, json!({"action": "start"})).await?;

    let error = next_event(&mut ws).await?;
    assert_eq!(error["type"], "error");
    let message = error["message"].as_str().unwrap_or_default();
    assert!(message.starts_with("Client protocol error"));
    assert!(message.contains("required"));
    let (code, _reason) = next_close(&mut ws).await?;
    assert_eq!(code, 1008);

    Ok(())
}

#[tokio::test]
async fn test_unknown_action_closes_1008() -> Result<()> {
    let (vendor_url, _connections) = spawn_vendor_server(VendorScript::Complete).await?;
    let (_dir, store) = temp_store().await?;
    let gateway = spawn_gateway(&vendor_url, store).await?;

    let mut ws = connect(&gateway, "alice").await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "ready"}));

    send_json(
        &mut ws,
        json!({"action": "stop", "audioUrl": "x", "episodeId": "y"}),
    )
    .await?;

    let error = next_event(&mut ws).await?;
    assert_eq!(error["type"], "error");
    let (code, _reason) = next_close(&mut ws).await?;
    assert_eq!(code, 1008);

    Ok(())
}

#[tokio::test]
async fn test_missing_audio_reports_error_and_closes_1011() -> Result<()> {
    let audio_base = spawn_audio_server().await?;
    let (vendor_url, _connections) = spawn_vendor_server(VendorScript::Complete).await?;
    let (_dir, store) = temp_store().await?;
    let gateway = spawn_gateway(&vendor_url, store.clone()).await?;

    let mut ws = connect(&gateway, "alice").await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "ready"}));

    send_json(
        &mut ws,
        start_frame(&format!("{}/missing.mp3", audio_base), "ep-1"),
    )
    .await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "started"}));

    // Exactly one error frame, then the server-error close.
    let error = next_event(&mut ws).await?;
    assert_eq!(error["type"], "error");
    assert!(error["message"]
        .as_str()
        .unwrap_or_default()
        .contains("Audio fetch error"));
    let (code, _reason) = next_close(&mut ws).await?;
    assert_eq!(code, 1011);

    let record = store.find("alice", "ep-1").await?.expect("row exists");
    assert_eq!(record.status, TranscriptionStatus::Error);

    Ok(())
}

#[tokio::test]
async fn test_second_start_is_rejected_without_closing() -> Result<()> {
    let audio_base = spawn_audio_server().await?;
    let (vendor_url, _connections) = spawn_vendor_server(VendorScript::SlowComplete).await?;
    let (_dir, store) = temp_store().await?;
    let gateway = spawn_gateway(&vendor_url, store).await?;
    let audio_url = format!("{}/episode.mp3", audio_base);

    let mut ws = connect(&gateway, "alice").await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "ready"}));
    send_json(&mut ws, start_frame(&audio_url, "ep-1")).await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "started"}));

    // A second start is answered with an error frame only.
    send_json(&mut ws, start_frame(&audio_url, "ep-2")).await?;
    let rejection = next_event(&mut ws).await?;
    assert_eq!(rejection["type"], "error");
    let message = rejection["message"].as_str().unwrap_or_default();
    assert!(message.starts_with("Client protocol error"));
    assert!(message.contains("already running"));

    // The first session is unaffected and still completes normally.
    loop {
        let event = next_event(&mut ws).await?;
        if event["type"] == "complete" {
            break;
        }
        assert_eq!(event["type"], "sentence");
    }
    let (code, _reason) = next_close(&mut ws).await?;
    assert_eq!(code, 1000);

    Ok(())
}

#[tokio::test]
async fn test_client_disconnect_cancels_the_run() -> Result<()> {
    let audio_base = spawn_audio_server().await?;
    let (vendor_url, _connections) = spawn_vendor_server(VendorScript::SlowComplete).await?;
    let (_dir, store) = temp_store().await?;
    let gateway = spawn_gateway(&vendor_url, store.clone()).await?;

    let mut ws = connect(&gateway, "alice").await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "ready"}));
    send_json(
        &mut ws,
        start_frame(&format!("{}/episode.mp3", audio_base), "ep-1"),
    )
    .await?;
    assert_eq!(next_event(&mut ws).await?, json!({"type": "started"}));

    // Walk away mid-run.
    ws.close(None).await?;
    drop(ws);

    // The abandoned run should be cancelled and recorded as failed.
    let mut status = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Some(record) = store.find("alice", "ep-1").await? {
            if record.status != TranscriptionStatus::Processing {
                status = Some(record.status);
                break;
            }
        }
    }
    assert_eq!(status, Some(TranscriptionStatus::Error));

    Ok(())
}
