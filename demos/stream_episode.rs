// Live Transcription Example: stream an episode through the gateway
//
// This example exercises the pipeline from the browser's point of view:
// 1. Open the gateway WebSocket with a user id
// 2. Send the start request for an episode audio URL
// 3. Print sentences as they are finalized
// 4. Exit on the terminal event (existing/complete/error)
//
// Prerequisites:
// - The service running: cargo run (ASR key in LINGOPOD_ASR_API_KEY)
//
// Usage: cargo run --example stream_episode -- <user_id> <episode_id> <audio_url>

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let (Some(user_id), Some(episode_id), Some(audio_url)) =
        (args.next(), args.next(), args.next())
    else {
        bail!("usage: stream_episode <user_id> <episode_id> <audio_url>");
    };

    // 1. Connect to the gateway
    let url = format!("ws://127.0.0.1:8080/transcribe?user_id={}", user_id);
    let (stream, _) = connect_async(&url)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;
    let (mut write, mut read) = stream.split();
    info!("🎧 Connected to {}", url);

    // 2. Send the start request
    let start = serde_json::json!({
        "action": "start",
        "audioUrl": audio_url,
        "episodeId": episode_id,
    });
    write.send(Message::Text(start.to_string().into())).await?;

    // 3. Print protocol events until the server closes the stream
    while let Some(frame) = read.next().await {
        match frame? {
            Message::Text(text) => {
                let event: serde_json::Value = serde_json::from_str(text.as_ref())?;
                match event["type"].as_str().unwrap_or("") {
                    "ready" => info!("✅ Gateway ready"),
                    "started" => info!("🎤 Transcription started"),
                    "sentence" => {
                        let data = &event["data"];
                        info!(
                            "📝 #{} [{}ms] {}",
                            data["index"],
                            data["offsetMilliseconds"],
                            data["text"].as_str().unwrap_or("")
                        );
                    }
                    "existing" => {
                        info!("📚 Transcript already stored:");
                        info!("{}", event["data"]["fullText"].as_str().unwrap_or(""));
                    }
                    "complete" => {
                        info!("🏁 Transcription complete:");
                        info!("{}", event["data"]["fullText"].as_str().unwrap_or(""));
                    }
                    "error" => info!("❌ Error: {}", event["message"]),
                    other => info!("❓ Unknown event type {:?}", other),
                }
            }
            Message::Close(frame) => {
                match frame {
                    Some(frame) => {
                        info!("⏹️  Closed (code: {}, reason: {})", frame.code, frame.reason)
                    }
                    None => info!("⏹️  Closed"),
                }
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
