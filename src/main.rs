use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lingopod_transcribe::{
    create_router, AppState, AsrBridge, AudioFetcher, Config, SessionRegistry,
    TranscriptionSession, TranscriptionStore,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Streaming transcription service for podcast episodes
#[derive(Debug, Parser)]
#[command(name = "lingopod-transcribe", version)]
struct Args {
    /// Config file (without extension)
    #[arg(long, default_value = "config/lingopod-transcribe")]
    config: String,

    /// Override the configured HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config))?;
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }
    if let Ok(key) = std::env::var("LINGOPOD_ASR_API_KEY") {
        cfg.asr.api_key = Some(key);
    }

    info!("{} starting", cfg.service.name);

    let store = TranscriptionStore::open(&cfg.store.path).await?;
    let fetcher = AudioFetcher::new()?;
    let bridge = AsrBridge::new(cfg.asr.clone(), fetcher);
    let session = TranscriptionSession::new(store.clone(), bridge);
    let registry = Arc::new(SessionRegistry::new(session));
    let app = create_router(AppState::new(registry, store));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down (Ctrl+C received)");
        }
    }

    Ok(())
}
