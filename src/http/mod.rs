//! HTTP and WebSocket surface of the transcription service
//!
//! Routes:
//! - GET /transcribe - WebSocket, live transcription protocol
//! - POST /transcriptions - Run a transcription, respond when finished
//! - GET /transcriptions/:user_id/:episode_id - Stored transcription record
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;
mod ws;

pub use routes::create_router;
pub use state::AppState;
pub use ws::{SentencePayload, ServerMessage, StartMessage, TranscriptPayload};
