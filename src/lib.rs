pub mod asr;
pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod store;
pub mod transcript;

pub use asr::{AsrBridge, AsrConfig};
pub use audio::{AudioByteStream, AudioFetcher};
pub use config::Config;
pub use error::{TranscribeError, TranscribeResult};
pub use http::{create_router, AppState};
pub use session::{
    NullSink, SessionEnd, SessionRegistry, SessionRequest, SessionSink, TranscriptBundle,
    TranscriptionSession,
};
pub use store::{TranscriptionRecord, TranscriptionStatus, TranscriptionStore};
pub use transcript::{Sentence, SentenceAggregator, TranscriptFragment};
