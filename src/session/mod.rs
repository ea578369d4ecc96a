//! Transcription session orchestration.
//!
//! A session runs one (user, episode) transcription end to end: the
//! idempotency shortcut, the recognizer bridge, sentence aggregation, and
//! incremental persistence. The registry on top deduplicates concurrent
//! runs for the same key.

mod registry;
mod session;
mod sink;

pub use registry::SessionRegistry;
pub use session::{SessionEnd, SessionRequest, TranscriptBundle, TranscriptionSession};
pub use sink::{NullSink, SessionSink};
