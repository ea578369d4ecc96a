//! Persistence for in-flight and finished transcriptions.

mod record;
mod sqlite;

pub use record::{TranscriptionRecord, TranscriptionStatus};
pub use sqlite::TranscriptionStore;
