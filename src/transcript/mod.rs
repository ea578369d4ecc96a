//! Sentence assembly for streaming transcripts.
//!
//! The speech recognizer emits short fragments with per-fragment timings.
//! This module folds the final fragments into complete sentences carrying
//! episode-relative start and end times.

mod aggregator;
mod sentence;

pub use aggregator::SentenceAggregator;
pub use sentence::{Sentence, TranscriptFragment};
