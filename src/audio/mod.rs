//! Episode audio retrieval.

mod fetch;

pub use fetch::{AudioByteStream, AudioFetcher};
