//! Client for the hosted speech recognition service.
//!
//! Audio goes up to the vendor over a WebSocket as binary frames; word
//! fragments come back as JSON text frames on the same connection.

mod bridge;
mod protocol;

pub use bridge::AsrBridge;
pub use protocol::{AsrEnvelope, EndOfStream, FragmentMetadata, StartRecognition};

use serde::Deserialize;

/// Connection settings for the speech recognition vendor.
#[derive(Debug, Clone, Deserialize)]
pub struct AsrConfig {
    /// WebSocket endpoint of the vendor streaming API
    pub endpoint: String,
    /// API key presented as a bearer token; normally injected from the
    /// environment rather than written in the config file
    #[serde(default)]
    pub api_key: Option<String>,
    /// Language tag sent with every session
    pub language: String,
    /// Vendor accuracy/latency tradeoff
    pub operating_point: String,
}
