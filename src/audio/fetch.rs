use std::time::Duration;

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use tracing::info;

use crate::error::{TranscribeError, TranscribeResult};

/// Byte stream of one episode's audio file, chunked as the server sends it.
pub type AudioByteStream = BoxStream<'static, Result<Vec<u8>, reqwest::Error>>;

/// Downloads episode audio over HTTP as a byte stream.
#[derive(Debug, Clone)]
pub struct AudioFetcher {
    client: reqwest::Client,
}

impl AudioFetcher {
    pub fn new() -> TranscribeResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TranscribeError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Open `url` for streaming. Fails on connection errors and on
    /// non-success HTTP statuses before any bytes are handed out.
    pub async fn open(&self, url: &str) -> TranscribeResult<AudioByteStream> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TranscribeError::AudioFetch(format!("GET {}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| TranscribeError::AudioFetch(format!("GET {}: {}", url, e)))?;

        match response.content_length() {
            Some(length) => info!("Fetching episode audio ({} bytes) from {}", length, url),
            None => info!("Fetching episode audio (unknown length) from {}", url),
        }

        Ok(response
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .boxed())
    }
}
