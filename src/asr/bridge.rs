use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::asr::protocol::{AsrEnvelope, EndOfStream, StartRecognition};
use crate::asr::AsrConfig;
use crate::audio::AudioFetcher;
use crate::error::{TranscribeError, TranscribeResult};
use crate::transcript::TranscriptFragment;

/// How long to wait for the vendor socket to come up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Streams one episode's audio to the speech vendor and forwards the
/// transcript fragments it sends back.
///
/// One `run` call is one recognition session: connect, send
/// `StartRecognition`, pump audio bytes up while reading fragments down,
/// and finish when the vendor reports `EndOfTranscript`. The vendor socket
/// closing before that point is an error.
#[derive(Debug, Clone)]
pub struct AsrBridge {
    config: AsrConfig,
    fetcher: AudioFetcher,
}

impl AsrBridge {
    pub fn new(config: AsrConfig, fetcher: AudioFetcher) -> Self {
        Self { config, fetcher }
    }

    pub async fn run(
        &self,
        audio_url: &str,
        fragments: mpsc::Sender<TranscriptFragment>,
        cancel: CancellationToken,
    ) -> TranscribeResult<()> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| TranscribeError::Configuration("ASR API key is not set".to_string()))?;

        let mut request = self
            .config
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| {
                TranscribeError::Configuration(format!(
                    "Invalid ASR endpoint {}: {}",
                    self.config.endpoint, e
                ))
            })?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
            TranscribeError::Configuration(format!("API key is not header-safe: {}", e))
        })?;
        request.headers_mut().insert("Authorization", bearer);

        let (stream, _) = timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| {
                TranscribeError::UpstreamProtocol(format!(
                    "Timed out connecting to {}",
                    self.config.endpoint
                ))
            })?
            .map_err(|e| {
                TranscribeError::UpstreamProtocol(format!(
                    "Failed to connect to {}: {}",
                    self.config.endpoint, e
                ))
            })?;
        info!("Connected to ASR endpoint {}", self.config.endpoint);

        let (mut write, mut read) = stream.split();

        let start = serde_json::to_string(&StartRecognition::new(&self.config)).map_err(|e| {
            TranscribeError::UpstreamProtocol(format!("Encoding StartRecognition: {}", e))
        })?;
        write.send(Message::Text(start.into())).await.map_err(|e| {
            TranscribeError::UpstreamProtocol(format!("Sending StartRecognition: {}", e))
        })?;

        // Upload runs concurrently with the read loop; on upload failure the
        // socket is closed so the read side unblocks promptly.
        let fetcher = self.fetcher.clone();
        let target = audio_url.to_string();
        let pump_cancel = cancel.child_token();
        let mut pump = tokio::spawn(async move {
            let result = Self::stream_audio(&fetcher, &target, &mut write, &pump_cancel).await;
            if result.is_err() {
                let _ = write.send(Message::Close(None)).await;
            }
            result
        });

        let mut pump_outcome: Option<TranscribeResult<()>> = None;
        let read_result: TranscribeResult<()> = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break Err(TranscribeError::Cancelled("transcription stopped".to_string()));
                }
                joined = &mut pump, if pump_outcome.is_none() => {
                    let result = match joined {
                        Ok(result) => result,
                        Err(e) => Err(TranscribeError::UpstreamProtocol(format!(
                            "Audio pump task panicked: {}",
                            e
                        ))),
                    };
                    // The handle is spent; remember the outcome so it is
                    // never polled again.
                    pump_outcome = Some(result.clone());
                    if let Err(e) = result {
                        break Err(e);
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let envelope = match parse_envelope(text.as_ref()) {
                            Ok(envelope) => envelope,
                            Err(e) => break Err(e),
                        };
                        match envelope.message.as_str() {
                            "AddTranscript" => {
                                let Some(metadata) = envelope.metadata else {
                                    break Err(TranscribeError::UpstreamProtocol(
                                        "AddTranscript frame without metadata".to_string(),
                                    ));
                                };
                                if fragments.send(metadata.into()).await.is_err() {
                                    break Err(TranscribeError::Cancelled(
                                        "fragment consumer dropped".to_string(),
                                    ));
                                }
                            }
                            "EndOfTranscript" => break Ok(()),
                            "Error" => {
                                let reason =
                                    envelope.reason.unwrap_or_else(|| "unspecified".to_string());
                                break Err(TranscribeError::UpstreamProtocol(format!(
                                    "ASR error: {}",
                                    reason
                                )));
                            }
                            other => debug!("Ignoring ASR message type {}", other),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => break Err(close_before_completion(frame)),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        break Err(TranscribeError::UpstreamProtocol(format!(
                            "ASR socket error: {}",
                            e
                        )));
                    }
                    None => {
                        break Err(TranscribeError::UpstreamProtocol(
                            "ASR socket closed before completion".to_string(),
                        ));
                    }
                },
            }
        };

        let pump_result = match pump_outcome {
            Some(result) => result,
            None => {
                pump.abort();
                match pump.await {
                    Ok(result) => result,
                    // Aborted by us; nothing further to report.
                    Err(_) => Ok(()),
                }
            }
        };

        // An upload failure usually surfaces on the read side as an abrupt
        // close; report the root cause instead of the symptom.
        match read_result {
            Ok(()) => Ok(()),
            Err(e @ TranscribeError::Cancelled(_)) => Err(e),
            Err(read_error) => match pump_result {
                Err(pump_error) if !matches!(pump_error, TranscribeError::Cancelled(_)) => {
                    Err(pump_error)
                }
                _ => Err(read_error),
            },
        }
    }

    async fn stream_audio(
        fetcher: &AudioFetcher,
        audio_url: &str,
        write: &mut WsSink,
        cancel: &CancellationToken,
    ) -> TranscribeResult<()> {
        let mut audio = fetcher.open(audio_url).await?;
        let mut sent: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(TranscribeError::Cancelled("audio upload stopped".to_string()));
                }
                chunk = audio.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    write.send(Message::Binary(bytes.into())).await.map_err(|e| {
                        TranscribeError::UpstreamProtocol(format!("Sending audio chunk: {}", e))
                    })?;
                    sent += 1;
                }
                Some(Err(e)) => {
                    return Err(TranscribeError::AudioFetch(format!(
                        "Reading audio stream from {}: {}",
                        audio_url, e
                    )));
                }
                None => break,
            }
        }

        let end = serde_json::to_string(&EndOfStream::new(sent)).map_err(|e| {
            TranscribeError::UpstreamProtocol(format!("Encoding EndOfStream: {}", e))
        })?;
        write.send(Message::Text(end.into())).await.map_err(|e| {
            TranscribeError::UpstreamProtocol(format!("Sending EndOfStream: {}", e))
        })?;
        info!("Audio upload complete ({} chunks) for {}", sent, audio_url);
        Ok(())
    }
}

fn parse_envelope(text: &str) -> TranscribeResult<AsrEnvelope> {
    serde_json::from_str(text).map_err(|e| {
        let preview: String = text.chars().take(200).collect();
        TranscribeError::UpstreamProtocol(format!("Unparseable ASR frame ({}): {}", e, preview))
    })
}

fn close_before_completion(frame: Option<CloseFrame<'_>>) -> TranscribeError {
    match frame {
        Some(frame) => TranscribeError::UpstreamProtocol(format!(
            "ASR socket closed before completion (code: {}, reason: {})",
            frame.code, frame.reason
        )),
        None => {
            TranscribeError::UpstreamProtocol("ASR socket closed before completion".to_string())
        }
    }
}
