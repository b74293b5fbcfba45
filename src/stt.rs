//! Speech-to-text: a provider-agnostic `SttClient` trait plus a Fireworks
//! streaming-WebSocket implementation.
//!
//! Grounded on the teacher's `FireworksSTT` (same WebSocket endpoint, query
//! parameters, and checkpoint protocol), narrowed to the contract the
//! orchestrator actually needs: a complete [`crate::buffers::Utterance`] goes
//! in, a transcript string comes out. The teacher's live `broadcast::Receiver`
//! streaming shape is dropped — by the time the orchestrator calls STT, the
//! recording machine has already finished accumulating the utterance, so
//! there is nothing left to stream incrementally.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

#[derive(Error, Debug, Clone)]
pub enum SttError {
    #[error("websocket connection failed: {0}")]
    Connection(String),
    #[error("invalid url: {0}")]
    UrlParse(String),
    #[error("no response from STT server within {0:?}")]
    Timeout(Duration),
    #[error("STT server closed the connection before a final transcript arrived")]
    ClosedEarly,
    #[error("failed to parse STT response: {0}")]
    ParseError(String),
}

#[async_trait]
pub trait SttClient: Send + Sync {
    /// Transcribe a complete utterance. `samples` are normalized float32 PCM
    /// at `sample_rate_hz`.
    async fn transcribe(&self, samples: &[f32], sample_rate_hz: u32) -> Result<String, SttError>;
}

#[derive(Debug, Clone)]
pub struct SttConfig {
    pub language: Option<String>,
    pub temperature: Option<f32>,
    pub prompt: Option<String>,
    pub server_timeout: Duration,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            language: None,
            temperature: Some(0.0),
            prompt: Some("Transcribe the following audio accurately.".to_string()),
            server_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamingResponse {
    text: Option<String>,
}

pub struct FireworksStt {
    api_key: String,
    config: SttConfig,
}

impl FireworksStt {
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, SttConfig::default())
    }

    pub fn with_config(api_key: String, config: SttConfig) -> Self {
        Self { api_key, config }
    }

    fn samples_to_pcm(samples: &[f32]) -> Vec<u8> {
        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            pcm.extend_from_slice(&value.to_le_bytes());
        }
        pcm
    }

    fn build_url(&self) -> Result<Url, SttError> {
        let mut url = Url::parse(
            "wss://audio-streaming.us-virginia-1.direct.fireworks.ai/v1/audio/transcriptions/streaming",
        )
        .map_err(|e| SttError::UrlParse(e.to_string()))?;

        if let Some(language) = &self.config.language {
            url.query_pairs_mut().append_pair("language", language);
        }
        if let Some(temperature) = self.config.temperature {
            url.query_pairs_mut()
                .append_pair("temperature", &temperature.to_string());
        }
        if let Some(prompt) = &self.config.prompt {
            url.query_pairs_mut().append_pair("prompt", prompt);
        }
        url.query_pairs_mut()
            .append_pair("response_format", "verbose_json");
        url.query_pairs_mut()
            .append_pair("Authorization", &self.api_key);
        Ok(url)
    }
}

#[async_trait]
impl SttClient for FireworksStt {
    async fn transcribe(&self, samples: &[f32], _sample_rate_hz: u32) -> Result<String, SttError> {
        let url = self.build_url()?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SttError::Connection(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let pcm = Self::samples_to_pcm(samples);
        log::debug!("stt: sending {} bytes of audio", pcm.len());
        write
            .send(Message::Binary(pcm.into()))
            .await
            .map_err(|e| SttError::Connection(e.to_string()))?;

        let checkpoint = serde_json::json!({"checkpoint_id": "final"});
        write
            .send(Message::Text(checkpoint.to_string().into()))
            .await
            .map_err(|e| SttError::Connection(e.to_string()))?;

        let mut transcript = String::new();
        let deadline = Instant::now() + self.config.server_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SttError::Timeout(self.config.server_timeout));
            }

            let next = tokio::time::timeout(remaining, read.next()).await;
            let Ok(Some(msg_result)) = next else {
                return Err(SttError::Timeout(self.config.server_timeout));
            };

            match msg_result {
                Ok(Message::Text(text)) => {
                    let parsed: serde_json::Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if parsed.get("checkpoint_id").and_then(|v| v.as_str()) == Some("final") {
                        let _ = write.close().await;
                        return Ok(transcript);
                    }
                    if let Ok(response) = serde_json::from_value::<StreamingResponse>(parsed) {
                        if let Some(text) = response.text {
                            if !text.is_empty() {
                                transcript = text;
                            }
                        }
                    }
                }
                Ok(Message::Close(_)) => return Err(SttError::ClosedEarly),
                Ok(_) => continue,
                Err(e) => return Err(SttError::Connection(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_to_pcm_produces_two_bytes_per_sample() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.0];
        let pcm = FireworksStt::samples_to_pcm(&samples);
        assert_eq!(pcm.len(), samples.len() * 2);
    }

    #[test]
    fn samples_to_pcm_clamps_out_of_range_input() {
        let pcm = FireworksStt::samples_to_pcm(&[2.0, -2.0]);
        let first = i16::from_le_bytes([pcm[0], pcm[1]]);
        let second = i16::from_le_bytes([pcm[2], pcm[3]]);
        assert_eq!(first, i16::MAX);
        assert_eq!(second, -i16::MAX);
    }

    #[test]
    fn build_url_includes_auth_and_defaults() {
        let stt = FireworksStt::new("secret-key".to_string());
        let url = stt.build_url().unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(pairs.contains(&("Authorization".to_string(), "secret-key".to_string())));
        assert!(pairs.iter().any(|(k, _)| k == "response_format"));
    }

    #[test]
    fn default_config_matches_teacher_defaults() {
        let config = SttConfig::default();
        assert_eq!(config.temperature, Some(0.0));
        assert_eq!(config.server_timeout, Duration::from_secs(30));
    }
}
