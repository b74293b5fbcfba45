//! Text-to-speech: a provider-agnostic `TtsClient` trait plus an ElevenLabs
//! streaming-WebSocket implementation, covering both one-shot synthesis and
//! the debounced token-at-a-time streaming mode the orchestrator uses when
//! the backend supports it (§4.6, §4.10's `isStreamingEnabled`).
//!
//! Grounded on the teacher's `ElevenLabsTTS` (same WebSocket endpoint,
//! BOS/text/EOS message shape, base64 audio chunk decoding), reshaped so
//! synthesis returns PCM samples rather than writing straight to a sink —
//! playback is the caller's job via [`crate::audio::playback::AudioSink`],
//! so the same synthesized audio can go through `play_interruptible` and
//! participate in the playback state machine.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone)]
pub enum TtsError {
    #[error("TTS API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("TTS websocket error: {0}")]
    WebSocket(String),
    #[error("TTS connection error: {0}")]
    Connection(String),
    #[error("failed to decode audio: {0}")]
    Decode(String),
    #[error("synthesis cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct TtsOptions {
    pub volume: f32,
    pub speed: f32,
}

impl Default for TtsOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            speed: 1.0,
        }
    }
}

/// A handle to an in-progress streaming synthesis session: tokens are
/// pushed in as the LLM produces them, synthesized at phrase boundaries by
/// the provider, and PCM chunks arrive on `chunks`.
pub struct StreamingTts {
    text_tx: mpsc::UnboundedSender<String>,
    pub chunks: mpsc::UnboundedReceiver<Vec<i16>>,
    cancel: CancellationToken,
}

impl StreamingTts {
    /// Push a token (or phrase fragment) produced by the LLM.
    pub fn push(&self, token: &str) {
        let _ = self.text_tx.send(token.to_string());
    }

    /// Signal no more tokens are coming; the provider flushes any buffered
    /// phrase.
    pub fn finalize(&self) {
        let _ = self.text_tx.send(String::new());
    }

    /// Abort synthesis and discard any queued chunks.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[async_trait]
pub trait TtsClient: Send + Sync {
    fn supports_streaming(&self) -> bool;

    /// Synthesize complete text to 16 kHz mono PCM in one call.
    async fn synthesize(&self, text: &str, options: TtsOptions) -> Result<Vec<i16>, TtsError>;

    /// Start a streaming session. `initial_text`, if any, is pushed before
    /// the caller starts streaming further tokens.
    async fn stream_speak(
        &self,
        initial_text: Option<&str>,
        options: TtsOptions,
    ) -> Result<StreamingTts, TtsError>;

    /// Cheap reachability check used by the startup orchestrator's
    /// concurrent provider health checks. A failure here is a warning, not
    /// a fatal startup error.
    async fn health_check(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub voice_id: String,
    pub model: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model: "eleven_multilingual_v2".to_string(),
            stability: 0.75,
            similarity_boost: 0.85,
            style: 0.35,
            use_speaker_boost: true,
        }
    }
}

pub struct ElevenLabsTts {
    api_key: String,
    config: ElevenLabsConfig,
}

impl ElevenLabsTts {
    pub fn new(api_key: String, config: ElevenLabsConfig) -> Self {
        Self { api_key, config }
    }

    fn ws_url(&self) -> String {
        format!(
            "wss://api.elevenlabs.io/v1/text-to-speech/{}/stream-input?model_id={}&output_format=pcm_16000",
            self.config.voice_id, self.config.model
        )
    }

    fn bos_message(&self, speed: f32) -> String {
        json!({
            "text": " ",
            "voice_settings": {
                "stability": self.config.stability,
                "similarity_boost": self.config.similarity_boost,
                "style": self.config.style,
                "use_speaker_boost": self.config.use_speaker_boost,
                "speed": speed,
            },
            "xi_api_key": self.api_key,
        })
        .to_string()
    }

    fn decode_audio_message(text: &str) -> Result<Option<Vec<i16>>, TtsError> {
        if text.contains("\"error\"") {
            return Err(TtsError::ApiError {
                status: 400,
                message: text.to_string(),
            });
        }
        let parsed: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };
        if let Some(audio_b64) = parsed.get("audio").and_then(|a| a.as_str()) {
            let bytes = general_purpose::STANDARD
                .decode(audio_b64)
                .map_err(|e| TtsError::Decode(e.to_string()))?;
            return Ok(Some(bytes_to_i16(&bytes)));
        }
        if parsed.get("isFinal").and_then(|v| v.as_bool()) == Some(true) {
            return Ok(None);
        }
        Ok(None)
    }
}

fn bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

#[async_trait]
impl TtsClient for ElevenLabsTts {
    fn supports_streaming(&self) -> bool {
        true
    }

    async fn synthesize(&self, text: &str, options: TtsOptions) -> Result<Vec<i16>, TtsError> {
        let (ws_stream, _) = connect_async(self.ws_url())
            .await
            .map_err(|e| TtsError::Connection(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(self.bos_message(options.speed).into()))
            .await
            .map_err(|e| TtsError::WebSocket(e.to_string()))?;

        let text_message = json!({"text": format!("{text} "), "try_trigger_generation": true}).to_string();
        write
            .send(Message::Text(text_message.into()))
            .await
            .map_err(|e| TtsError::WebSocket(e.to_string()))?;

        write
            .send(Message::Text(json!({"text": ""}).to_string().into()))
            .await
            .map_err(|e| TtsError::WebSocket(e.to_string()))?;

        let mut pcm = Vec::new();
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => match Self::decode_audio_message(&text)? {
                    Some(chunk) => pcm.extend(chunk),
                    None => {
                        if text.contains("\"isFinal\":true") {
                            break;
                        }
                    }
                },
                Some(Ok(Message::Binary(data))) => pcm.extend(bytes_to_i16(&data)),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TtsError::WebSocket(e.to_string())),
            }
        }

        if (options.volume - 1.0).abs() > f32::EPSILON {
            for sample in pcm.iter_mut() {
                *sample = (*sample as f32 * options.volume).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            }
        }

        Ok(pcm)
    }

    async fn stream_speak(
        &self,
        initial_text: Option<&str>,
        options: TtsOptions,
    ) -> Result<StreamingTts, TtsError> {
        let (ws_stream, _) = connect_async(self.ws_url())
            .await
            .map_err(|e| TtsError::Connection(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(self.bos_message(options.speed).into()))
            .await
            .map_err(|e| TtsError::WebSocket(e.to_string()))?;

        let (text_tx, mut text_rx) = mpsc::unbounded_channel::<String>();
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        if let Some(initial) = initial_text {
            let _ = text_tx.send(initial.to_string());
        }

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        log::debug!("streaming tts cancelled, discarding queued chunks");
                        let _ = write.close().await;
                        return;
                    }
                    token = text_rx.recv() => {
                        match token {
                            Some(token) if token.is_empty() => {
                                let eos = json!({"text": ""}).to_string();
                                if write.send(Message::Text(eos.into())).await.is_err() {
                                    return;
                                }
                            }
                            Some(token) => {
                                let msg = json!({"text": format!("{token} "), "try_trigger_generation": true}).to_string();
                                if write.send(Message::Text(msg.into())).await.is_err() {
                                    return;
                                }
                            }
                            None => return,
                        }
                    }
                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match ElevenLabsTts::decode_audio_message(&text) {
                                    Ok(Some(chunk)) => {
                                        if chunk_tx.send(chunk).is_err() {
                                            return;
                                        }
                                    }
                                    Ok(None) => {}
                                    Err(e) => {
                                        log::error!("streaming tts decode error: {e}");
                                        return;
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(data))) => {
                                if chunk_tx.send(bytes_to_i16(&data)).is_err() {
                                    return;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => return,
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                log::error!("streaming tts websocket error: {e}");
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(StreamingTts {
            text_tx,
            chunks: chunk_rx,
            cancel,
        })
    }

    async fn health_check(&self) -> bool {
        reqwest::Client::new()
            .get("https://api.elevenlabs.io/v1/voices")
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Stand-in used when `tts.enabled` is false or no ElevenLabs key is
/// configured. Synthesis returns silence rather than erroring, so callers
/// that don't check `tts.enabled` themselves (tests, builtins) still get a
/// well-formed, empty response instead of a connection failure.
pub struct NullTts;

#[async_trait]
impl TtsClient for NullTts {
    fn supports_streaming(&self) -> bool {
        false
    }

    async fn synthesize(&self, _text: &str, _options: TtsOptions) -> Result<Vec<i16>, TtsError> {
        Ok(Vec::new())
    }

    async fn stream_speak(
        &self,
        _initial_text: Option<&str>,
        _options: TtsOptions,
    ) -> Result<StreamingTts, TtsError> {
        Err(TtsError::Connection("text-to-speech is disabled".to_string()))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_to_i16_round_trips_little_endian_samples() {
        let samples = vec![1i16, -1, 1000, -1000];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(bytes_to_i16(&bytes), samples);
    }

    #[test]
    fn decode_audio_message_extracts_base64_chunk() {
        let pcm = vec![100i16, -100, 200];
        let bytes: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
        let b64 = general_purpose::STANDARD.encode(&bytes);
        let msg = json!({"audio": b64}).to_string();
        let decoded = ElevenLabsTts::decode_audio_message(&msg).unwrap().unwrap();
        assert_eq!(decoded, pcm);
    }

    #[test]
    fn decode_audio_message_surfaces_error_payloads() {
        let msg = json!({"error": "bad request"}).to_string();
        assert!(ElevenLabsTts::decode_audio_message(&msg).is_err());
    }

    #[tokio::test]
    async fn streaming_handle_push_and_finalize_do_not_panic_without_a_connection() {
        let (text_tx, _text_rx) = mpsc::unbounded_channel();
        let (_chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let handle = StreamingTts {
            text_tx,
            chunks: chunk_rx,
            cancel: CancellationToken::new(),
        };
        handle.push("hello");
        handle.finalize();
        handle.cancel();
        assert!(handle.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn null_tts_synthesizes_silence() {
        let pcm = NullTts.synthesize("hello", TtsOptions::default()).await.unwrap();
        assert!(pcm.is_empty());
    }
}
