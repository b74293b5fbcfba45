//! Crate-wide error type. Each module owns a narrow error enum for its own
//! concerns; this file only widens them into `EdgeError` via `From` so callers
//! higher up the stack (the orchestrator, the startup sequence, `main`) can
//! propagate with a single `?` regardless of which subsystem failed.

use crate::audio::AudioError;
use crate::config::ConfigError;
pub use crate::detection::DetectionError;
use crate::llm::LlmError;
use crate::stt::SttError;
use crate::tools::ToolError;
use crate::tools::mcp::McpError;
use crate::tts::TtsError;
use crate::vad::VadError;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EdgeError>;

#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("speech-to-text error: {0}")]
    Stt(#[from] SttError),

    #[error("text-to-speech error: {0}")]
    Tts(#[from] TtsError),

    #[error("wake-word detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("voice activity detection error: {0}")]
    Vad(#[from] VadError),

    #[error("LLM backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),

    #[error("model loading error: {0}")]
    ModelLoadError(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("no LLM backend available: {0}")]
    LlmBackendUnavailable(String),

    #[error("playback cancelled")]
    PlaybackCancelled,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl EdgeError {
    /// Render a short, user-facing message with no stack traces, hostnames,
    /// ports or internal error codes, for use in a spoken TTS response.
    /// Truncated to stay well under the conversational-turn budget.
    pub fn user_facing_message(&self) -> String {
        let msg = match self {
            EdgeError::Stt(_) => "I didn't catch that, could you try again?".to_string(),
            EdgeError::Tts(_) => "I'm having trouble speaking right now.".to_string(),
            EdgeError::Llm(_) | EdgeError::LlmBackendUnavailable(_) => {
                "I'm having trouble thinking that through right now.".to_string()
            }
            EdgeError::Tool(_) => "That action didn't complete successfully.".to_string(),
            EdgeError::Mcp(_) => "One of my tools is unavailable right now.".to_string(),
            EdgeError::Audio(_) => "I'm having trouble with audio right now.".to_string(),
            EdgeError::PlaybackCancelled => "Okay.".to_string(),
            _ => "Something went wrong, sorry about that.".to_string(),
        };
        msg.chars().take(300).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_message_is_bounded_and_free_of_internals() {
        let err = EdgeError::Unknown("connection refused 127.0.0.1:9000".to_string());
        let msg = err.user_facing_message();
        assert!(msg.len() <= 300);
        assert!(!msg.contains("127.0.0.1"));
    }

    #[test]
    fn playback_cancelled_has_a_calm_user_facing_message() {
        assert_eq!(EdgeError::PlaybackCancelled.user_facing_message(), "Okay.");
    }
}
