//! Process-wide configuration, loaded once at startup from the environment.
//!
//! Mirrors the configuration keys enumerated for this gateway: wake-word, audio,
//! VAD, TTS, AI backend, MQTT, MCP and the optional web-search fallback. Everything
//! is read here and nowhere else; constructors take a `&Configuration` or an owned
//! clone rather than re-reading the environment.

use secrecy::{ExposeSecret, SecretBox};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid API key format for {service}: {reason}")]
    InvalidKeyFormat { service: String, reason: String },
    #[error("invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },
    #[error("environment error: {0}")]
    EnvError(#[from] env::VarError),
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("could not parse '{raw}'"),
        }),
    }
}

/// Wake-word detector configuration (`oww.*`).
#[derive(Debug, Clone)]
pub struct OwwConfig {
    pub model_path: String,
    pub melspec_model_path: String,
    pub embedding_model_path: String,
    pub threshold: f32,
    pub embedding_frames: usize,
    pub warmup_ms: u64,
}

impl OwwConfig {
    fn load() -> Result<Self, ConfigError> {
        let threshold = env_parsed("OWW_THRESHOLD", 0.5f32)?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid {
                key: "oww.threshold".to_string(),
                reason: "must be within [0, 1]".to_string(),
            });
        }
        Ok(Self {
            model_path: env_or("OWW_MODEL_PATH", "models/hey_jarvis.tflite"),
            melspec_model_path: env_or("OWW_MELSPEC_MODEL_PATH", "models/melspectrogram.tflite"),
            embedding_model_path: env_or("OWW_EMBEDDING_MODEL_PATH", "models/embedding.tflite"),
            threshold,
            embedding_frames: env_parsed("OWW_EMBEDDING_FRAMES", 16usize)?,
            warmup_ms: env_parsed("OWW_WARMUP_MS", 1500u64)?,
        })
    }
}

/// Audio I/O configuration (`audio.*`).
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub mic_device: Option<String>,
    pub speaker_device: Option<String>,
    pub sample_rate: u32,
    pub trigger_cooldown_ms: u64,
    pub beep_volume: f32,
}

impl AudioConfig {
    fn load() -> Result<Self, ConfigError> {
        let sample_rate = env_parsed("AUDIO_SAMPLE_RATE", 16_000u32)?;
        if sample_rate != 16_000 {
            log::warn!(
                "audio.sampleRate is {sample_rate}, but wake-word models require 16000 Hz; capture will warn at startup"
            );
        }
        Ok(Self {
            mic_device: env_opt("AUDIO_MIC_DEVICE"),
            speaker_device: env_opt("AUDIO_SPEAKER_DEVICE"),
            sample_rate,
            trigger_cooldown_ms: env_parsed("AUDIO_TRIGGER_COOLDOWN_MS", 1500u64)?,
            beep_volume: env_parsed("AUDIO_BEEP_VOLUME", 0.6f32)?,
        })
    }
}

/// Voice-activity-detector configuration (`vad.*`).
#[derive(Debug, Clone)]
pub struct VadConfig {
    pub pre_roll_ms: u64,
    pub silence_threshold: f32,
    pub min_speech_ms: u64,
    pub trailing_silence_ms: u64,
    pub max_utterance_ms: u64,
    pub grace_before_stop_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            pre_roll_ms: 300,
            silence_threshold: 0.003,
            min_speech_ms: 700,
            trailing_silence_ms: 1500,
            max_utterance_ms: 10_000,
            grace_before_stop_ms: 1200,
        }
    }
}

impl VadConfig {
    fn load() -> Result<Self, ConfigError> {
        let d = Self::default();
        let silence_threshold = env_parsed("VAD_SILENCE_THRESHOLD", d.silence_threshold)?;
        if silence_threshold <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "vad.silenceThreshold".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(Self {
            pre_roll_ms: env_parsed("VAD_PRE_ROLL_MS", d.pre_roll_ms)?,
            silence_threshold,
            min_speech_ms: env_parsed("VAD_MIN_SPEECH_MS", d.min_speech_ms)?,
            trailing_silence_ms: env_parsed("VAD_TRAILING_SILENCE_MS", d.trailing_silence_ms)?,
            max_utterance_ms: env_parsed("VAD_MAX_UTTERANCE_MS", d.max_utterance_ms)?,
            grace_before_stop_ms: env_parsed("VAD_GRACE_BEFORE_STOP_MS", d.grace_before_stop_ms)?,
        })
    }
}

/// Text-to-speech configuration (`tts.*`).
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub enabled: bool,
    pub streaming: bool,
    pub volume: f32,
    pub speed: f32,
    pub model_path: Option<String>,
}

impl TtsConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: env_parsed("TTS_ENABLED", true)?,
            streaming: env_parsed("TTS_STREAMING", true)?,
            volume: env_parsed("TTS_VOLUME", 1.0f32)?,
            speed: env_parsed("TTS_SPEED", 1.0f32)?,
            model_path: env_opt("TTS_MODEL_PATH"),
        })
    }
}

/// Which language-model backend the AI router dispatches to (`ai.provider`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AiProvider {
    #[strum(serialize = "anthropic")]
    Anthropic,
    #[strum(serialize = "ollama")]
    Ollama,
}

impl std::str::FromStr for AiProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Invalid {
                key: "ai.provider".to_string(),
                reason: format!("unknown provider '{other}', expected anthropic or ollama"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub provider: AiProvider,
    pub system_prompt: Option<String>,
}

impl AiConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            provider: env_or("AI_PROVIDER", "anthropic").parse()?,
            system_prompt: env_opt("AI_SYSTEM_PROMPT"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub num_ctx: u32,
    pub temperature: f32,
    pub keep_alive: String,
}

impl OllamaConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_or("OLLAMA_BASE_URL", "http://localhost:11434"),
            model: env_or("OLLAMA_MODEL", "llama3.1"),
            num_ctx: env_parsed("OLLAMA_NUM_CTX", 4096u32)?,
            temperature: env_parsed("OLLAMA_TEMPERATURE", 0.7f32)?,
            keep_alive: env_or("OLLAMA_KEEP_ALIVE", "5m"),
        })
    }
}

pub struct AnthropicConfig {
    pub api_key: SecretBox<String>,
    pub model: String,
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicConfig {
    fn load(required: bool) -> Result<Option<Self>, ConfigError> {
        match env_opt("ANTHROPIC_API_KEY") {
            Some(key) => Ok(Some(Self {
                api_key: SecretBox::new(Box::new(key)),
                model: env_or("ANTHROPIC_MODEL", "claude-3-5-sonnet-latest"),
            })),
            None if required => Err(ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".to_string())),
            None => Ok(None),
        }
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MqttConfig {
    pub broker_url: Option<String>,
}

impl MqttConfig {
    fn load() -> Self {
        Self {
            broker_url: env_opt("MQTT_BROKER_URL"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct McpConfig {
    pub command: String,
    pub args: Vec<String>,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl McpConfig {
    fn load() -> Result<Self, ConfigError> {
        let args = env_opt("MCP_SERVER_ARGS")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        Ok(Self {
            command: env_or("MCP_SERVER_COMMAND", "mcp-server"),
            args,
            retry_attempts: env_parsed("MCP_RETRY_ATTEMPTS", 2u32)?,
            retry_base_delay_ms: env_parsed("MCP_RETRY_BASE_DELAY_MS", 1000u64)?,
        })
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[derive(Debug, Clone)]
pub struct WebSearchFallbackConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl WebSearchFallbackConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: env_parsed("WEB_SEARCH_FALLBACK_ENABLED", false)?,
            timeout_ms: env_parsed("WEB_SEARCH_FALLBACK_TIMEOUT_MS", 4000u64)?,
        })
    }
}

/// All API secrets in one place, separate from the plain configuration struct
/// so that debug-printing `Configuration` can never leak a key.
pub struct ApiConfig {
    pub anthropic: Option<AnthropicConfig>,
    fireworks_api_key: SecretBox<String>,
    elevenlabs_api_key: Option<SecretBox<String>>,
}

impl ApiConfig {
    fn load(provider: AiProvider, tts_enabled: bool) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let anthropic = AnthropicConfig::load(provider == AiProvider::Anthropic)?;

        let fireworks_api_key = env_opt("FIREWORKS_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("FIREWORKS_API_KEY".to_string()))?;
        let elevenlabs_api_key = match env_opt("ELEVENLABS_API_KEY") {
            Some(key) => Some(SecretBox::new(Box::new(key))),
            None if tts_enabled => return Err(ConfigError::MissingEnvVar("ELEVENLABS_API_KEY".to_string())),
            None => None,
        };

        Ok(Self {
            anthropic,
            fireworks_api_key: SecretBox::new(Box::new(fireworks_api_key)),
            elevenlabs_api_key,
        })
    }

    pub fn fireworks_api_key(&self) -> &str {
        self.fireworks_api_key.expose_secret()
    }

    pub fn elevenlabs_api_key(&self) -> Option<&str> {
        self.elevenlabs_api_key.as_ref().map(|k| k.expose_secret().as_str())
    }
}

/// The single source of truth for every configuration key the gateway reads.
/// Loaded once at startup; never re-read from the environment afterwards.
pub struct Configuration {
    pub oww: OwwConfig,
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub tts: TtsConfig,
    pub ai: AiConfig,
    pub ollama: OllamaConfig,
    pub mqtt: MqttConfig,
    pub mcp: McpConfig,
    pub web_search_fallback: WebSearchFallbackConfig,
    pub api: ApiConfig,
}

impl Configuration {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let ai = AiConfig::load()?;
        let tts = TtsConfig::load()?;
        let api = ApiConfig::load(ai.provider, tts.enabled)?;

        let config = Self {
            oww: OwwConfig::load()?,
            audio: AudioConfig::load()?,
            vad: VadConfig::load()?,
            tts,
            ai,
            ollama: OllamaConfig::load()?,
            mqtt: MqttConfig::load(),
            mcp: McpConfig::load()?,
            web_search_fallback: WebSearchFallbackConfig::load()?,
            api,
        };

        log::info!(
            "configuration loaded: provider={} threshold={} sample_rate={}",
            config.ai.provider,
            config.oww.threshold,
            config.audio.sample_rate
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oww_threshold_out_of_range_is_rejected() {
        std::env::set_var("OWW_THRESHOLD", "1.5");
        let result = OwwConfig::load();
        std::env::remove_var("OWW_THRESHOLD");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn vad_defaults_match_spec_constants() {
        let vad = VadConfig::default();
        assert_eq!(vad.pre_roll_ms, 300);
        assert_eq!(vad.min_speech_ms, 700);
        assert_eq!(vad.trailing_silence_ms, 1500);
        assert_eq!(vad.max_utterance_ms, 10_000);
        assert_eq!(vad.grace_before_stop_ms, 1200);
    }

    #[test]
    fn ai_provider_parses_case_insensitively() {
        assert_eq!("Anthropic".parse::<AiProvider>().unwrap(), AiProvider::Anthropic);
        assert_eq!("OLLAMA".parse::<AiProvider>().unwrap(), AiProvider::Ollama);
        assert!("bogus".parse::<AiProvider>().is_err());
    }

    #[test]
    fn mcp_retry_base_delay_defaults_to_one_second() {
        let mcp = McpConfig {
            command: "mcp-server".to_string(),
            args: vec![],
            retry_attempts: 2,
            retry_base_delay_ms: 1000,
        };
        assert_eq!(mcp.retry_base_delay(), Duration::from_millis(1000));
    }
}
