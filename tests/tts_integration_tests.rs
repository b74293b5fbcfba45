//! Integration test against the real ElevenLabs TTS endpoint. Gated behind
//! `test-api`; skipped gracefully without a key.

#![cfg(feature = "test-api")]

use std::env;
use voice_gateway::tts::{ElevenLabsConfig, ElevenLabsTts, TtsClient, TtsOptions};

#[tokio::test]
async fn synthesize_produces_nonempty_pcm() {
    let Ok(api_key) = env::var("ELEVENLABS_API_KEY") else {
        println!("ELEVENLABS_API_KEY not set, skipping integration test");
        return;
    };

    let tts = ElevenLabsTts::new(api_key, ElevenLabsConfig::default());
    let options = TtsOptions { volume: 1.0, speed: 1.0 };
    let pcm = tts
        .synthesize("Hello, I'm ready to help.", options)
        .await
        .expect("synthesis should succeed with a real key");
    assert!(!pcm.is_empty());
}

#[tokio::test]
async fn health_check_reports_true_with_a_valid_key() {
    let Ok(api_key) = env::var("ELEVENLABS_API_KEY") else {
        println!("ELEVENLABS_API_KEY not set, skipping integration test");
        return;
    };

    let tts = ElevenLabsTts::new(api_key, ElevenLabsConfig::default());
    assert!(tts.health_check().await);
}
