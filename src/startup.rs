//! Startup orchestrator: brings every component up in the order the
//! component design calls for and gets the gateway from nothing running to
//! `listening` with a spoken welcome.
//!
//! Grounded on the teacher's `main.rs`, which logs a `BootTimings`-shaped
//! sequence of phase durations as it brings up the audio stack, the
//! wakeword models and the LLM client in turn; widened here into the full
//! health-check / parallel-init / warm-up-gated sequence the component
//! design lays out, instead of the teacher's single linear boot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::audio::playback::CpalSink;
use crate::config::Configuration;
use crate::error::{EdgeError, Result};
use crate::llm::client::build_client;
use crate::llm::router::AiRouter;
use crate::microphone_manager::MicrophoneManager;
use crate::mqtt::MqttPublisher;
use crate::orchestrator::Orchestrator;
use crate::stt::FireworksStt;
use crate::tools::builtin::{CurrentDateTime, ZwaveDeviceFallback};
use crate::tools::mcp::discover_tools;
use crate::tools::{ToolDescriptor, ToolRegistry};
use crate::tts::{ElevenLabsConfig, ElevenLabsTts, NullTts, TtsClient};

/// Wake-word warm-up is usually done within a second or two; ten bounds the
/// worst case (a cold model cache on first boot) without holding up the
/// welcome message indefinitely if something is wrong with the detector.
const WARMUP_TIMEOUT: Duration = Duration::from_secs(10);

const WELCOME_MESSAGE: &str = "Hello, I'm ready to help.";

/// Per-phase boot durations, logged once as a summary line so a slow boot
/// (a cold MCP server, a stalled health check) is visible without turning
/// on debug logging.
#[derive(Default)]
pub struct BootTimings {
    phases: Vec<(&'static str, Duration)>,
}

impl BootTimings {
    fn record(&mut self, name: &'static str, since: Instant) {
        let elapsed = since.elapsed();
        log::debug!("boot phase '{name}' took {elapsed:?}");
        self.phases.push((name, elapsed));
    }

    fn log_summary(&self) {
        let total: Duration = self.phases.iter().map(|(_, d)| *d).sum();
        let breakdown: Vec<String> = self
            .phases
            .iter()
            .map(|(name, d)| format!("{name}={d:?}"))
            .collect();
        log::info!("boot complete in {total:?} ({})", breakdown.join(", "));
    }
}

/// Bring the gateway up and run it until the microphone capture device
/// disconnects or the process is asked to shut down. Only a wake-word
/// model load failure or an unavailable audio device is fatal; AI/TTS
/// provider health failures and MCP discovery failures are logged as
/// warnings and the gateway starts anyway, degraded.
pub async fn run(config: Configuration) -> Result<()> {
    let mut timings = BootTimings::default();

    // Phase 1: construct the AI backend and TTS clients, and run their
    // reachability checks concurrently. Neither failure is fatal: a
    // backend that's unreachable at boot may well recover by the time a
    // user actually speaks to it.
    let t = Instant::now();
    let llm_client = build_client(&config.ai, config.api.anthropic.as_ref(), &config.ollama)
        .map_err(|e| EdgeError::LlmBackendUnavailable(e.to_string()))?;

    let tts_client: Arc<dyn TtsClient> = if config.tts.enabled {
        match config.api.elevenlabs_api_key() {
            Some(key) => Arc::new(ElevenLabsTts::new(key.to_string(), ElevenLabsConfig::default())),
            None => Arc::new(NullTts),
        }
    } else {
        Arc::new(NullTts)
    };

    let (llm_healthy, tts_healthy) = tokio::join!(llm_client.health_check(), tts_client.health_check());
    if !llm_healthy {
        log::warn!(
            "AI backend health check failed at startup (provider={}); starting anyway",
            llm_client.provider_name()
        );
    }
    if config.tts.enabled && !tts_healthy {
        log::warn!("TTS provider health check failed at startup; starting anyway");
    }
    timings.record("health_checks", t);

    // Phase 2: the wake-word detector. Model loading is the one startup
    // step the component design calls out as fatal — there is no degraded
    // mode for a gateway that can never hear its own name.
    let t = Instant::now();
    let mic_manager = MicrophoneManager::new(&config.audio, &config.oww, &config.vad)
        .map_err(|e| EdgeError::ModelLoadError(e.to_string()))?;
    timings.record("detector_init", t);

    // Phase 3: MCP tool discovery and welcome-message synthesis run in
    // parallel since neither depends on the other, then built-in tools are
    // registered (only `control_zwave_device` as a fallback, since MCP may
    // have already supplied a working one).
    let t = Instant::now();
    let tts_options = crate::tts::TtsOptions {
        volume: config.tts.volume,
        speed: config.tts.speed,
    };
    let tts_enabled = config.tts.enabled;
    let welcome_tts = tts_client.clone();
    let welcome_fut = async move {
        if !tts_enabled {
            return Vec::new();
        }
        match welcome_tts.synthesize(WELCOME_MESSAGE, tts_options).await {
            Ok(pcm) => pcm,
            Err(e) => {
                log::warn!("welcome message synthesis failed: {e}");
                Vec::new()
            }
        }
    };
    let (mcp_result, welcome_pcm) = tokio::join!(discover_tools(&config.mcp), welcome_fut);
    let (mcp_tools, _mcp_client) = mcp_result;

    let mut tools = ToolRegistry::new();
    tools.add_builtin(Box::new(CurrentDateTime));
    let mcp_has_zwave = mcp_tools.iter().any(|t| t.name() == "control_zwave_device");
    tools.add_external(mcp_tools);
    if !mcp_has_zwave {
        tools.add_builtin(Box::new(ZwaveDeviceFallback));
    }
    timings.record("tools_and_welcome", t);

    // Phase 4: wire the AI router, MQTT publisher, STT client and
    // orchestrator together. None of this talks to the outside world yet.
    let t = Instant::now();
    let router = AiRouter::new(llm_client, tools, config.ai.system_prompt.clone());
    let mqtt = MqttPublisher::connect(&config.mqtt);
    let stt_client: Arc<dyn crate::stt::SttClient> =
        Arc::new(FireworksStt::new(config.api.fireworks_api_key().to_string()));
    let audio_sink: Arc<dyn crate::audio::playback::AudioSink> =
        Arc::new(CpalSink::new(config.audio.speaker_device.clone()).map_err(EdgeError::Audio)?);

    let (mic_command_tx, mic_command_rx) = mpsc::unbounded_channel();
    let (mic_event_tx, mut mic_event_rx) = mpsc::unbounded_channel();

    let mut orchestrator = Orchestrator::new(
        &config,
        audio_sink,
        stt_client,
        tts_client,
        router,
        mqtt,
        mic_command_tx,
    );
    timings.record("wiring", t);

    // Phase 5: start microphone capture. From this point on the pipeline is
    // listening, even though the top-level machine is still `startup` until
    // `mark_ready` runs below.
    let t = Instant::now();
    tokio::spawn(mic_manager.run(mic_command_rx, mic_event_tx));
    timings.record("capture_start", t);

    // Phase 6: wait for the detector's warm-up signal (or time out and
    // proceed anyway — a gateway that never warms up still answers once it
    // eventually does).
    let t = Instant::now();
    match tokio::time::timeout(WARMUP_TIMEOUT, wait_for_warmup(&mut mic_event_rx)).await {
        Ok(()) => {}
        Err(_) => log::warn!(
            "wake-word detector warm-up did not complete within {WARMUP_TIMEOUT:?}; proceeding anyway"
        ),
    }
    timings.record("warmup", t);

    // Phase 7: play the welcome message (barge-in capable — a wake word
    // spoken over it is handled the same as one during any other playback),
    // then the ready beep, then flip the gateway to `listening`.
    let t = Instant::now();
    orchestrator.mark_ready();
    orchestrator.play_welcome_and_ready_beep(welcome_pcm, &mut mic_event_rx).await;
    timings.record("welcome", t);

    timings.log_summary();

    orchestrator.run(mic_event_rx).await;
    Ok(())
}

/// Drain mic events until `WarmupComplete`, forwarding nothing — at this
/// point in startup nothing is listening to microphone events yet.
async fn wait_for_warmup(events: &mut mpsc::UnboundedReceiver<crate::microphone_manager::MicEvent>) {
    while let Some(event) = events.recv().await {
        if matches!(event, crate::microphone_manager::MicEvent::WarmupComplete) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_timings_summary_includes_every_recorded_phase() {
        let mut timings = BootTimings::default();
        timings.record("a", Instant::now());
        timings.record("b", Instant::now());
        assert_eq!(timings.phases.len(), 2);
    }
}
