//! Voice Interaction Orchestrator: sequences STT -> LLM (with tool calling)
//! -> TTS for each completed utterance, and owns the playback and
//! voice-gateway state machines so barge-in can interrupt a response in
//! flight.
//!
//! Grounded on the teacher's `LLMIntegration::process_user_instruction`
//! (same `tokio::select!` cancellation race, same "skip everything if
//! nothing was said" early-out) widened to the full STT -> LLM -> TTS chain
//! described in the component design, and on the design notes' "shared
//! mutable playback handle" guidance: the active playback lives in
//! [`PlaybackMachine`]'s context, never in a global, and this struct only
//! ever reaches it through that machine's events.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio::playback::{AudioSink, PlaybackOutcome};
use crate::beeps::{self, BeepKind};
use crate::buffers::Utterance;
use crate::config::Configuration;
use crate::llm::router::AiRouter;
use crate::microphone_manager::{MicCommand, MicEvent};
use crate::mqtt::MqttPublisher;
use crate::state_machine::playback::{ActivePlayback, PlaybackEvent, PlaybackMachine, PlaybackType};
use crate::state_machine::voice_gateway::{GatewayEffect, GatewayEvent, GatewayState, VoiceGatewayMachine};
use crate::stt::SttClient;
use crate::tts::{TtsClient, TtsOptions};

/// One conversational turn's cancellation point. Bound to the streaming LLM
/// call (via `AiRouter`'s own internal `select!`), the TTS player, and the
/// audio device: a single `cancel()` tears down all three, and is idempotent
/// — calling it twice, or with nothing active, is a no-op.
struct ActiveTurn {
    cancel: CancellationToken,
}

/// What happened to a turn-in-progress (a beep, a spoken reply, or the whole
/// transcribe-query-synthesize-play sequence for an utterance): either it ran
/// to completion, or a wake-word trigger barged in partway through and needs
/// to be handled as the next turn instead. Threading this up through the call
/// chain (rather than having the playback code call back into trigger
/// handling directly) keeps `play_through_machine` from needing to call
/// `handle_trigger`/`handle_mic_event` itself, which would make those
/// `async fn`s mutually recursive.
#[derive(Debug, Clone, Copy)]
enum TurnOutcome {
    Completed,
    Interrupted { score: f32, timestamp_ms: u64 },
}

pub struct Orchestrator {
    gateway: VoiceGatewayMachine,
    playback: PlaybackMachine,
    audio_sink: Arc<dyn AudioSink>,
    stt: Arc<dyn SttClient>,
    tts: Arc<dyn TtsClient>,
    router: AiRouter,
    mqtt: Option<MqttPublisher>,
    mic_commands: mpsc::UnboundedSender<MicCommand>,
    tts_options: TtsOptions,
    tts_enabled: bool,
    beep_volume: f32,
    sample_rate_hz: u32,
    /// Mirrors whether the microphone manager is currently accumulating a
    /// recording. Distinct from `gateway`'s state because the gateway only
    /// transitions out of `Recording` once this orchestrator applies the
    /// stop event, slightly after the mic manager itself already knows the
    /// recording ended — beep suppression needs the earlier of the two.
    mic_recording: bool,
    active_turn: Option<ActiveTurn>,
}

impl Orchestrator {
    pub fn new(
        config: &Configuration,
        audio_sink: Arc<dyn AudioSink>,
        stt: Arc<dyn SttClient>,
        tts: Arc<dyn TtsClient>,
        router: AiRouter,
        mqtt: Option<MqttPublisher>,
        mic_commands: mpsc::UnboundedSender<MicCommand>,
    ) -> Self {
        Self {
            gateway: VoiceGatewayMachine::new(config.audio.trigger_cooldown_ms, config.audio.trigger_cooldown_ms),
            playback: PlaybackMachine::new(config.audio.trigger_cooldown_ms),
            audio_sink,
            stt,
            tts,
            router,
            mqtt,
            mic_commands,
            tts_options: TtsOptions {
                volume: config.tts.volume,
                speed: config.tts.speed,
            },
            tts_enabled: config.tts.enabled,
            beep_volume: config.audio.beep_volume,
            sample_rate_hz: config.audio.sample_rate,
            mic_recording: false,
            active_turn: None,
        }
    }

    pub fn gateway_state(&self) -> GatewayState {
        self.gateway.state()
    }

    /// Transition `startup -> listening`. Called once by the startup
    /// orchestrator after the welcome message and ready beep have played.
    pub fn mark_ready(&mut self) {
        self.gateway.apply(GatewayEvent::Ready);
    }

    /// Play a beep unless the microphone manager is mid-recording (beep
    /// suppression per the component design's §4.5: checked immediately
    /// before playing, never deferred, so a beep triggered right as a
    /// recording starts is silently dropped rather than bleeding into it).
    async fn play_beep(
        &mut self,
        kind: BeepKind,
        mic_events: &mut mpsc::UnboundedReceiver<MicEvent>,
    ) -> TurnOutcome {
        if self.mic_recording {
            log::debug!("suppressing {kind:?} beep: a recording is in progress");
            return TurnOutcome::Completed;
        }
        let pcm = beeps::synthesize(kind, self.beep_volume);
        self.play_through_machine(pcm, PlaybackType::Beep, mic_events).await
    }

    /// Play already-synthesized PCM as a cancellable, interruptible
    /// playback, wiring it into `PlaybackMachine` so `INTERRUPT` reaches the
    /// underlying player and a second `start_playback` call while one is
    /// already active first cancels and joins the prior one.
    ///
    /// Races the join against `mic_events` so a wake-word trigger arriving
    /// mid-playback cancels it immediately instead of queuing behind a
    /// `handle.join().await` that could otherwise block the reactor for the
    /// whole response. A non-trigger event arriving during playback (there is
    /// no recording in progress to produce one) is logged and dropped rather
    /// than dispatched recursively, since this function must never call back
    /// into `handle_mic_event`.
    async fn play_through_machine(
        &mut self,
        pcm: Vec<i16>,
        playback_type: PlaybackType,
        mic_events: &mut mpsc::UnboundedReceiver<MicEvent>,
    ) -> TurnOutcome {
        if pcm.is_empty() {
            return TurnOutcome::Completed;
        }
        self.cancel_active_playback();

        let handle = match self.audio_sink.play(pcm, self.sample_rate_hz).await {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("failed to start playback: {e}");
                return TurnOutcome::Completed;
            }
        };
        let canceller = handle.canceller();
        self.playback.apply(PlaybackEvent::StartPlayback(ActivePlayback::new(
            playback_type,
            move || canceller.cancel(),
        )));

        tokio::pin! {
            let joined = handle.join();
        }

        let outcome = loop {
            tokio::select! {
                biased;
                event = mic_events.recv() => {
                    match event {
                        Some(MicEvent::WakeWordTriggered { score, timestamp_ms }) => {
                            log::info!("barge-in during playback (score={score:.3})");
                            self.cancel_active_playback();
                            let _ = joined.await;
                            self.playback.apply(PlaybackEvent::InterruptHandled);
                            return TurnOutcome::Interrupted { score, timestamp_ms };
                        }
                        Some(other) => {
                            log::debug!("ignoring mic event during playback: {other:?}");
                        }
                        None => break PlaybackOutcome::Cancelled,
                    }
                }
                outcome = &mut joined => break outcome,
            }
        };

        match outcome {
            PlaybackOutcome::Finished => {
                self.playback.apply(PlaybackEvent::PlaybackComplete);
            }
            PlaybackOutcome::Cancelled => {
                // `Interrupt` already ran the cancel callback above if this
                // was driven by barge-in; if playback ended on its own
                // (device error) the machine is still `Playing`, so bring it
                // to `idle` the same way `INTERRUPT_HANDLED` would.
                if self.playback.active_playback_type() == Some(playback_type) {
                    self.playback.apply(PlaybackEvent::Interrupt);
                }
                self.playback.apply(PlaybackEvent::InterruptHandled);
            }
        }
        TurnOutcome::Completed
    }

    /// Idempotent: cancels whatever is currently in `PlaybackMachine`
    /// (a no-op if nothing is playing) and aborts the active turn's LLM
    /// call, if any.
    pub fn cancel_active_playback(&mut self) {
        self.playback.apply(PlaybackEvent::Interrupt);
        if let Some(turn) = self.active_turn.take() {
            turn.cancel.cancel();
        }
    }

    /// Play the pre-synthesized welcome message, then the "ready" beep.
    /// Called once by the startup orchestrator right after [`Self::mark_ready`],
    /// so the gateway is already `listening` and a wake word spoken over the
    /// welcome message barges in through the same path an ordinary trigger
    /// during a response would: `handle_trigger` cancels the welcome audio
    /// and starts recording immediately, skipping the ready beep entirely.
    ///
    /// `mic_events` is drained concurrently with playback rather than left
    /// buffered, which is what makes the barge-in possible; the receiver is
    /// handed back to the caller afterwards (unless a trigger fired, in
    /// which case it keeps going straight into [`Self::run`]).
    pub async fn play_welcome_and_ready_beep(
        &mut self,
        pcm: Vec<i16>,
        mic_events: &mut mpsc::UnboundedReceiver<MicEvent>,
    ) {
        if pcm.is_empty() {
            self.play_beep(BeepKind::Ready, mic_events).await;
            return;
        }

        self.cancel_active_playback();
        let handle = match self.audio_sink.play(pcm, self.sample_rate_hz).await {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("failed to start welcome playback: {e}");
                self.play_beep(BeepKind::Ready, mic_events).await;
                return;
            }
        };
        let canceller = handle.canceller();
        self.playback.apply(PlaybackEvent::StartPlayback(ActivePlayback::new(
            PlaybackType::Welcome,
            move || canceller.cancel(),
        )));

        tokio::pin! {
            let joined = handle.join();
        }

        let outcome = loop {
            tokio::select! {
                biased;
                event = mic_events.recv() => {
                    match event {
                        Some(MicEvent::WakeWordTriggered { score, timestamp_ms }) => {
                            log::info!("barge-in during welcome message (score={score:.3})");
                            self.cancel_active_playback();
                            let _ = joined.await;
                            self.playback.apply(PlaybackEvent::InterruptHandled);
                            self.handle_trigger(score, timestamp_ms, mic_events).await;
                            return;
                        }
                        Some(other) => self.handle_mic_event(other, mic_events).await,
                        None => break PlaybackOutcome::Cancelled,
                    }
                }
                outcome = &mut joined => break outcome,
            }
        };

        match outcome {
            PlaybackOutcome::Finished => self.playback.apply(PlaybackEvent::PlaybackComplete),
            PlaybackOutcome::Cancelled => {
                if self.playback.active_playback_type() == Some(PlaybackType::Welcome) {
                    self.playback.apply(PlaybackEvent::Interrupt);
                }
                self.playback.apply(PlaybackEvent::InterruptHandled);
            }
        }
        self.play_beep(BeepKind::Ready, mic_events).await;
    }

    /// Drive the orchestrator from microphone-manager events until the
    /// event channel closes (capture ended). Also ticks the gateway and
    /// playback machines' cooldown timers on a short interval, since neither
    /// machine is otherwise woken by a timer of its own — `cooldown ->
    /// listening`/`idle` only happens once something polls for elapsed time.
    pub async fn run(mut self, mut mic_events: mpsc::UnboundedReceiver<MicEvent>) {
        let mut cooldown_ticker = tokio::time::interval(std::time::Duration::from_millis(100));
        loop {
            tokio::select! {
                biased;
                event = mic_events.recv() => {
                    match event {
                        Some(event) => self.handle_mic_event(event, &mut mic_events).await,
                        None => return,
                    }
                }
                _ = cooldown_ticker.tick() => {
                    self.tick_cooldowns();
                }
            }
        }
    }

    /// `mic_events` is threaded through here (and everything it calls) so the
    /// playback triggered by an utterance can keep racing incoming mic events
    /// rather than blocking on `handle.join()` until the whole turn finishes.
    async fn handle_mic_event(
        &mut self,
        event: MicEvent,
        mic_events: &mut mpsc::UnboundedReceiver<MicEvent>,
    ) {
        match event {
            MicEvent::WarmupComplete => {
                log::info!("wake-word detector warm-up complete");
            }
            MicEvent::WakeWordTriggered { score, timestamp_ms } => {
                self.handle_trigger(score, timestamp_ms, mic_events).await;
            }
            MicEvent::UtteranceReady { utterance, reason } => {
                self.apply_gateway_stop(reason);
                self.mic_recording = false;
                if let TurnOutcome::Interrupted { score, timestamp_ms } =
                    self.process_utterance(utterance, mic_events).await
                {
                    self.handle_trigger(score, timestamp_ms, mic_events).await;
                }
                let _ = self.mic_commands.send(MicCommand::RecordingComplete);
            }
            MicEvent::UtteranceEmptyOfSpeech { reason } => {
                self.apply_gateway_stop(reason);
                self.mic_recording = false;
                log::info!("skipping transcription \u{2013} no speech detected");
            }
        }
    }

    fn apply_gateway_stop(&mut self, reason: crate::vad::StopReason) {
        let event = match reason {
            crate::vad::StopReason::Silence => GatewayEvent::SilenceDetected,
            crate::vad::StopReason::MaxLength => GatewayEvent::MaxLengthReached,
        };
        self.gateway.apply(event);
    }

    async fn handle_trigger(
        &mut self,
        score: f32,
        timestamp_ms: u64,
        mic_events: &mut mpsc::UnboundedReceiver<MicEvent>,
    ) {
        match self.gateway.apply(GatewayEvent::Trigger { timestamp_ms }) {
            Some(GatewayEffect::TriggerAccepted) => {
                log::info!("wake word accepted (score={score:.3}), starting recording");
                // Play the acknowledgment beep before marking a recording
                // in progress, so this beep isn't immediately suppressed by
                // its own recording: beep suppression exists to keep beeps
                // out of recordings other than the one that caused them.
                self.play_beep(BeepKind::Wake, mic_events).await;
                self.mic_recording = true;
                let _ = self.mic_commands.send(MicCommand::StartRecording);
            }
            Some(GatewayEffect::TriggerRejectedTooSoon) => {
                log::debug!("wake word trigger rejected: within min rearm window");
                let _ = self.mic_commands.send(MicCommand::TriggerNotAccepted);
            }
            Some(GatewayEffect::InterruptPlaybackAndLlm) => {
                log::info!("barge-in: cancelling active playback and starting recording");
                self.cancel_active_playback();
                self.mic_recording = true;
                let _ = self.mic_commands.send(MicCommand::StartRecording);
            }
            None => {
                let _ = self.mic_commands.send(MicCommand::TriggerNotAccepted);
            }
        }
    }

    /// Step 1-11 of the component design's §4.6: skip dead recordings
    /// outright, otherwise transcribe, query the AI router (which itself
    /// drives any tool-call round trips), then synthesize and play the
    /// reply. `RECORDING_COMPLETE` is not applied here — the caller sends it
    /// to the microphone manager once this (and any follow-up trigger it
    /// returns) is fully handled, per the turn sequence's step 11.
    async fn process_utterance(
        &mut self,
        utterance: Utterance,
        mic_events: &mut mpsc::UnboundedReceiver<MicEvent>,
    ) -> TurnOutcome {
        if !utterance.has_spoken || utterance.audio.is_empty() {
            log::info!("skipping transcription \u{2013} no speech detected");
            return TurnOutcome::Completed;
        }

        if let TurnOutcome::Interrupted { score, timestamp_ms } =
            self.play_beep(BeepKind::Processing, mic_events).await
        {
            return TurnOutcome::Interrupted { score, timestamp_ms };
        }

        let transcript = match self.stt.transcribe(&utterance.audio, self.sample_rate_hz).await {
            Ok(text) => text,
            Err(e) => {
                log::error!("transcription failed: {e}");
                return self.speak_error(mic_events).await;
            }
        };

        if transcript.trim().is_empty() {
            log::info!("transcription was empty, nothing to do");
            return TurnOutcome::Completed;
        }

        if let Some(mqtt) = &self.mqtt {
            mqtt.publish_transcription(&transcript);
        }

        let cancel = CancellationToken::new();
        self.active_turn = Some(ActiveTurn { cancel: cancel.clone() });

        let reply = self.router.process_user_instruction(&transcript, &cancel).await;
        self.active_turn = None;

        let Some(reply) = reply else {
            log::debug!("no reply produced (cancelled or empty); returning to listening");
            return TurnOutcome::Completed;
        };

        self.speak(&reply, mic_events).await
    }

    async fn speak_error(&mut self, mic_events: &mut mpsc::UnboundedReceiver<MicEvent>) -> TurnOutcome {
        self.speak(
            "Sorry, I had trouble understanding that. Could you try again?",
            mic_events,
        )
        .await
    }

    async fn speak(
        &mut self,
        text: &str,
        mic_events: &mut mpsc::UnboundedReceiver<MicEvent>,
    ) -> TurnOutcome {
        if !self.tts_enabled {
            log::info!("tts disabled, not speaking reply: {text}");
            return TurnOutcome::Completed;
        }
        match self.tts.synthesize(text, self.tts_options).await {
            Ok(pcm) => {
                if let TurnOutcome::Interrupted { score, timestamp_ms } =
                    self.play_beep(BeepKind::ResponseReady, mic_events).await
                {
                    return TurnOutcome::Interrupted { score, timestamp_ms };
                }
                self.play_through_machine(pcm, PlaybackType::Response, mic_events).await
            }
            Err(e) => {
                log::error!("speech synthesis failed: {e}");
                TurnOutcome::Completed
            }
        }
    }

    pub fn tick_cooldowns(&mut self) {
        self.gateway.tick();
        self.playback.tick_cooldown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct SilentSink;
    #[async_trait]
    impl AudioSink for SilentSink {
        async fn play(
            &self,
            _pcm: Vec<i16>,
            _sample_rate_hz: u32,
        ) -> Result<crate::audio::PlaybackHandle, crate::audio::AudioError> {
            Err(crate::audio::AudioError::DeviceUnavailable("no device in tests".to_string()))
        }
    }

    struct StubStt;
    #[async_trait]
    impl SttClient for StubStt {
        async fn transcribe(&self, _samples: &[f32], _sample_rate_hz: u32) -> Result<String, crate::stt::SttError> {
            Ok("what time is it".to_string())
        }
    }

    struct StubTts {
        called: Arc<AtomicBool>,
    }
    #[async_trait]
    impl crate::tts::TtsClient for StubTts {
        fn supports_streaming(&self) -> bool {
            false
        }
        async fn synthesize(
            &self,
            _text: &str,
            _options: TtsOptions,
        ) -> Result<Vec<i16>, crate::tts::TtsError> {
            self.called.store(true, Ordering::SeqCst);
            Ok(vec![])
        }
        async fn stream_speak(
            &self,
            _initial_text: Option<&str>,
            _options: TtsOptions,
        ) -> Result<crate::tts::StreamingTts, crate::tts::TtsError> {
            unimplemented!("not exercised by these tests")
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    struct NoopLlm;
    #[async_trait]
    impl crate::llm::client::LlmClient for NoopLlm {
        fn provider_name(&self) -> &'static str {
            "noop"
        }
        fn model_name(&self) -> &str {
            "noop"
        }
        fn supports_streaming(&self) -> bool {
            false
        }
        async fn complete(
            &self,
            _messages: &[crate::llm::client::Message],
            _tool_definitions: &[serde_json::Value],
        ) -> Result<crate::llm::client::Completion, crate::llm::client::LlmError> {
            Ok(crate::llm::client::Completion::Message("unused".to_string()))
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    fn test_orchestrator(tts_called: Arc<AtomicBool>) -> Orchestrator {
        let config = test_config();
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = AiRouter::new(Box::new(NoopLlm), crate::tools::ToolRegistry::new(), None);
        Orchestrator::new(
            &config,
            Arc::new(SilentSink),
            Arc::new(StubStt),
            Arc::new(StubTts { called: tts_called }),
            router,
            None,
            tx,
        )
    }

    fn test_config() -> Configuration {
        std::env::set_var("ANTHROPIC_API_KEY", "test-key-not-used");
        std::env::set_var("FIREWORKS_API_KEY", "test-key-not-used");
        std::env::set_var("ELEVENLABS_API_KEY", "test-key-not-used");
        let config = Configuration::load().expect("config loads with dummy keys");
        std::env::remove_var("ANTHROPIC_API_KEY");
        std::env::remove_var("FIREWORKS_API_KEY");
        std::env::remove_var("ELEVENLABS_API_KEY");
        config
    }

    #[tokio::test]
    async fn empty_utterance_skips_stt_and_tts_entirely() {
        let tts_called = Arc::new(AtomicBool::new(false));
        let mut orch = test_orchestrator(tts_called.clone());
        let (_tx, mut mic_events) = mpsc::unbounded_channel();
        orch.process_utterance(
            Utterance {
                audio: vec![],
                started_at_ms: 0,
                has_spoken: false,
            },
            &mut mic_events,
        )
        .await;
        assert!(!tts_called.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_active_playback_twice_is_a_no_op() {
        let tts_called = Arc::new(AtomicBool::new(false));
        let mut orch = test_orchestrator(tts_called);
        orch.cancel_active_playback();
        orch.cancel_active_playback();
        assert_eq!(orch.playback.state(), crate::state_machine::playback::PlaybackState::Idle);
    }
}
