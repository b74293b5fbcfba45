//! Microphone manager: owns capture, the wake-word detection pipeline, the
//! pre-roll ring, and the recording lifecycle, and turns all of it into a
//! small event stream the orchestrator reacts to.
//!
//! Grounded on the teacher's `SpeechHub` (`src/speech_producer/mod.rs`): a
//! single task owns the audio source and fans decisions out as events rather
//! than handing the raw stream to callers. Unlike the teacher, which ran one
//! VAD continuously over a live broadcast, this gateway only needs VAD while
//! a trigger-accepted recording is in progress, so it is entirely
//! mic-manager-local state, recreated fresh on every `StartRecording`.

use tokio::sync::mpsc;

use crate::audio::capture::{AudioCapture, AudioCaptureConfig};
use crate::buffers::{PreRollRing, RecordingBuffer, Utterance};
use crate::config::{AudioConfig, OwwConfig, VadConfig};
use crate::detection::pipeline::{DetectionPipeline, PipelineConfig};
use crate::error::Result;
use crate::state_machine::wake_word::{WakeWordEvent as WwEvent, WakeWordMachine, WakeWordState};
use crate::state_machine::recording::{RecordingEffect, RecordingEvent, RecordingMachine};
use crate::vad::Vad;

const FRAME_DURATION_MS: u64 = 80;

/// Told to the manager by the orchestrator once it has decided (via
/// [`crate::state_machine::voice_gateway::VoiceGatewayMachine`]) that a
/// wake-word trigger should actually start a recording.
#[derive(Debug, Clone, Copy)]
pub enum MicCommand {
    StartRecording,
    /// The gateway machine rejected the trigger (too soon after the last
    /// one, or arrived outside `listening`/`cooldown`); release the
    /// wake-word machine back to `ready` without starting a recording.
    TriggerNotAccepted,
    /// The detector produced a noisy run; re-arm without tearing down the
    /// process, per `WakeWordEvent::ResetDetector`.
    ResetDetector,
    /// The orchestrator has finished the full turn for the utterance this
    /// recording produced (transcribe, query, synthesize, play all done, or
    /// the early empty-speech exit). Only now does the recording machine
    /// return to idle; a trigger arriving before this is barge-in and is
    /// handled by `(Processing, StartRecording)` instead.
    RecordingComplete,
}

#[derive(Debug, Clone)]
pub enum MicEvent {
    WarmupComplete,
    WakeWordTriggered { score: f32, timestamp_ms: u64 },
    UtteranceReady {
        utterance: Utterance,
        reason: crate::vad::StopReason,
    },
    /// Recording stopped without the VAD ever observing speech above
    /// threshold; the orchestrator still needs to know so it can drive the
    /// recording/gateway machines back to idle without calling STT on dead
    /// air.
    UtteranceEmptyOfSpeech {
        reason: crate::vad::StopReason,
    },
}

pub struct MicrophoneManager {
    capture: AudioCapture,
    pipeline: DetectionPipeline,
    pre_roll: PreRollRing,
    wake_word: WakeWordMachine,
    recording: RecordingMachine,
    vad_config: VadConfig,
    sample_rate: u32,
    active_vad: Option<Vad>,
    active_buffer: Option<RecordingBuffer>,
    ended_without_speech_streak: u32,
}

impl MicrophoneManager {
    pub fn new(audio: &AudioConfig, oww: &OwwConfig, vad: &VadConfig) -> Result<Self> {
        let capture = AudioCapture::start(AudioCaptureConfig {
            device_name: audio.mic_device.clone(),
        })?;

        let pipeline_config = PipelineConfig {
            melspectrogram_model_path: oww.melspec_model_path.clone(),
            embedding_model_path: oww.embedding_model_path.clone(),
            wakeword_model_path: oww.model_path.clone(),
            embedding_frames: oww.embedding_frames,
            warmup_ms: oww.warmup_ms,
            threshold: oww.threshold,
        };
        let pipeline = DetectionPipeline::new(pipeline_config)?;

        let mut wake_word = WakeWordMachine::new();
        wake_word.apply(WwEvent::DetectorInitialized, 0);

        Ok(Self {
            capture,
            pipeline,
            pre_roll: PreRollRing::new(vad.pre_roll_ms, FRAME_DURATION_MS),
            wake_word,
            recording: RecordingMachine::new(),
            vad_config: vad.clone(),
            sample_rate: audio.sample_rate,
            active_vad: None,
            active_buffer: None,
            ended_without_speech_streak: 0,
        })
    }

    /// Drive the manager until capture ends (device disconnect) or the
    /// command channel closes. Runs on the caller's task; the caller
    /// typically spawns this.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<MicCommand>,
        events: mpsc::UnboundedSender<MicEvent>,
    ) {
        let warmup_events = events.clone();
        // `warm_up()` borrows `self.pipeline` immutably for the whole wait,
        // so poll it via the cheap `warm_up_complete()` check inside the main
        // loop instead of a detached task borrowing the pipeline directly.
        let _ = &warmup_events;

        loop {
            tokio::select! {
                biased;
                command = commands.recv() => {
                    match command {
                        Some(MicCommand::StartRecording) => self.start_recording(),
                        Some(MicCommand::TriggerNotAccepted) => {
                            self.wake_word.apply(WwEvent::TriggerProcessed, now_ms());
                        }
                        Some(MicCommand::ResetDetector) => {
                            self.wake_word.apply(WwEvent::ResetDetector, now_ms());
                            self.pipeline.reset();
                        }
                        Some(MicCommand::RecordingComplete) => {
                            self.recording.apply(RecordingEvent::RecordingComplete);
                        }
                        None => return,
                    }
                }
                frame = self.capture.recv() => {
                    let Some(frame) = frame else { return };

                    if self.recording.state() == crate::state_machine::recording::RecordingState::Recording {
                        self.process_recording_frame(&frame, &events);
                    } else {
                        self.pre_roll.push(frame.clone());
                        self.run_detection(&frame, &events);
                    }
                }
            }
        }
    }

    fn run_detection(&mut self, frame: &crate::audio::AudioFrame, events: &mpsc::UnboundedSender<MicEvent>) {
        let was_warmed_up = self.pipeline.warm_up_complete();
        let score = match self.pipeline.detect(&frame.to_f32()) {
            Ok(s) => s,
            Err(e) => {
                log::error!("wake-word detection failed, skipping frame: {e}");
                return;
            }
        };

        if !was_warmed_up && self.pipeline.warm_up_complete() {
            self.wake_word.apply(WwEvent::WarmupComplete, frame.timestamp_ms);
            let _ = events.send(MicEvent::WarmupComplete);
        }

        if self.wake_word.state() != WakeWordState::Ready {
            return;
        }
        if score >= self.pipeline.threshold() {
            self.wake_word
                .apply(WwEvent::WakeWordDetected { score }, frame.timestamp_ms);
            let _ = events.send(MicEvent::WakeWordTriggered {
                score,
                timestamp_ms: frame.timestamp_ms,
            });
        }
    }

    fn start_recording(&mut self) {
        let effects = self.recording.apply(RecordingEvent::StartRecording);
        if effects.contains(&RecordingEffect::ClearBufferAndVad) {
            self.active_vad = Some(Vad::new(self.vad_config.clone(), self.sample_rate));
            self.active_buffer = Some(RecordingBuffer::start(self.pre_roll.snapshot()));
        }
        self.wake_word.apply(WwEvent::TriggerProcessed, now_ms());
    }

    fn process_recording_frame(
        &mut self,
        frame: &crate::audio::AudioFrame,
        events: &mpsc::UnboundedSender<MicEvent>,
    ) {
        let (Some(vad), Some(buffer)) = (self.active_vad.as_mut(), self.active_buffer.as_mut()) else {
            return;
        };

        let samples = frame.to_f32();
        buffer.append(&samples);
        let decision = vad.process_chunk(&samples);
        buffer.set_has_spoken(decision.has_spoken);

        if !decision.should_stop {
            return;
        }

        let reason = decision.reason.unwrap_or(crate::vad::StopReason::Silence);
        let event = match reason {
            crate::vad::StopReason::MaxLength => RecordingEvent::MaxLengthReached,
            crate::vad::StopReason::Silence => RecordingEvent::SilenceDetected,
        };
        self.recording.apply(event);

        let buffer = self.active_buffer.take().expect("checked above");
        self.active_vad = None;
        let has_spoken = buffer.has_spoken();
        let utterance = buffer.into_utterance(frame.timestamp_ms);

        // `RECORDING_COMPLETE` is deferred to the orchestrator: it only fires
        // once the full turn this utterance produced is done (or, for the
        // empty-speech case below, right away since there is no turn to run).
        if has_spoken {
            self.ended_without_speech_streak = 0;
            let _ = events.send(MicEvent::UtteranceReady { utterance, reason });
        } else {
            Vad::note_ended_without_speech(&mut self.ended_without_speech_streak);
            let _ = events.send(MicEvent::UtteranceEmptyOfSpeech { reason });
            self.recording.apply(RecordingEvent::RecordingComplete);
        }
    }
}

fn now_ms() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START.get_or_init(std::time::Instant::now).elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_monotonically_nondecreasing() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }
}
