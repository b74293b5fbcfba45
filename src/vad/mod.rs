//! Voice activity detection: a straight RMS-energy gate over the samples
//! appended to the current recording, with pre-roll, a grace period before
//! the detector is allowed to stop a recording, a minimum speech duration,
//! trailing silence, and a hard maximum utterance length.

use crate::config::VadConfig;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum VadError {
    #[error("invalid VAD input: {0}")]
    InvalidInput(String),
}

fn ms_to_samples(ms: u64, sample_rate: u32) -> usize {
    ((ms as f64 / 1000.0) * sample_rate as f64).floor() as usize
}

/// Why a recording was told to stop, if it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Silence,
    MaxLength,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadDecision {
    pub should_stop: bool,
    pub reason: Option<StopReason>,
    pub has_spoken: bool,
}

/// Energy-based voice activity detector, one instance per in-progress
/// recording. Reset (or recreated) on every `START_RECORDING`.
pub struct Vad {
    config: VadConfig,
    sample_rate: u32,
    started_at: Instant,
    total_recorded_samples: usize,
    silence_samples: usize,
    has_spoken: bool,
    energy_samples_logged: usize,
    ended_without_speech_streak: u32,
}

impl Vad {
    pub fn new(config: VadConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
            started_at: Instant::now(),
            total_recorded_samples: 0,
            silence_samples: 0,
            has_spoken: false,
            energy_samples_logged: 0,
            ended_without_speech_streak: 0,
        }
    }

    pub fn has_spoken(&self) -> bool {
        self.has_spoken
    }

    fn rms(chunk: &[f32]) -> f32 {
        if chunk.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = chunk.iter().map(|&s| s * s).sum();
        (sum_sq / chunk.len() as f32).sqrt()
    }

    /// Feed one chunk of newly-appended samples and decide whether the
    /// recording should stop.
    pub fn process_chunk(&mut self, chunk: &[f32]) -> VadDecision {
        self.total_recorded_samples += chunk.len();
        let energy = Self::rms(chunk);

        if (0.002..0.004).contains(&energy) {
            self.energy_samples_logged += 1;
            log::debug!("energy close to threshold: {energy:.5}");
        }

        let grace = Duration::from_millis(self.config.grace_before_stop_ms);
        if self.started_at.elapsed() < grace {
            log::debug!("not stopping: still within grace period ({grace:?})");
            return VadDecision {
                should_stop: false,
                reason: None,
                has_spoken: self.has_spoken,
            };
        }

        if energy >= self.config.silence_threshold {
            self.has_spoken = true;
            self.silence_samples = 0;
        } else {
            self.silence_samples += chunk.len();
        }

        let max_utterance_samples = ms_to_samples(self.config.max_utterance_ms, self.sample_rate);
        if self.total_recorded_samples >= max_utterance_samples {
            return VadDecision {
                should_stop: true,
                reason: Some(StopReason::MaxLength),
                has_spoken: self.has_spoken,
            };
        }

        let min_speech_samples = ms_to_samples(self.config.min_speech_ms, self.sample_rate);
        let trailing_silence_samples = ms_to_samples(self.config.trailing_silence_ms, self.sample_rate);
        if self.has_spoken
            && self.total_recorded_samples >= min_speech_samples
            && self.silence_samples >= trailing_silence_samples
        {
            return VadDecision {
                should_stop: true,
                reason: Some(StopReason::Silence),
                has_spoken: self.has_spoken,
            };
        }

        VadDecision {
            should_stop: false,
            reason: None,
            has_spoken: self.has_spoken,
        }
    }

    /// Called by the caller when a recording ends without any speech having
    /// been detected, to drive the "consider lowering the threshold"
    /// diagnostic.
    pub fn note_ended_without_speech(streak: &mut u32) {
        *streak += 1;
        if *streak >= 3 {
            log::warn!(
                "{streak} consecutive recordings ended without detected speech; consider lowering vad.silenceThreshold"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VadConfig {
        VadConfig {
            pre_roll_ms: 300,
            silence_threshold: 0.1,
            min_speech_ms: 0,
            trailing_silence_ms: 0,
            max_utterance_ms: 10_000,
            grace_before_stop_ms: 0,
        }
    }

    #[test]
    fn ms_to_samples_floors() {
        assert_eq!(ms_to_samples(300, 16_000), 4800);
        assert_eq!(ms_to_samples(1, 16_000), 16);
    }

    #[test]
    fn silence_only_recording_never_sets_has_spoken() {
        let mut vad = Vad::new(config(), 16_000);
        let silent = vec![0.0f32; 1600];
        let decision = vad.process_chunk(&silent);
        assert!(!decision.has_spoken);
    }

    #[test]
    fn loud_chunk_sets_has_spoken_and_stops_after_trailing_silence() {
        let mut cfg = config();
        cfg.trailing_silence_ms = 100;
        cfg.min_speech_ms = 0;
        let mut vad = Vad::new(cfg, 16_000);

        let loud = vec![0.5f32; 160];
        let decision = vad.process_chunk(&loud);
        assert!(decision.has_spoken);
        assert!(!decision.should_stop);

        let silent = vec![0.0f32; ms_to_samples(150, 16_000)];
        let decision = vad.process_chunk(&silent);
        assert!(decision.should_stop);
        assert_eq!(decision.reason, Some(StopReason::Silence));
    }

    #[test]
    fn max_length_stops_regardless_of_speech() {
        let mut cfg = config();
        cfg.max_utterance_ms = 100;
        let mut vad = Vad::new(cfg, 16_000);

        let silent = vec![0.0f32; ms_to_samples(150, 16_000)];
        let decision = vad.process_chunk(&silent);
        assert!(decision.should_stop);
        assert_eq!(decision.reason, Some(StopReason::MaxLength));
        assert!(!decision.has_spoken);
    }

    #[test]
    fn grace_period_blocks_any_stop_decision() {
        let mut cfg = config();
        cfg.grace_before_stop_ms = 10_000;
        cfg.max_utterance_ms = 1;
        let mut vad = Vad::new(cfg, 16_000);

        let silent = vec![0.0f32; 1600];
        let decision = vad.process_chunk(&silent);
        assert!(!decision.should_stop);
    }
}
