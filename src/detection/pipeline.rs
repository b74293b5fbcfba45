//! Three-stage streaming wake-word pipeline: mel-spectrogram → embedding →
//! wake-word classifier.
//!
//! State is kept across calls to [`DetectionPipeline::detect`] so the caller
//! can feed it one 80 ms [`AudioFrame`](crate::audio::AudioFrame) at a time.
//! A mel-feature buffer accumulates 76 frames (≈1.5 s of context) before the
//! embedding stage runs at all, and the embedding stage only recomputes every
//! `step_size` mel frames rather than on every audio chunk. Once the
//! embedding ring has `embedding_frames` entries, a warm-up timer starts;
//! scores are suppressed until it elapses, since the models tend to produce
//! noisy scores before they have settled into a stable window.

use super::DetectionError;
use crate::error::Result;
use crate::models::{embedding::EmbeddingModel, melspectrogram::MelSpectrogramModel, wakeword::WakewordModel};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::watch;

const MEL_BUFFER_FRAMES: usize = 76;
const MEL_BINS: usize = 32;
const MEL_FRAMES_PER_CHUNK: usize = 5;
const STEP_SIZE_FRAMES: usize = 8;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub melspectrogram_model_path: String,
    pub embedding_model_path: String,
    pub wakeword_model_path: String,
    pub embedding_frames: usize,
    pub warmup_ms: u64,
    pub threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            melspectrogram_model_path: "models/melspectrogram.tflite".to_string(),
            embedding_model_path: "models/embedding.tflite".to_string(),
            wakeword_model_path: "models/hey_jarvis.tflite".to_string(),
            embedding_frames: 16,
            warmup_ms: 1500,
            threshold: 0.5,
        }
    }
}

/// The detector's internal state: sliding mel-buffer, embedding ring, and the
/// counters and flags that gate when predictions run. Owned exclusively by
/// the [`DetectionPipeline`]; nothing outside this module mutates it.
struct DetectorState {
    mel_buffer: VecDeque<[f32; MEL_BINS]>,
    frames_since_last_prediction: usize,
    mel_buffer_filled: bool,
    embedding_ring: VecDeque<Vec<f32>>,
    embedding_buffer_filled: bool,
    warm_up_start: Option<Instant>,
    warm_up_complete: bool,
}

impl DetectorState {
    fn new() -> Self {
        Self {
            mel_buffer: VecDeque::with_capacity(MEL_BUFFER_FRAMES),
            frames_since_last_prediction: 0,
            mel_buffer_filled: false,
            embedding_ring: VecDeque::new(),
            embedding_buffer_filled: false,
            warm_up_start: None,
            warm_up_complete: false,
        }
    }

    /// Clear buffers and counters but preserve `warm_up_complete`: once a
    /// process has warmed up, re-arming the detector (e.g. after
    /// `RESET_DETECTOR`) must not reintroduce the suppression window.
    fn reset(&mut self) {
        let warm_up_complete = self.warm_up_complete;
        *self = Self::new();
        self.warm_up_complete = warm_up_complete;
    }
}

/// Streaming wake-word detector driving the three-stage inference described
/// in the component design.
pub struct DetectionPipeline {
    melspectrogram_model: MelSpectrogramModel<'static>,
    embedding_model: EmbeddingModel,
    wakeword_model: WakewordModel<'static>,
    config: PipelineConfig,
    state: DetectorState,
    warmup_tx: watch::Sender<bool>,
    warmup_rx: watch::Receiver<bool>,
}

impl DetectionPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        log::info!(
            "loading wake-word models: melspec={} embedding={} wakeword={}",
            config.melspectrogram_model_path,
            config.embedding_model_path,
            config.wakeword_model_path
        );

        let melspectrogram_model = MelSpectrogramModel::new(&config.melspectrogram_model_path)?;
        let embedding_model = EmbeddingModel::new(&config.embedding_model_path)?;
        let wakeword_model = WakewordModel::new(&config.wakeword_model_path)?;
        let (warmup_tx, warmup_rx) = watch::channel(false);

        Ok(Self {
            melspectrogram_model,
            embedding_model,
            wakeword_model,
            config,
            state: DetectorState::new(),
            warmup_tx,
            warmup_rx,
        })
    }

    pub fn warm_up_complete(&self) -> bool {
        self.state.warm_up_complete
    }

    /// Resolves once warm-up completes. If it already has, resolves
    /// immediately.
    pub async fn warm_up(&self) {
        if self.state.warm_up_complete {
            return;
        }
        let mut rx = self.warmup_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Process one 80 ms chunk of normalized audio and return the score,
    /// `0.0` while warm-up is in progress or while buffers are still
    /// accumulating context.
    pub fn detect(&mut self, audio_chunk: &[f32]) -> Result<f32> {
        let melspec_features = match self.melspectrogram_model.process(audio_chunk) {
            Ok(features) => features,
            Err(e) => {
                log::error!("melspectrogram inference failed, treating frame as score 0: {e}");
                return Ok(0.0);
            }
        };

        for chunk in melspec_features.chunks(MEL_BINS) {
            let mut frame = [0.0f32; MEL_BINS];
            frame.copy_from_slice(chunk);
            if self.state.mel_buffer.len() == MEL_BUFFER_FRAMES {
                self.state.mel_buffer.pop_front();
            }
            self.state.mel_buffer.push_back(frame);
        }

        if self.state.mel_buffer.len() < MEL_BUFFER_FRAMES {
            return Ok(0.0);
        }
        if !self.state.mel_buffer_filled {
            self.state.mel_buffer_filled = true;
            log::debug!("mel buffer filled ({MEL_BUFFER_FRAMES} frames)");
        }

        self.state.frames_since_last_prediction += MEL_FRAMES_PER_CHUNK;
        if self.state.frames_since_last_prediction < STEP_SIZE_FRAMES {
            return Ok(0.0);
        }
        self.state.frames_since_last_prediction = 0;

        let embedding_input: Vec<f32> = self
            .state
            .mel_buffer
            .iter()
            .flat_map(|frame| frame.iter().copied())
            .collect();

        let embedding = match self.embedding_model.predict(&embedding_input) {
            Ok(e) => e,
            Err(e) => {
                log::error!("embedding inference failed, treating frame as score 0: {e}");
                return Ok(0.0);
            }
        };

        if self.state.embedding_ring.len() == self.config.embedding_frames {
            self.state.embedding_ring.pop_front();
        }
        self.state.embedding_ring.push_back(embedding);

        if self.state.embedding_ring.len() < self.config.embedding_frames {
            return Ok(0.0);
        }
        if !self.state.embedding_buffer_filled {
            self.state.embedding_buffer_filled = true;
            self.state.warm_up_start = Some(Instant::now());
            log::debug!(
                "embedding ring filled ({} frames), starting {}ms warm-up",
                self.config.embedding_frames,
                self.config.warmup_ms
            );
        }

        if !self.state.warm_up_complete {
            let elapsed = self
                .state
                .warm_up_start
                .map(|start| start.elapsed())
                .unwrap_or_default();
            if elapsed >= Duration::from_millis(self.config.warmup_ms) {
                self.state.warm_up_complete = true;
                let _ = self.warmup_tx.send(true);
                log::info!("wake-word detector warm-up complete");
            } else {
                return Ok(0.0);
            }
        }

        let wakeword_input: Vec<f32> = self
            .state
            .embedding_ring
            .iter()
            .flat_map(|e| e.iter().copied())
            .collect();

        let score = match self.wakeword_model.predict(&wakeword_input) {
            Ok(s) => s,
            Err(e) => {
                log::error!("wake-word inference failed, treating frame as score 0: {e}");
                return Ok(0.0);
            }
        };

        log::debug!("wake-word score: {score:.4}");
        Ok(score)
    }

    pub fn threshold(&self) -> f32 {
        self.config.threshold
    }

    /// Clear mel-buffer, embedding ring, and counters; `warm_up_complete`
    /// is preserved. Must never be called while the recording machine is in
    /// `recording` (enforced by the caller, not here).
    pub fn reset(&mut self) {
        self.state.reset();
        log::info!("detector state reset (warm-up status preserved)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_creation_fails_fast_on_missing_models() {
        let config = PipelineConfig {
            melspectrogram_model_path: "non_existent_melspec.tflite".to_string(),
            embedding_model_path: "non_existent_embedding.tflite".to_string(),
            wakeword_model_path: "non_existent_wakeword.tflite".to_string(),
            ..Default::default()
        };
        assert!(DetectionPipeline::new(config).is_err());
    }

    #[test]
    fn detector_state_reset_preserves_warm_up_complete() {
        let mut state = DetectorState::new();
        state.warm_up_complete = true;
        state.mel_buffer.push_back([1.0; MEL_BINS]);
        state.embedding_ring.push_back(vec![1.0; 96]);

        state.reset();

        assert!(state.warm_up_complete);
        assert!(state.mel_buffer.is_empty());
        assert!(state.embedding_ring.is_empty());
    }

    #[test]
    fn fresh_detector_state_has_warm_up_incomplete() {
        let state = DetectorState::new();
        assert!(!state.warm_up_complete);
    }
}
