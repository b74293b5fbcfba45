//! Mel-spectrogram extractor: the first stage of the detection pipeline.
//!
//! Converts 80 ms (1280-sample) chunks of raw 16 kHz audio into mel features.
//! The model's raw output is rescaled with `x/10 + 2`, the transform the
//! upstream wake-word models were trained against.

use crate::error::{DetectionError, Result};
use tflitec::interpreter::{Interpreter, Options};
use tflitec::model::Model;
use tflitec::tensor;

#[derive(Debug, Clone)]
pub struct MelSpectrogramConfig {
    pub chunk_size: usize,
}

impl Default for MelSpectrogramConfig {
    fn default() -> Self {
        Self { chunk_size: 1280 }
    }
}

/// Mel-spectrogram model. Output features are scaled by `x/10 + 2` before
/// being handed to the embedding model.
pub struct MelSpectrogramModel<'a> {
    model: Model<'a>,
    config: MelSpectrogramConfig,
}

impl<'a> MelSpectrogramModel<'a> {
    pub fn new(model_path: &str) -> Result<Self> {
        Self::with_config(model_path, MelSpectrogramConfig::default())
    }

    pub fn with_config(model_path: &str, config: MelSpectrogramConfig) -> Result<Self> {
        let model = Model::new(model_path).map_err(|e| {
            DetectionError::ModelLoad(format!("failed to load melspectrogram model: {e}"))
        })?;
        Ok(Self { model, config })
    }

    /// Run one pass over exactly `chunk_size` raw audio samples.
    pub fn process(&self, audio_samples: &[f32]) -> Result<Vec<f32>> {
        if audio_samples.len() != self.config.chunk_size {
            return Err(DetectionError::InvalidInput(format!(
                "expected {} audio samples, got {}",
                self.config.chunk_size,
                audio_samples.len()
            ))
            .into());
        }

        let mut options = Options::default();
        options.thread_count = 1;
        let interpreter = Interpreter::new(&self.model, Some(options)).map_err(|e| {
            DetectionError::Inference(format!("failed to create melspectrogram interpreter: {e}"))
        })?;

        let input_shape = tensor::Shape::new(vec![1, self.config.chunk_size]);
        interpreter.resize_input(0, input_shape).map_err(|e| {
            DetectionError::Inference(format!("failed to resize melspectrogram input: {e}"))
        })?;
        interpreter.allocate_tensors().map_err(|e| {
            DetectionError::Inference(format!("failed to allocate melspectrogram tensors: {e}"))
        })?;
        interpreter.copy(audio_samples, 0).map_err(|e| {
            DetectionError::Inference(format!("failed to set melspectrogram input: {e}"))
        })?;
        interpreter.invoke().map_err(|e| {
            DetectionError::Inference(format!("melspectrogram inference failed: {e}"))
        })?;

        let output_tensor = interpreter.output(0).map_err(|e| {
            DetectionError::Inference(format!("failed to read melspectrogram output: {e}"))
        })?;

        Ok(output_tensor
            .data::<f32>()
            .iter()
            .map(|&x| x / 10.0 + 2.0)
            .collect())
    }

    /// Number of mel bins a single chunk produces (5 frames * 32 bins for the
    /// stock OpenWakeWord melspectrogram model).
    pub fn output_len(&self) -> usize {
        160
    }

    pub fn expected_input_size(&self) -> usize {
        self.config.chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chunk_size_matches_80ms_at_16khz() {
        assert_eq!(MelSpectrogramConfig::default().chunk_size, 1280);
    }

    #[test]
    fn transform_matches_openwakeword_scaling() {
        let raw = [0.0_f32, 10.0, -20.0];
        let transformed: Vec<f32> = raw.iter().map(|&x| x / 10.0 + 2.0).collect();
        assert_eq!(transformed, vec![2.0, 3.0, 0.0]);
    }
}
