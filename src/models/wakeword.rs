//! Wake-word classifier model: the third stage of the detection pipeline.
//!
//! Takes a window of embedding vectors (`embedding_frames` × 96 features, flattened)
//! and produces a single confidence score for the configured wake word.

use crate::error::{DetectionError, Result};
use tflitec::interpreter::{Interpreter, Options};
use tflitec::model::Model;
use tflitec::tensor;

/// Result of a single wake-word classification pass.
#[derive(Debug, Clone)]
pub struct WakewordDetection {
    pub detected: bool,
    pub confidence: f32,
    pub timestamp: std::time::Instant,
}

/// Wake-word classifier. `expected_input_size` is `embedding_frames * 96` and varies
/// by model (e.g. 16 frames for hey_jarvis, 28 for hello_robot), so it is derived
/// from the loaded model's input tensor rather than hardcoded.
pub struct WakewordModel<'a> {
    model: Model<'a>,
    expected_input_size: usize,
    pub confidence_threshold: f32,
}

impl<'a> WakewordModel<'a> {
    pub fn new(model_path: &str) -> Result<Self> {
        let model = Model::new(model_path).map_err(|e| {
            DetectionError::ModelLoad(format!("failed to load wakeword model: {e}"))
        })?;

        let probe = Interpreter::new(&model, None).map_err(|e| {
            DetectionError::ModelLoad(format!("failed to probe wakeword model: {e}"))
        })?;
        let input_tensor = probe.input(0).map_err(|e| {
            DetectionError::ModelLoad(format!("failed to read wakeword input tensor: {e}"))
        })?;
        let expected_input_size: usize = input_tensor.shape().dimensions().iter().product();

        log::debug!("wakeword model {model_path} expects {expected_input_size} input features");

        Ok(Self {
            model,
            expected_input_size,
            confidence_threshold: 0.5,
        })
    }

    pub fn expected_input_size(&self) -> usize {
        self.expected_input_size
    }

    /// Run one classification pass over a flattened embedding window.
    pub fn predict(&self, features: &[f32]) -> Result<f32> {
        if features.len() != self.expected_input_size {
            return Err(DetectionError::InvalidInput(format!(
                "expected {} features, got {}",
                self.expected_input_size,
                features.len()
            ))
            .into());
        }

        let mut options = Options::default();
        options.thread_count = 1;
        let interpreter = Interpreter::new(&self.model, Some(options)).map_err(|e| {
            DetectionError::Inference(format!("failed to create wakeword interpreter: {e}"))
        })?;

        let input_shape = tensor::Shape::new(vec![1, self.expected_input_size]);
        interpreter.resize_input(0, input_shape).map_err(|e| {
            DetectionError::Inference(format!("failed to resize wakeword input: {e}"))
        })?;
        interpreter.allocate_tensors().map_err(|e| {
            DetectionError::Inference(format!("failed to allocate wakeword tensors: {e}"))
        })?;
        interpreter.copy(features, 0).map_err(|e| {
            DetectionError::Inference(format!("failed to set wakeword input: {e}"))
        })?;
        interpreter
            .invoke()
            .map_err(|e| DetectionError::Inference(format!("wakeword inference failed: {e}")))?;

        let output_tensor = interpreter.output(0).map_err(|e| {
            DetectionError::Inference(format!("failed to read wakeword output: {e}"))
        })?;
        let output_data = output_tensor.data::<f32>();
        let confidence = output_data
            .first()
            .copied()
            .ok_or_else(|| DetectionError::Inference("empty wakeword output".to_string()))?;

        Ok(confidence.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_size_matches_embedding_window_shape() {
        // 16 embedding frames of 96 features each, as used by the default hey_jarvis model.
        assert_eq!(16 * 96, 1536);
    }

    #[test]
    fn confidence_is_clamped_conceptually() {
        let raw: f32 = 1.4;
        assert_eq!(raw.clamp(0.0, 1.0), 1.0);
        let raw: f32 = -0.2;
        assert_eq!(raw.clamp(0.0, 1.0), 0.0);
    }
}
