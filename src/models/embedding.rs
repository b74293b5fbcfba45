//! Embedding model: the second stage of the detection pipeline.
//!
//! Consumes an accumulated window of mel features (76 frames x 32 bins =
//! 2432) and produces a 96-feature embedding vector. Kept behind a
//! `Mutex`-wrapped persistent interpreter rather than a fresh one per call
//! (unlike [`crate::models::wakeword::WakewordModel`]) since this stage runs
//! once per mel step (every 8 frames) rather than once per detection window,
//! and reallocating tensors at that rate is measurably wasteful.

use crate::error::{DetectionError, Result};
use std::sync::Mutex;
use tflitec::interpreter::{Interpreter, Options};
use tflitec::model::Model;

pub struct EmbeddingModel {
    interpreter: Mutex<Interpreter<'static>>,
    expected_input_size: usize,
}

impl EmbeddingModel {
    pub fn new(model_path: &str) -> Result<Self> {
        let model = Box::leak(Box::new(Model::new(model_path).map_err(|e| {
            DetectionError::ModelLoad(format!("failed to load embedding model: {e}"))
        })?));

        let mut options = Options::default();
        options.thread_count = 1;

        let interpreter = Interpreter::new(model, Some(options)).map_err(|e| {
            DetectionError::ModelLoad(format!("failed to create embedding interpreter: {e}"))
        })?;
        interpreter.allocate_tensors().map_err(|e| {
            DetectionError::ModelLoad(format!("failed to allocate embedding tensors: {e}"))
        })?;

        let input_tensor = interpreter.input(0).map_err(|e| {
            DetectionError::ModelLoad(format!("failed to read embedding input tensor: {e}"))
        })?;
        let expected_input_size = input_tensor.shape().dimensions().iter().product();

        log::debug!("embedding model {model_path} expects {expected_input_size} input features");

        Ok(Self {
            interpreter: Mutex::new(interpreter),
            expected_input_size,
        })
    }

    pub fn expected_input_size(&self) -> usize {
        self.expected_input_size
    }

    /// Run one pass over an accumulated mel-feature window.
    pub fn predict(&self, features: &[f32]) -> Result<Vec<f32>> {
        if features.len() != self.expected_input_size {
            return Err(DetectionError::InvalidInput(format!(
                "expected {} features for embedding model, got {}",
                self.expected_input_size,
                features.len()
            ))
            .into());
        }

        let interpreter = self
            .interpreter
            .lock()
            .map_err(|_| DetectionError::Inference("embedding interpreter lock poisoned".to_string()))?;

        interpreter.copy(features, 0).map_err(|e| {
            DetectionError::Inference(format!("failed to set embedding input: {e}"))
        })?;
        interpreter
            .invoke()
            .map_err(|e| DetectionError::Inference(format!("embedding inference failed: {e}")))?;

        let output_tensor = interpreter.output(0).map_err(|e| {
            DetectionError::Inference(format!("failed to read embedding output: {e}"))
        })?;

        Ok(output_tensor.data::<f32>().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mel_window_size_matches_76_by_32() {
        assert_eq!(76 * 32, 2432);
    }
}
