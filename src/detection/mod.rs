//! Wake-word detection: the three-stage streaming inference pipeline
//! (mel-spectrogram → embedding → wake-word classifier) described in the
//! component design's Wake-Word Detector section.

pub mod pipeline;

pub use pipeline::{DetectionPipeline, PipelineConfig};

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DetectionError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// A single score emitted by the detector for one processed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WakeWordEvent {
    pub score: f32,
    pub timestamp_ms: u64,
}
