//! Audio I/O: capture and cancellable playback of 16 kHz mono PCM.
//!
//! `AudioFrame` is the unit the rest of the pipeline is built around: a fixed
//! 1280-sample (80 ms) block. Capture produces a stream of these; playback
//! consumes raw `i16` PCM and exposes a `PlaybackHandle` that can be cancelled
//! at the OS level so barge-in has bounded latency.

pub mod capture;
pub mod playback;

pub use capture::{AudioCapture, AudioCaptureConfig};
pub use playback::{AudioSink, CpalSink, PlaybackCanceller, PlaybackHandle, PlaybackOutcome};

use std::sync::Arc;
use thiserror::Error;

/// 80 ms of 16 kHz mono audio: exactly 1280 signed 16-bit samples.
pub const FRAME_SAMPLES: usize = 1280;
pub const SAMPLE_RATE_HZ: u32 = 16_000;

#[derive(Error, Debug, Clone)]
pub enum AudioError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("failed to write audio data: {0}")]
    Write(String),
    #[error("failed to stop audio playback: {0}")]
    Stop(String),
}

/// Immutable 80 ms block of 16 kHz mono PCM. Cheaply cloneable (`Arc<[i16]>`)
/// since the same frame is fanned out to the detector, the pre-roll ring and,
/// while recording, the recording buffer.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Arc<[i16]>,
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, timestamp_ms: u64) -> Self {
        debug_assert_eq!(samples.len(), FRAME_SAMPLES);
        Self {
            samples: samples.into(),
            timestamp_ms,
        }
    }

    /// Normalized float32 samples in `[-1, 1]`, as consumed by the VAD and the
    /// recording buffer.
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples
            .iter()
            .map(|&s| s as f32 / i16::MAX as f32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_f32_stays_within_unit_range() {
        let frame = AudioFrame::new(vec![i16::MAX, i16::MIN, 0], 0);
        for sample in frame.to_f32() {
            assert!((-1.0..=1.0).contains(&sample));
        }
    }
}
