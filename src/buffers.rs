//! Fixed-capacity pre-roll ring and the active recording buffer.
//!
//! The pre-roll ring always accepts frames while the gateway is listening so
//! that the first syllable of an utterance — spoken while the wake word is
//! still being recognized — isn't clipped. On trigger its contents are
//! copied, not aliased, into a fresh [`RecordingBuffer`].

use crate::audio::AudioFrame;
use std::collections::VecDeque;

/// Ring buffer of the most recent `capacity_ms` of audio, in frames.
pub struct PreRollRing {
    frames: VecDeque<AudioFrame>,
    capacity: usize,
}

impl PreRollRing {
    pub fn new(capacity_ms: u64, frame_duration_ms: u64) -> Self {
        let capacity = ((capacity_ms as f64 / frame_duration_ms as f64).ceil() as usize).max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frame: AudioFrame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Snapshot-copy the current contents as float32 samples, in order. Does
    /// not mutate the ring; later pushes cannot alter a previously taken
    /// snapshot.
    pub fn snapshot(&self) -> Vec<f32> {
        self.frames.iter().flat_map(|f| f.to_f32()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// The samples of the utterance currently being recorded, seeded from a
/// pre-roll snapshot. Mutated only by the microphone manager while the
/// recording machine is in `recording`.
pub struct RecordingBuffer {
    samples: Vec<f32>,
    has_spoken: bool,
}

impl RecordingBuffer {
    /// Start a new buffer, seeded with a copy of the current pre-roll.
    pub fn start(pre_roll_snapshot: Vec<f32>) -> Self {
        Self {
            samples: pre_roll_snapshot,
            has_spoken: false,
        }
    }

    pub fn append(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
    }

    pub fn set_has_spoken(&mut self, has_spoken: bool) {
        self.has_spoken = has_spoken;
    }

    pub fn has_spoken(&self) -> bool {
        self.has_spoken
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Consume the buffer into the `Utterance` handed to the orchestrator.
    pub fn into_utterance(self, started_at_ms: u64) -> Utterance {
        Utterance {
            audio: self.samples,
            started_at_ms,
            has_spoken: self.has_spoken,
        }
    }
}

/// A complete, immutable utterance handed from the microphone manager to the
/// orchestrator. Lives from `TRIGGER` to orchestrator completion.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub audio: Vec<f32>,
    pub started_at_ms: u64,
    pub has_spoken: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: i16) -> AudioFrame {
        AudioFrame::new(vec![value; 1280], 0)
    }

    #[test]
    fn ring_evicts_oldest_frame_past_capacity() {
        let mut ring = PreRollRing::new(160, 80); // capacity = 2 frames
        ring.push(frame(0));
        ring.push(frame(100));
        ring.push(frame(200));
        let snapshot = ring.snapshot();
        // Only the last two frames should remain: 100 then 200.
        assert_eq!(snapshot.first().copied(), Some(100.0 / i16::MAX as f32));
        assert_eq!(snapshot.last().copied(), Some(200.0 / i16::MAX as f32));
    }

    #[test]
    fn snapshot_is_independent_of_later_pushes() {
        let mut ring = PreRollRing::new(160, 80);
        ring.push(frame(42));
        let snapshot_before = ring.snapshot();
        ring.push(frame(99));
        ring.push(frame(99));
        assert_ne!(snapshot_before, ring.snapshot());
        assert_eq!(snapshot_before, vec![42.0 / i16::MAX as f32]);
    }

    #[test]
    fn recording_buffer_seeds_from_snapshot_and_appends() {
        let mut buffer = RecordingBuffer::start(vec![1.0, 2.0]);
        buffer.append(&[3.0, 4.0]);
        assert_eq!(buffer.samples(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
