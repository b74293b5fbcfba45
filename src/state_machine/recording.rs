//! Recording lifecycle: `idle -> recording -> processing -> idle`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
    Processing,
}

#[derive(Debug, Clone, Copy)]
pub enum RecordingEvent {
    StartRecording,
    SilenceDetected,
    MaxLengthReached,
    RecordingComplete,
}

/// Effects the driver must perform in response to a transition. The machine
/// itself never clears buffers or resets VAD state; it only says that it
/// happened so the microphone manager can.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingEffect {
    ClearBufferAndVad,
}

pub struct RecordingMachine {
    state: RecordingState,
}

impl RecordingMachine {
    pub fn new() -> Self {
        Self {
            state: RecordingState::Idle,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Apply an event; returns effects the caller must perform. Illegal
    /// events (including `START_RECORDING` while already recording and
    /// `RECORDING_COMPLETE` while recording) are no-ops.
    ///
    /// `(Processing, StartRecording)` is the one addition to the plain
    /// idle->recording->processing->idle cycle: a wake-word trigger arriving
    /// while the previous turn is still being transcribed/answered (barge-in)
    /// restarts recording immediately rather than waiting for that turn's
    /// `RECORDING_COMPLETE`, which only arrives once the orchestrator is done
    /// with it.
    pub fn apply(&mut self, event: RecordingEvent) -> Vec<RecordingEffect> {
        use RecordingEvent::*;
        use RecordingState::*;

        let mut effects = Vec::new();
        self.state = match (self.state, event) {
            (Idle, StartRecording) | (Processing, StartRecording) => {
                effects.push(RecordingEffect::ClearBufferAndVad);
                Recording
            }
            (Recording, SilenceDetected) | (Recording, MaxLengthReached) => Processing,
            (Processing, RecordingComplete) => Idle,
            (state, _) => state,
        };
        effects
    }
}

impl Default for RecordingMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_recording_clears_buffer_and_enters_recording() {
        let mut m = RecordingMachine::new();
        let effects = m.apply(RecordingEvent::StartRecording);
        assert_eq!(m.state(), RecordingState::Recording);
        assert_eq!(effects, vec![RecordingEffect::ClearBufferAndVad]);
    }

    #[test]
    fn start_recording_is_ignored_while_already_recording() {
        let mut m = RecordingMachine::new();
        m.apply(RecordingEvent::StartRecording);
        let effects = m.apply(RecordingEvent::StartRecording);
        assert_eq!(m.state(), RecordingState::Recording);
        assert!(effects.is_empty());
    }

    #[test]
    fn recording_complete_is_ignored_while_recording() {
        let mut m = RecordingMachine::new();
        m.apply(RecordingEvent::StartRecording);
        m.apply(RecordingEvent::RecordingComplete);
        assert_eq!(m.state(), RecordingState::Recording);
    }

    #[test]
    fn full_cycle_returns_to_idle() {
        let mut m = RecordingMachine::new();
        m.apply(RecordingEvent::StartRecording);
        m.apply(RecordingEvent::SilenceDetected);
        assert_eq!(m.state(), RecordingState::Processing);
        m.apply(RecordingEvent::RecordingComplete);
        assert_eq!(m.state(), RecordingState::Idle);
    }
}
