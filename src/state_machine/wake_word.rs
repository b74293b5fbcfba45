//! Wake-word lifecycle: `off -> warming-up -> ready <-> triggered`, plus
//! `ready -> warming-up` on an explicit detector reset.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeWordState {
    Off,
    WarmingUp,
    Ready,
    Triggered,
}

#[derive(Debug, Clone, Copy)]
pub enum WakeWordEvent {
    DetectorInitialized,
    WarmupComplete,
    WakeWordDetected { score: f32 },
    TriggerProcessed,
    ResetDetector,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WakeWordContext {
    pub last_trigger_score: Option<f32>,
    pub last_trigger_time_ms: Option<u64>,
}

pub struct WakeWordMachine {
    state: WakeWordState,
    context: WakeWordContext,
}

impl WakeWordMachine {
    pub fn new() -> Self {
        Self {
            state: WakeWordState::Off,
            context: WakeWordContext::default(),
        }
    }

    pub fn state(&self) -> WakeWordState {
        self.state
    }

    pub fn context(&self) -> &WakeWordContext {
        &self.context
    }

    /// Apply an event per the transition table; illegal events for the
    /// current state are no-ops.
    pub fn apply(&mut self, event: WakeWordEvent, now_ms: u64) {
        use WakeWordEvent::*;
        use WakeWordState::*;

        self.state = match (self.state, event) {
            (Off, DetectorInitialized) => WarmingUp,
            (WarmingUp, WarmupComplete) => Ready,
            (Ready, WakeWordDetected { score }) => {
                self.context.last_trigger_score = Some(score);
                self.context.last_trigger_time_ms = Some(now_ms);
                Triggered
            }
            (Triggered, TriggerProcessed) => Ready,
            (Ready, ResetDetector) => WarmingUp,
            (state, _) => state,
        };
    }
}

impl Default for WakeWordMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle_reaches_ready_and_triggers() {
        let mut m = WakeWordMachine::new();
        assert_eq!(m.state(), WakeWordState::Off);
        m.apply(WakeWordEvent::DetectorInitialized, 0);
        assert_eq!(m.state(), WakeWordState::WarmingUp);
        m.apply(WakeWordEvent::WarmupComplete, 10);
        assert_eq!(m.state(), WakeWordState::Ready);
        m.apply(WakeWordEvent::WakeWordDetected { score: 0.95 }, 100);
        assert_eq!(m.state(), WakeWordState::Triggered);
        assert_eq!(m.context().last_trigger_score, Some(0.95));
        m.apply(WakeWordEvent::TriggerProcessed, 200);
        assert_eq!(m.state(), WakeWordState::Ready);
    }

    #[test]
    fn wake_word_detected_is_ignored_outside_ready() {
        let mut m = WakeWordMachine::new();
        m.apply(WakeWordEvent::WakeWordDetected { score: 0.99 }, 0);
        assert_eq!(m.state(), WakeWordState::Off);
    }

    #[test]
    fn reset_detector_returns_to_warming_up_from_ready() {
        let mut m = WakeWordMachine::new();
        m.apply(WakeWordEvent::DetectorInitialized, 0);
        m.apply(WakeWordEvent::WarmupComplete, 10);
        m.apply(WakeWordEvent::ResetDetector, 20);
        assert_eq!(m.state(), WakeWordState::WarmingUp);
    }
}
