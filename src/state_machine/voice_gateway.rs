//! The top-level voice-gateway lifecycle: `startup -> listening -> recording
//! -> cooldown -> listening`, with `cooldown` also accepting `TRIGGER` as an
//! interruption (barge-in reaching the microphone layer from a
//! playback-in-progress situation).

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Startup,
    Listening,
    Recording,
    Cooldown,
}

#[derive(Debug, Clone, Copy)]
pub enum GatewayEvent {
    Ready,
    Trigger { timestamp_ms: u64 },
    SilenceDetected,
    MaxLengthReached,
    /// Internal driver tick; not part of the externally observable event
    /// set in the spec, but needed to drive `cooldown -> listening` once the
    /// cooldown window defined by `audio.triggerCooldownMs` elapses.
    CooldownElapsed,
}

/// What the driver must do in response to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEffect {
    TriggerAccepted,
    TriggerRejectedTooSoon,
    InterruptPlaybackAndLlm,
}

pub struct VoiceGatewayMachine {
    state: GatewayState,
    last_trigger_ms: Option<u64>,
    min_rearm_ms: u64,
    cooldown_duration: Duration,
    cooldown_started_at: Option<Instant>,
}

impl VoiceGatewayMachine {
    pub fn new(min_rearm_ms: u64, cooldown_ms: u64) -> Self {
        Self {
            state: GatewayState::Startup,
            last_trigger_ms: None,
            min_rearm_ms,
            cooldown_duration: Duration::from_millis(cooldown_ms),
            cooldown_started_at: None,
        }
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    fn can_trigger(&self, now_ms: u64) -> bool {
        match self.last_trigger_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.min_rearm_ms,
        }
    }

    pub fn apply(&mut self, event: GatewayEvent) -> Option<GatewayEffect> {
        use GatewayEvent::*;
        use GatewayState::*;

        match (self.state, event) {
            (Startup, Ready) => {
                self.state = Listening;
                None
            }
            (Listening, Trigger { timestamp_ms }) => {
                if self.can_trigger(timestamp_ms) {
                    self.last_trigger_ms = Some(timestamp_ms);
                    self.state = Recording;
                    Some(GatewayEffect::TriggerAccepted)
                } else {
                    Some(GatewayEffect::TriggerRejectedTooSoon)
                }
            }
            (Recording, SilenceDetected) | (Recording, MaxLengthReached) => {
                self.state = Cooldown;
                self.cooldown_started_at = Some(Instant::now());
                None
            }
            (Cooldown, Trigger { timestamp_ms }) => {
                log::info!("cooldown (can interrupt): accepting trigger as barge-in");
                self.last_trigger_ms = Some(timestamp_ms);
                self.state = Recording;
                Some(GatewayEffect::InterruptPlaybackAndLlm)
            }
            (Cooldown, CooldownElapsed) => {
                self.state = Listening;
                self.cooldown_started_at = None;
                None
            }
            _ => None,
        }
    }

    /// Call periodically; transitions `cooldown -> listening` once the
    /// configured window has elapsed.
    pub fn tick(&mut self) {
        if self.state == GatewayState::Cooldown {
            if let Some(started) = self.cooldown_started_at {
                if started.elapsed() >= self.cooldown_duration {
                    self.apply(GatewayEvent::CooldownElapsed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_machine(min_rearm_ms: u64) -> VoiceGatewayMachine {
        let mut m = VoiceGatewayMachine::new(min_rearm_ms, 1500);
        m.apply(GatewayEvent::Ready);
        m
    }

    #[test]
    fn trigger_within_rearm_window_is_rejected() {
        let mut m = ready_machine(1500);
        let effect = m.apply(GatewayEvent::Trigger { timestamp_ms: 0 });
        assert_eq!(effect, Some(GatewayEffect::TriggerAccepted));
        m.apply(GatewayEvent::SilenceDetected);
        m.apply(GatewayEvent::CooldownElapsed);
        assert_eq!(m.state(), GatewayState::Listening);

        let effect = m.apply(GatewayEvent::Trigger { timestamp_ms: 500 });
        assert_eq!(effect, Some(GatewayEffect::TriggerRejectedTooSoon));
        assert_eq!(m.state(), GatewayState::Listening);
    }

    #[test]
    fn cooldown_accepts_trigger_regardless_of_rearm_guard() {
        let mut m = ready_machine(1_000_000);
        m.apply(GatewayEvent::Trigger { timestamp_ms: 0 });
        m.apply(GatewayEvent::SilenceDetected);
        assert_eq!(m.state(), GatewayState::Cooldown);

        let effect = m.apply(GatewayEvent::Trigger { timestamp_ms: 1 });
        assert_eq!(effect, Some(GatewayEffect::InterruptPlaybackAndLlm));
        assert_eq!(m.state(), GatewayState::Recording);
    }

    #[test]
    fn trigger_outside_listening_or_cooldown_is_ignored() {
        let mut m = VoiceGatewayMachine::new(1500, 1500);
        let effect = m.apply(GatewayEvent::Trigger { timestamp_ms: 0 });
        assert!(effect.is_none());
        assert_eq!(m.state(), GatewayState::Startup);
    }

    #[test]
    fn second_trigger_after_rearm_window_from_listening_is_accepted() {
        let mut m = ready_machine(100);
        m.apply(GatewayEvent::Trigger { timestamp_ms: 0 });
        m.apply(GatewayEvent::SilenceDetected);
        m.apply(GatewayEvent::CooldownElapsed);
        assert_eq!(m.state(), GatewayState::Listening);

        let effect = m.apply(GatewayEvent::Trigger { timestamp_ms: 200 });
        assert_eq!(effect, Some(GatewayEffect::TriggerAccepted));
    }
}
