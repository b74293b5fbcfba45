//! Playback lifecycle: `idle -> playing -> cooldown -> idle`, with
//! `playing -> interrupted -> idle` for barge-in.
//!
//! The active playback handle lives in this machine's context, not in a
//! global, per the design notes' "shared mutable playback handle" guidance.
//! The orchestrator only ever talks to it through events.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Cooldown,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackType {
    Beep,
    Welcome,
    Response,
}

/// The thing the machine cancels on `INTERRUPT`. Boxed so the machine stays
/// decoupled from the concrete audio sink type.
pub struct ActivePlayback {
    pub playback_type: PlaybackType,
    cancel: Box<dyn FnMut() + Send>,
}

impl ActivePlayback {
    pub fn new(playback_type: PlaybackType, cancel: impl FnMut() + Send + 'static) -> Self {
        Self {
            playback_type,
            cancel: Box::new(cancel),
        }
    }
}

pub enum PlaybackEvent {
    StartPlayback(ActivePlayback),
    PlaybackComplete,
    Interrupt,
    InterruptHandled,
}

pub struct PlaybackMachine {
    state: PlaybackState,
    active: Option<ActivePlayback>,
    cooldown_started_at: Option<Instant>,
    cooldown_duration: Duration,
}

impl PlaybackMachine {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            state: PlaybackState::Idle,
            active: None,
            cooldown_started_at: None,
            cooldown_duration: Duration::from_millis(cooldown_ms),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn active_playback_type(&self) -> Option<PlaybackType> {
        self.active.as_ref().map(|a| a.playback_type)
    }

    pub fn apply(&mut self, event: PlaybackEvent) {
        use PlaybackState::*;

        match (self.state, event) {
            (Idle, PlaybackEvent::StartPlayback(playback)) => {
                self.active = Some(playback);
                self.state = Playing;
            }
            (Playing, PlaybackEvent::PlaybackComplete) => {
                self.active = None;
                self.cooldown_started_at = Some(Instant::now());
                self.state = Cooldown;
            }
            (Playing, PlaybackEvent::Interrupt) => {
                self.cancel_active();
                self.active = None;
                self.state = Interrupted;
            }
            (Cooldown, PlaybackEvent::Interrupt) => {
                self.active = None;
                self.state = Idle;
            }
            (Interrupted, PlaybackEvent::InterruptHandled) => {
                self.state = Idle;
            }
            _ => {}
        }
    }

    /// Call on a timer tick; transitions `cooldown -> idle` once the
    /// configured cooldown has elapsed.
    pub fn tick_cooldown(&mut self) {
        if self.state == PlaybackState::Cooldown {
            if let Some(started) = self.cooldown_started_at {
                if started.elapsed() >= self.cooldown_duration {
                    self.state = PlaybackState::Idle;
                    self.cooldown_started_at = None;
                }
            }
        }
    }

    fn cancel_active(&mut self) {
        if let Some(active) = self.active.as_mut() {
            let cancel = &mut active.cancel;
            // A missing or panicking cancel callback must never propagate:
            // interruption is expected to happen at any point in playback.
            let _ = panic::catch_unwind(AssertUnwindSafe(|| cancel()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn interrupt_cancels_active_playback_and_clears_it() {
        let mut m = PlaybackMachine::new(1500);
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_clone = Arc::clone(&cancelled);
        m.apply(PlaybackEvent::StartPlayback(ActivePlayback::new(
            PlaybackType::Response,
            move || cancelled_clone.store(true, Ordering::SeqCst),
        )));
        assert_eq!(m.state(), PlaybackState::Playing);

        m.apply(PlaybackEvent::Interrupt);
        assert_eq!(m.state(), PlaybackState::Interrupted);
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(m.active_playback_type().is_none());
    }

    #[test]
    fn interrupt_with_panicking_cancel_does_not_propagate() {
        let mut m = PlaybackMachine::new(1500);
        m.apply(PlaybackEvent::StartPlayback(ActivePlayback::new(
            PlaybackType::Beep,
            || panic!("boom"),
        )));
        m.apply(PlaybackEvent::Interrupt);
        assert_eq!(m.state(), PlaybackState::Interrupted);
    }

    #[test]
    fn cooldown_can_be_interrupted_directly_to_idle() {
        let mut m = PlaybackMachine::new(1500);
        m.apply(PlaybackEvent::StartPlayback(ActivePlayback::new(
            PlaybackType::Beep,
            || {},
        )));
        m.apply(PlaybackEvent::PlaybackComplete);
        assert_eq!(m.state(), PlaybackState::Cooldown);
        m.apply(PlaybackEvent::Interrupt);
        assert_eq!(m.state(), PlaybackState::Idle);
    }
}
