//! The four cooperating state machines described in the component design:
//! wake-word lifecycle, recording lifecycle, playback lifecycle, and the
//! top-level voice-gateway lifecycle.
//!
//! Each machine is a pure `(state, event) -> (state, effects)` transition
//! table plus a thin struct holding the current state and context. Illegal
//! events (not listed in the current state's transition table) are no-ops:
//! the state is returned unchanged and no effects are produced. Machines
//! never reach into each other's state directly; coordination happens via
//! explicit events driven by [`crate::microphone_manager::MicrophoneManager`]
//! and [`crate::orchestrator::Orchestrator`].

pub mod playback;
pub mod recording;
pub mod voice_gateway;
pub mod wake_word;

pub use playback::{PlaybackEvent, PlaybackMachine, PlaybackState};
pub use recording::{RecordingEvent, RecordingMachine, RecordingState};
pub use voice_gateway::{GatewayEvent, GatewayState, VoiceGatewayMachine};
pub use wake_word::{WakeWordEvent, WakeWordMachine, WakeWordState};
