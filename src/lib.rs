//! The main library for the voice gateway.
//!
//! This library provides every component the binary wires together at
//! startup: audio capture and playback, the wake-word detection pipeline,
//! voice activity detection, the recording/playback/gateway state machines,
//! the microphone manager that turns all of it into an event stream, the
//! voice interaction orchestrator, the tool registry (built-in and
//! MCP-discovered), the AI router, and the startup sequence that brings them
//! all up in the right order.

pub mod audio;
pub mod beeps;
pub mod buffers;
pub mod config;
pub mod detection;
pub mod error;
pub mod intent;
pub mod llm;
pub mod microphone_manager;
pub mod models;
pub mod mqtt;
pub mod orchestrator;
pub mod startup;
pub mod state_machine;
pub mod stt;
pub mod tools;
pub mod tts;
pub mod vad;

pub use error::{EdgeError, Result};
pub use stt::{FireworksStt, SttConfig};
