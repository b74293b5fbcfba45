//! Integration tests that open a real audio device. Gated behind
//! `test-audio` since CI containers typically have none.

#![cfg(feature = "test-audio")]

use voice_gateway::audio::capture::{AudioCapture, AudioCaptureConfig};
use voice_gateway::audio::playback::CpalSink;

#[tokio::test]
async fn default_input_device_produces_frames() {
    let mut capture = match AudioCapture::start(AudioCaptureConfig::default()) {
        Ok(capture) => capture,
        Err(e) => {
            println!("no usable input device in this environment, skipping: {e}");
            return;
        }
    };

    let frame = tokio::time::timeout(std::time::Duration::from_secs(5), capture.recv()).await;
    assert!(frame.is_ok(), "expected a frame within 5s of starting capture");
}

#[test]
fn default_output_device_opens_without_error() {
    match CpalSink::new(None) {
        Ok(_) => {}
        Err(e) => println!("no usable output device in this environment, skipping: {e}"),
    }
}
