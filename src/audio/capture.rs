//! Microphone capture: a dedicated cpal input stream feeding fixed-size
//! [`AudioFrame`]s to the rest of the pipeline over a channel.
//!
//! Runs on its own OS thread because `cpal::Stream` is not `Send` on most
//! platforms and the callback must stay real-time safe (no allocation beyond
//! what's pre-reserved, no blocking). The async side only ever sees the
//! channel receiver.

use super::{AudioError, AudioFrame, FRAME_SAMPLES, SAMPLE_RATE_HZ};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc as tokio_mpsc;

#[derive(Debug, Clone, Default)]
pub struct AudioCaptureConfig {
    /// `None` selects the host's default input device.
    pub device_name: Option<String>,
}

/// Owns the capture thread. Dropping it stops the stream and joins the
/// thread.
pub struct AudioCapture {
    frames: tokio_mpsc::UnboundedReceiver<AudioFrame>,
    stop: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl AudioCapture {
    pub fn start(config: AudioCaptureConfig) -> Result<Self, AudioError> {
        let (frame_tx, frame_rx) = tokio_mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = std::thread::spawn(move || {
            let result = run_capture_thread(config, frame_tx, stop_rx, &ready_tx);
            if let Err(e) = result {
                let _ = ready_tx.send(Err(e));
            }
        });

        ready_rx
            .recv()
            .map_err(|_| AudioError::DeviceUnavailable("capture thread exited early".to_string()))??;

        Ok(Self {
            frames: frame_rx,
            stop: stop_tx,
            handle: Some(handle),
        })
    }

    /// Receive the next captured frame. Returns `None` once the stream has
    /// stopped.
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        self.frames.recv().await
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_capture_thread(
    config: AudioCaptureConfig,
    frame_tx: tokio_mpsc::UnboundedSender<AudioFrame>,
    stop_rx: mpsc::Receiver<()>,
    ready_tx: &mpsc::Sender<Result<(), AudioError>>,
) -> Result<(), AudioError> {
    let host = cpal::default_host();

    let device = match &config.device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
            .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceUnavailable(format!("input device {name} not found")))?,
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no default input device".to_string()))?,
    };

    let stream_config = device
        .default_input_config()
        .map_err(|e| AudioError::Stream(e.to_string()))?;

    if stream_config.sample_rate().0 != SAMPLE_RATE_HZ {
        log::warn!(
            "input device sample rate is {} Hz, not the expected {} Hz; consumed as-is, no resampling",
            stream_config.sample_rate().0,
            SAMPLE_RATE_HZ
        );
    }

    let channels = stream_config.channels() as usize;
    let mut carry: Vec<i16> = Vec::with_capacity(FRAME_SAMPLES);
    let start = std::time::Instant::now();

    let err_fn = |err: cpal::StreamError| log::error!("audio input stream error: {err}");

    let stream = match stream_config.sample_format() {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config.config(),
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                push_samples(data.iter().copied(), channels, &mut carry, &frame_tx, start);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config.config(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                push_samples(
                    data.iter().map(|&s| (s * i16::MAX as f32) as i16),
                    channels,
                    &mut carry,
                    &frame_tx,
                    start,
                );
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::Stream(format!(
                "unsupported sample format: {other:?}"
            )));
        }
    }
    .map_err(|e| AudioError::Stream(e.to_string()))?;

    stream.play().map_err(|e| AudioError::Stream(e.to_string()))?;
    let _ = ready_tx.send(Ok(()));

    // Block this dedicated thread until told to stop; the stream runs on its
    // own callback thread in the background.
    let _ = stop_rx.recv();
    Ok(())
}

fn push_samples(
    samples: impl Iterator<Item = i16>,
    channels: usize,
    carry: &mut Vec<i16>,
    frame_tx: &tokio_mpsc::UnboundedSender<AudioFrame>,
    start: std::time::Instant,
) {
    // Downmix to mono by taking the first channel of each interleaved frame.
    for sample in samples.step_by(channels.max(1)) {
        carry.push(sample);
        if carry.len() == FRAME_SAMPLES {
            let timestamp_ms = start.elapsed().as_millis() as u64;
            let frame = AudioFrame::new(std::mem::take(carry), timestamp_ms);
            carry.reserve(FRAME_SAMPLES);
            if frame_tx.send(frame).is_err() {
                return;
            }
        }
    }
}
