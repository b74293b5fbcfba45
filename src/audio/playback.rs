//! Cancellable audio playback.
//!
//! `CpalSink` runs its own output thread (cpal streams aren't `Send`) driven
//! by a small command channel, mirroring the capture side. `PlaybackHandle`
//! is the cancellation point the orchestrator holds onto for barge-in: a
//! single `cancel()` stops the device-level stream immediately rather than
//! waiting for buffered audio to drain.

use super::AudioError;
use async_trait::async_trait;
use crossbeam_channel::{bounded, Sender};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::oneshot;

/// How a playback run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Cancelled,
}

/// Sink abstraction so the orchestrator and tests don't depend on cpal
/// directly.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play 16-bit mono PCM at `sample_rate_hz`, returning once it has
    /// finished or been cancelled through the returned handle.
    async fn play(&self, pcm: Vec<i16>, sample_rate_hz: u32) -> Result<PlaybackHandle, AudioError>;
}

enum Command {
    Play {
        pcm: Vec<i16>,
        sample_rate_hz: u32,
        done: oneshot::Sender<PlaybackOutcome>,
    },
    Cancel,
}

/// A cpal-backed output device driven by a dedicated thread.
pub struct CpalSink {
    command_tx: Sender<Command>,
    _handle: thread::JoinHandle<()>,
}

impl CpalSink {
    pub fn new(device_name: Option<String>) -> Result<Self, AudioError> {
        let (command_tx, command_rx) = bounded::<Command>(4);

        let handle = thread::spawn(move || {
            for command in command_rx {
                match command {
                    Command::Play {
                        pcm,
                        sample_rate_hz,
                        done,
                    } => {
                        let outcome = play_blocking(&device_name, &pcm, sample_rate_hz, &command_rx);
                        let _ = done.send(outcome);
                    }
                    Command::Cancel => {}
                }
            }
        });

        Ok(Self {
            command_tx,
            _handle: handle,
        })
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn play(&self, pcm: Vec<i16>, sample_rate_hz: u32) -> Result<PlaybackHandle, AudioError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Play {
                pcm,
                sample_rate_hz,
                done: done_tx,
            })
            .map_err(|_| AudioError::Write("playback thread disconnected".to_string()))?;

        Ok(PlaybackHandle {
            command_tx: self.command_tx.clone(),
            done: Some(done_rx),
        })
    }
}

/// Held by the caller of `play()`. Dropping it leaves playback running;
/// calling `cancel()` stops it immediately.
pub struct PlaybackHandle {
    command_tx: Sender<Command>,
    done: Option<oneshot::Receiver<PlaybackOutcome>>,
}

impl PlaybackHandle {
    pub fn cancel(&self) {
        let _ = self.command_tx.send(Command::Cancel);
    }

    /// A cheap, cloneable handle that can only cancel, not join. Used to
    /// populate the playback state machine's `ActivePlayback` context,
    /// which needs a `'static` cancel callback while the `PlaybackHandle`
    /// itself is consumed by whichever task is awaiting `join()`.
    pub fn canceller(&self) -> PlaybackCanceller {
        PlaybackCanceller {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Wait for playback to finish or be cancelled.
    pub async fn join(mut self) -> PlaybackOutcome {
        match self.done.take() {
            Some(rx) => rx.await.unwrap_or(PlaybackOutcome::Cancelled),
            None => PlaybackOutcome::Cancelled,
        }
    }
}

#[derive(Clone)]
pub struct PlaybackCanceller {
    command_tx: Sender<Command>,
}

impl PlaybackCanceller {
    pub fn cancel(&self) {
        let _ = self.command_tx.send(Command::Cancel);
    }
}

fn play_blocking(
    device_name: &Option<String>,
    pcm: &[i16],
    sample_rate_hz: u32,
    command_rx: &crossbeam_channel::Receiver<Command>,
) -> PlaybackOutcome {
    let result = (|| -> Result<PlaybackOutcome, AudioError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceUnavailable(format!("output device {name} not found")))?,
            None => host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceUnavailable("no default output device".to_string()))?,
        };

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        let channels = config.channels() as usize;
        let device_rate = config.sample_rate().0;

        if device_rate != sample_rate_hz {
            log::warn!(
                "output device runs at {device_rate} Hz, audio was synthesized at {sample_rate_hz} Hz; no resampling is performed"
            );
        }

        let position = Arc::new(Mutex::new(0usize));
        let buffer: Arc<[i16]> = pcm.into();
        let cb_buffer = Arc::clone(&buffer);
        let cb_position = Arc::clone(&position);
        let finished = Arc::new(Mutex::new(false));
        let cb_finished = Arc::clone(&finished);

        let stream = device
            .build_output_stream(
                &config.config(),
                move |data: &mut [f32], _| {
                    let mut pos = cb_position.lock().unwrap();
                    for frame in data.chunks_mut(channels) {
                        let sample = cb_buffer
                            .get(*pos)
                            .map(|&s| s as f32 / i16::MAX as f32)
                            .unwrap_or(0.0);
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                        if *pos < cb_buffer.len() {
                            *pos += 1;
                        }
                    }
                    if *pos >= cb_buffer.len() {
                        *cb_finished.lock().unwrap() = true;
                    }
                },
                |err| log::error!("audio output stream error: {err}"),
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Stream(e.to_string()))?;

        loop {
            if *finished.lock().unwrap() {
                return Ok(PlaybackOutcome::Finished);
            }
            match command_rx.recv_timeout(std::time::Duration::from_millis(20)) {
                Ok(Command::Cancel) => return Ok(PlaybackOutcome::Cancelled),
                Ok(Command::Play { done, .. }) => {
                    // A new play request while one is in flight cancels the current one.
                    let _ = done.send(PlaybackOutcome::Cancelled);
                    return Ok(PlaybackOutcome::Cancelled);
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    return Ok(PlaybackOutcome::Cancelled)
                }
            }
        }
    })();

    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("playback failed: {e}");
            PlaybackOutcome::Cancelled
        }
    }
}
