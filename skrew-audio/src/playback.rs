//! Looping playback of the working buffer through the default output device
//!
//! The device callback and the control methods share one [`PlaybackState`]
//! behind a single lock, so the buffer and its position are always swapped
//! together. The callback only ever `try_lock`s: on contention it writes
//! silence instead of waiting.

use crate::buffer::SampleBuffer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Failures opening or driving the output stream
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("no audio output device found")]
    NoDevice,
    #[error("failed to query output config: {0}")]
    Config(String),
    #[error("failed to create audio stream: {0}")]
    Build(String),
    #[error("failed to start audio: {0}")]
    Play(String),
}

/// Everything the callback reads, guarded together
#[derive(Debug, Default)]
pub struct PlaybackState {
    pub buffer: Option<Arc<SampleBuffer>>,
    /// Next frame to play
    pub position: usize,
    pub playing: bool,
}

/// Fill one interleaved output block from `state`
///
/// Reaching the end of the buffer mid-block leaves the rest of the block
/// silent and wraps the position to zero.
pub fn render(state: &mut PlaybackState, out: &mut [f32], channels: usize) {
    out.fill(0.0);
    let channels = channels.max(1);
    if !state.playing {
        return;
    }
    let Some(buffer) = state.buffer.as_ref() else {
        return;
    };

    let src_channels = buffer.channels() as usize;
    let samples = buffer.samples();
    let frames = buffer.frames();

    for frame in out.chunks_exact_mut(channels) {
        if state.position >= frames {
            break;
        }
        let base = state.position * src_channels;
        for (ch, slot) in frame.iter_mut().enumerate() {
            *slot = samples[base + ch % src_channels];
        }
        state.position += 1;
    }

    if state.position >= frames {
        state.position = 0;
    }
}

struct DeviceStream {
    stream: cpal::Stream,
    sample_rate: u32,
}

enum Output {
    /// No device; state changes only
    Headless,
    Device(Option<DeviceStream>),
}

/// Controls playback of one buffer at a time
///
/// The underlying stream is opened lazily on the first `start` and reopened
/// when a buffer with a different sample rate is loaded.
pub struct PlaybackEngine {
    shared: Arc<Mutex<PlaybackState>>,
    output: Output,
    block_size: usize,
}

impl PlaybackEngine {
    /// Engine that plays through the default output device in blocks of `block_size` frames
    pub fn new(block_size: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(PlaybackState::default())),
            output: Output::Device(None),
            block_size: block_size.max(1),
        }
    }

    /// Engine without an audio device, for batch mode and tests
    pub fn headless() -> Self {
        Self {
            shared: Arc::new(Mutex::new(PlaybackState::default())),
            output: Output::Headless,
            block_size: 0,
        }
    }

    /// Replace the loaded buffer; the position is kept when it still fits
    pub fn load(&mut self, buffer: Arc<SampleBuffer>) {
        let mut state = self.shared.lock();
        if state.position >= buffer.frames() {
            state.position = 0;
        }
        state.buffer = Some(buffer);
    }

    /// Start playing, optionally from a given frame
    pub fn start(&mut self, from: Option<usize>) -> Result<(), PlaybackError> {
        let sample_rate = {
            let mut state = self.shared.lock();
            if let Some(position) = from {
                let frames = state.buffer.as_ref().map_or(0, |b| b.frames());
                state.position = if position < frames { position } else { 0 };
            }
            state.buffer.as_ref().map(|b| b.sample_rate())
        };

        if let Some(sample_rate) = sample_rate {
            self.ensure_stream(sample_rate)?;
        }
        self.shared.lock().playing = true;

        if let Output::Device(Some(device)) = &self.output {
            device
                .stream
                .play()
                .map_err(|e| PlaybackError::Play(e.to_string()))?;
        }
        debug!(position = self.position(), "playback started");
        Ok(())
    }

    pub fn pause(&mut self) {
        self.shared.lock().playing = false;
        if let Output::Device(Some(device)) = &self.output {
            if let Err(e) = device.stream.pause() {
                warn!(error = %e, "failed to pause stream");
            }
        }
    }

    /// Toggle between playing and paused; returns whether playback is now active
    pub fn toggle(&mut self) -> Result<bool, PlaybackError> {
        if self.is_playing() {
            self.pause();
            Ok(false)
        } else {
            self.start(None)?;
            Ok(true)
        }
    }

    pub fn reset_position(&mut self) {
        self.shared.lock().position = 0;
    }

    pub fn is_playing(&self) -> bool {
        self.shared.lock().playing
    }

    pub fn position(&self) -> usize {
        self.shared.lock().position
    }

    fn ensure_stream(&mut self, sample_rate: u32) -> Result<(), PlaybackError> {
        let Output::Device(current) = &mut self.output else {
            return Ok(());
        };
        if current.as_ref().is_some_and(|d| d.sample_rate == sample_rate) {
            return Ok(());
        }
        // Drop the old stream before opening another on the same device
        *current = None;
        let stream = open_stream(Arc::clone(&self.shared), sample_rate, self.block_size)?;
        *current = Some(DeviceStream {
            stream,
            sample_rate,
        });
        Ok(())
    }
}

fn open_stream(
    shared: Arc<Mutex<PlaybackState>>,
    sample_rate: u32,
    block_size: usize,
) -> Result<cpal::Stream, PlaybackError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(PlaybackError::NoDevice)?;
    let supported = device
        .default_output_config()
        .map_err(|e| PlaybackError::Config(e.to_string()))?;
    let channels = supported.channels();

    let fixed = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Fixed(block_size as u32),
    };

    match build(&device, &fixed, Arc::clone(&shared)) {
        Ok(stream) => Ok(stream),
        Err(e) => {
            debug!(error = %e, "fixed block size rejected, using device default");
            let config = cpal::StreamConfig {
                buffer_size: cpal::BufferSize::Default,
                ..fixed
            };
            build(&device, &config, shared)
        }
    }
}

fn build(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<Mutex<PlaybackState>>,
) -> Result<cpal::Stream, PlaybackError> {
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // Never block the real-time thread
                match shared.try_lock() {
                    Some(mut state) => render(&mut state, data, channels),
                    None => data.fill(0.0),
                }
            },
            |err| error!(error = %err, "audio stream error"),
            None,
        )
        .map_err(|e| PlaybackError::Build(e.to_string()))
}
