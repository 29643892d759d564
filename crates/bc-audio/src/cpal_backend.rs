//! CPAL-based audio output backend.
//!
//! The stream callback writes silence (beatclock produces no audio of its
//! own) and uses each buffer as the timing block for MIDI release.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Stream, StreamConfig, SupportedBufferSize};
use tracing::{error, info};

use crate::render::MidiRenderer;
use crate::traits::{AudioDevice, AudioError};

/// Used when the device reports no buffer size at all.
const FALLBACK_BUFFER_FRAMES: u64 = 512;

pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    /// Nominal buffer size in frames.
    buffer_frames: u64,
    /// Callback-to-playback distance measured by the last callback.
    measured_latency: Arc<AtomicU64>,
    running: bool,
}

impl CpalOutput {
    /// Open the default output device at its default config.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let buffer_frames = match supported.buffer_size() {
            SupportedBufferSize::Range { min, .. } => u64::from(*min).max(FALLBACK_BUFFER_FRAMES),
            SupportedBufferSize::Unknown => FALLBACK_BUFFER_FRAMES,
        };
        let config: StreamConfig = supported.into();
        let buffer_frames = match config.buffer_size {
            BufferSize::Fixed(n) => u64::from(n),
            BufferSize::Default => buffer_frames,
        };

        let name = device.name().unwrap_or_default();
        info!(
            device = %name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            buffer_frames,
            "audio device opened"
        );

        Ok(Self {
            device,
            config,
            stream: None,
            buffer_frames,
            measured_latency: Arc::new(AtomicU64::new(0)),
            running: false,
        })
    }

    /// Build the output stream around `renderer` and start it.
    pub fn build_stream(&mut self, mut renderer: MidiRenderer) -> Result<(), AudioError> {
        let channels = u64::from(self.config.channels.max(1));
        let sample_rate = f64::from(self.config.sample_rate.0);
        let measured = self.measured_latency.clone();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                    data.fill(0.0);
                    let ts = info.timestamp();
                    if let Some(ahead) = ts.playback.duration_since(&ts.callback) {
                        let frames = (ahead.as_secs_f64() * sample_rate) as u64;
                        measured.store(frames, Ordering::Relaxed);
                    }
                    renderer.render_block(data.len() as u64 / channels);
                },
                |err| error!(%err, "audio stream error"),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);
        self.running = true;
        Ok(())
    }
}

impl AudioDevice for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn output_latency(&self) -> u64 {
        let measured = self.measured_latency.load(Ordering::Relaxed);
        if measured > 0 {
            measured
        } else {
            self.buffer_frames
        }
    }

    fn start(&mut self) -> Result<(), AudioError> {
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
            self.running = true;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
