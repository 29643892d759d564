//! Audio device trait and error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("device init error: {0}")]
    DeviceInit(String),
    #[error("stream create error: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
    #[error("no audio device available")]
    NoDevice,
}

/// A running output the scheduler can target.
pub trait AudioDevice {
    fn sample_rate(&self) -> u32;

    /// Frames between a sample leaving the render callback and reaching
    /// the speaker.
    fn output_latency(&self) -> u64;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    fn is_running(&self) -> bool;
}
