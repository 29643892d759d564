//! Device that renders on demand instead of on a hardware callback.

use crate::render::MidiRenderer;
use crate::traits::{AudioDevice, AudioError};

/// Renders fixed-size blocks when asked.
///
/// Used for bounces and for driving the scheduler deterministically in
/// tests. Latency is one block, the same as a double-buffered device.
pub struct OfflineDevice {
    renderer: MidiRenderer,
    sample_rate: u32,
    block_size: u64,
    running: bool,
}

impl OfflineDevice {
    pub fn new(renderer: MidiRenderer, sample_rate: u32, block_size: u64) -> Self {
        Self {
            renderer,
            sample_rate,
            block_size: block_size.max(1),
            running: false,
        }
    }

    /// Render at least `frames` frames in whole blocks. Returns the number
    /// of frames rendered; zero while stopped.
    pub fn render(&mut self, frames: u64) -> u64 {
        if !self.running {
            return 0;
        }
        let mut rendered = 0;
        while rendered < frames {
            self.renderer.render_block(self.block_size);
            rendered += self.block_size;
        }
        rendered
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn renderer(&self) -> &MidiRenderer {
        &self.renderer
    }
}

impl AudioDevice for OfflineDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn output_latency(&self) -> u64 {
        self.block_size
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
