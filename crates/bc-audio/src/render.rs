//! Per-block MIDI release shared by every backend.

use std::sync::Arc;

use bc_engine::{DispatchQueue, SinkItem};
use bc_ir::{Clock, OutgoingMidi, SampleClock};
use ringbuf::HeapCons;

/// Receives each released event with its frame offset in the block.
pub type MidiCallback = Box<dyn FnMut(OutgoingMidi, u64) + Send>;

/// Render-thread end of the scheduler's ring.
///
/// `render_block` drains pending items, releases what falls inside the
/// block, then advances the clock past it.
pub struct MidiRenderer {
    consumer: HeapCons<SinkItem>,
    queue: DispatchQueue,
    clock: Arc<SampleClock>,
    on_midi: MidiCallback,
}

impl MidiRenderer {
    pub fn new(consumer: HeapCons<SinkItem>, clock: Arc<SampleClock>, on_midi: MidiCallback) -> Self {
        Self {
            consumer,
            queue: DispatchQueue::new(),
            clock,
            on_midi,
        }
    }

    #[inline]
    pub fn render_block(&mut self, frames: u64) {
        self.queue.drain_from(&mut self.consumer);
        let block_start = self.clock.host_time();
        let on_midi = &mut self.on_midi;
        self.queue
            .dispatch_block(block_start, frames, |event, offset| on_midi(event, offset));
        self.clock.advance(frames);
    }

    pub fn clock(&self) -> &Arc<SampleClock> {
        &self.clock
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}
