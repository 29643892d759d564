//! Render-side holding area for scheduled MIDI.
//!
//! The render callback drains the ring into a `DispatchQueue` at the start
//! of each block, then releases every event due inside that block. Fixed
//! capacity; nothing here allocates.

use bc_ir::{OutgoingMidi, IMMEDIATE};
use heapless::Vec;
use ringbuf::traits::Consumer;
use ringbuf::HeapCons;

use crate::sink::{survives_clear, SinkItem};

/// Maximum events waiting for their block.
pub const DISPATCH_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
pub struct DispatchQueue {
    pending: Vec<OutgoingMidi, DISPATCH_CAPACITY>,
    dropped: u64,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            dropped: 0,
        }
    }

    /// Apply one item from the scheduler.
    pub fn apply(&mut self, item: SinkItem) {
        match item {
            SinkItem::Event(event) => {
                if self.pending.push(event).is_err() {
                    self.dropped += 1;
                }
            }
            SinkItem::ClearAfter(boundary) => {
                self.pending.retain(|e| survives_clear(e, boundary));
            }
        }
    }

    /// Apply everything currently in the ring.
    pub fn drain_from(&mut self, consumer: &mut HeapCons<SinkItem>) {
        while let Some(item) = consumer.try_pop() {
            self.apply(item);
        }
    }

    /// Release events due before `block_start + frames`.
    ///
    /// `f` receives the event and its frame offset inside the block.
    /// Immediate and late events land on offset 0.
    pub fn dispatch_block(
        &mut self,
        block_start: u64,
        frames: u64,
        mut f: impl FnMut(OutgoingMidi, u64),
    ) {
        let block_end = block_start.saturating_add(frames);
        self.pending.retain(|event| {
            if event.sample_time == IMMEDIATE {
                f(*event, 0);
                false
            } else if event.sample_time < block_end {
                f(*event, event.sample_time.saturating_sub(block_start));
                false
            } else {
                true
            }
        });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Events rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
