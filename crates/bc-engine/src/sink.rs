//! Push-based destination for sample-stamped MIDI.

use bc_ir::{OutgoingMidi, IMMEDIATE};
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Receives emitted events for hardware-accurate dispatch.
///
/// Implementations must not block or allocate in `send`.
pub trait MidiSink: Send {
    fn send(&mut self, event: OutgoingMidi);

    /// Drop every scheduled event with a sample time strictly after
    /// `after_host_time`. Immediate events are never dropped.
    fn clear_pending(&mut self, after_host_time: u64);
}

impl<S: MidiSink + ?Sized> MidiSink for &mut S {
    fn send(&mut self, event: OutgoingMidi) {
        (**self).send(event)
    }

    fn clear_pending(&mut self, after_host_time: u64) {
        (**self).clear_pending(after_host_time)
    }
}

impl<S: MidiSink + ?Sized> MidiSink for Box<S> {
    fn send(&mut self, event: OutgoingMidi) {
        (**self).send(event)
    }

    fn clear_pending(&mut self, after_host_time: u64) {
        (**self).clear_pending(after_host_time)
    }
}

/// Whether `event` survives a clear at `after_host_time`.
#[inline]
pub fn survives_clear(event: &OutgoingMidi, after_host_time: u64) -> bool {
    event.sample_time == IMMEDIATE || event.sample_time <= after_host_time
}

/// Message carried from the scheduler to the render thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkItem {
    Event(OutgoingMidi),
    ClearAfter(u64),
}

/// Sink that forwards over a lock-free SPSC ring to the render callback.
pub struct RingSink {
    producer: HeapProd<SinkItem>,
    overflowed: u64,
}

impl RingSink {
    /// Create a sink and the consumer end the render thread drains.
    pub fn new(capacity: usize) -> (Self, HeapCons<SinkItem>) {
        let rb = HeapRb::<SinkItem>::new(capacity.max(1));
        let (producer, consumer) = rb.split();
        (
            Self {
                producer,
                overflowed: 0,
            },
            consumer,
        )
    }

    /// Items rejected because the ring was full.
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }

    fn push(&mut self, item: SinkItem) {
        if self.producer.try_push(item).is_err() {
            self.overflowed += 1;
        }
    }
}

impl MidiSink for RingSink {
    fn send(&mut self, event: OutgoingMidi) {
        self.push(SinkItem::Event(event));
    }

    fn clear_pending(&mut self, after_host_time: u64) {
        self.push(SinkItem::ClearAfter(after_host_time));
    }
}

/// In-memory sink for offline rendering and tests.
///
/// Holds everything that would still be delivered: clearing removes the
/// events a real dispatcher would discard.
#[derive(Clone, Debug, Default)]
pub struct VecSink {
    events: Vec<OutgoingMidi>,
    clears: usize,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[OutgoingMidi] {
        &self.events
    }

    /// Take all held events, leaving the sink empty.
    pub fn take(&mut self) -> Vec<OutgoingMidi> {
        core::mem::take(&mut self.events)
    }

    /// Number of `clear_pending` calls received.
    pub fn clears(&self) -> usize {
        self.clears
    }

    pub fn note_ons(&self) -> impl Iterator<Item = &OutgoingMidi> {
        self.events.iter().filter(|e| e.is_note_on())
    }

    pub fn note_offs(&self) -> impl Iterator<Item = &OutgoingMidi> {
        self.events.iter().filter(|e| e.is_note_off())
    }
}

impl MidiSink for VecSink {
    fn send(&mut self, event: OutgoingMidi) {
        self.events.push(event);
    }

    fn clear_pending(&mut self, after_host_time: u64) {
        self.clears += 1;
        self.events.retain(|e| survives_clear(e, after_host_time));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bc_ir::TrackId;
    use ringbuf::traits::Consumer;

    fn off(t: u64) -> OutgoingMidi {
        OutgoingMidi::note_off(TrackId(0), 0, 60, t)
    }

    #[test]
    fn vec_sink_clear_keeps_immediate_and_past() {
        let mut sink = VecSink::new();
        sink.send(off(IMMEDIATE));
        sink.send(off(100));
        sink.send(off(200));
        sink.send(off(201));
        sink.clear_pending(200);

        let times: Vec<u64> = sink.events().iter().map(|e| e.sample_time).collect();
        assert_eq!(times, vec![IMMEDIATE, 100, 200]);
        assert_eq!(sink.clears(), 1);
    }

    #[test]
    fn ring_sink_forwards_in_order() {
        let (mut sink, mut consumer) = RingSink::new(8);
        sink.send(off(10));
        sink.clear_pending(5);

        assert_eq!(consumer.try_pop(), Some(SinkItem::Event(off(10))));
        assert_eq!(consumer.try_pop(), Some(SinkItem::ClearAfter(5)));
        assert_eq!(consumer.try_pop(), None);
    }

    #[test]
    fn ring_sink_counts_overflow() {
        let (mut sink, _consumer) = RingSink::new(2);
        for t in 0..5 {
            sink.send(off(t));
        }
        assert_eq!(sink.overflowed(), 3);
    }

    #[test]
    fn boxed_sink_delegates() {
        let mut boxed: Box<dyn MidiSink> = Box::new(VecSink::new());
        boxed.send(off(1));
        boxed.clear_pending(0);
    }
}
